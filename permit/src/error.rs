//! Error types

use thiserror::Error;

/// Errors surfaced by a negotiation
///
/// Handler failures are not part of this type: they are isolated per handler
/// and reported through [`crate::DispatchReport`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("Invalid request configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("{owner_type} cannot be addressed for a host grant request")]
    UnsupportedOwner { owner_type: &'static str },
}

impl NegotiationError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}

/// Errors building a negotiator
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No capability oracle configured")]
    MissingOracle,
}
