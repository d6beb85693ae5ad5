//! Negotiator configuration and ready-made setups
//!
//! Bundles the oracle, the outcome registry and the audit sink. Presets cover
//! the common cases; the builder covers the rest.

use std::sync::Arc;

use crate::audit::{AuditSink, MemoryAuditSink, NullAuditSink, TracingAuditSink};
use crate::error::ConfigError;
use crate::registry::{HandlerTable, OutcomeRegistry};

use super::negotiator::Negotiator;
use super::oracle::{CapabilityOracle, LegacyPlatformOracle, MemoryCapabilityOracle};

/// Builder for [`Negotiator`]
pub struct NegotiatorBuilder {
    oracle: Option<Arc<dyn CapabilityOracle>>,
    audit: Option<Arc<dyn AuditSink>>,
    registry: OutcomeRegistry,
}

impl NegotiatorBuilder {
    pub fn new() -> Self {
        Self {
            oracle: None,
            audit: None,
            registry: OutcomeRegistry::new(),
        }
    }

    /// Set the capability oracle (required)
    pub fn oracle(mut self, oracle: impl CapabilityOracle + 'static) -> Self {
        self.oracle = Some(Arc::new(oracle));
        self
    }

    /// Share an oracle the caller keeps a handle to
    pub fn shared_oracle(mut self, oracle: Arc<dyn CapabilityOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Set the audit sink
    pub fn audit(mut self, audit: impl AuditSink + 'static) -> Self {
        self.audit = Some(Arc::new(audit));
        self
    }

    /// Share an audit sink the caller keeps a handle to
    pub fn shared_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Use an existing registry
    pub fn registry(mut self, registry: OutcomeRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Install the handlers an owner type declares
    pub fn handlers<O: HandlerTable>(self) -> Self {
        self.registry.install::<O>();
        self
    }

    /// Build the negotiator
    pub fn build(self) -> Result<Negotiator, ConfigError> {
        let oracle = self.oracle.ok_or(ConfigError::MissingOracle)?;
        let audit = self.audit.unwrap_or_else(|| Arc::new(NullAuditSink));
        Ok(Negotiator::from_parts(oracle, self.registry, audit))
    }
}

impl Default for NegotiatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Preset negotiators for common setups
pub struct NegotiatorPresets;

impl NegotiatorPresets {
    /// Testing mode
    ///
    /// - Shared in-memory oracle (nothing granted until the test says so)
    /// - Shared in-memory audit
    pub fn testing() -> (Negotiator, Arc<MemoryCapabilityOracle>, Arc<MemoryAuditSink>) {
        let oracle = Arc::new(MemoryCapabilityOracle::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let negotiator =
            Negotiator::from_parts(oracle.clone(), OutcomeRegistry::new(), audit.clone());
        (negotiator, oracle, audit)
    }

    /// Pre-runtime-permission platform: every request resolves to `Granted`
    pub fn legacy() -> Negotiator {
        Negotiator::new(LegacyPlatformOracle)
    }

    /// Host oracle with the audit trail emitted as `tracing` events
    pub fn traced(oracle: impl CapabilityOracle + 'static) -> Negotiator {
        Negotiator::from_parts(
            Arc::new(oracle),
            OutcomeRegistry::new(),
            Arc::new(TracingAuditSink),
        )
    }
}
