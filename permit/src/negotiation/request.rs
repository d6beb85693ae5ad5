//! Request configuration and its fluent builder

use crate::capability::{Capability, RequestId};
use crate::error::NegotiationError;
use crate::owner::Owner;

use super::negotiator::{Negotiation, Negotiator};

/// A validated negotiation request
///
/// Capabilities are non-empty and in request order. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    request_id: RequestId,
    capabilities: Vec<Capability>,
    explain_before_asking: bool,
}

impl RequestConfig {
    /// Validate and build a configuration
    pub fn new(
        request_id: RequestId,
        capabilities: impl IntoIterator<Item = Capability>,
        explain_before_asking: bool,
    ) -> Result<Self, NegotiationError> {
        let capabilities: Vec<Capability> = capabilities.into_iter().collect();
        if capabilities.is_empty() {
            return Err(NegotiationError::invalid("capability list is empty"));
        }
        if let Some(blank) = capabilities.iter().find(|c| c.as_str().trim().is_empty()) {
            return Err(NegotiationError::invalid(format!(
                "blank capability identifier {:?}",
                blank.as_str()
            )));
        }

        Ok(Self {
            request_id,
            capabilities,
            explain_before_asking,
        })
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn explain_before_asking(&self) -> bool {
        self.explain_before_asking
    }

    /// The same request with the explanation step turned off
    ///
    /// Explain handlers re-negotiate with this to avoid explaining forever.
    pub fn without_explanation(&self) -> Self {
        Self {
            explain_before_asking: false,
            ..self.clone()
        }
    }
}

/// Fluent builder started by [`Negotiator::with_owner`]
pub struct RequestBuilder<'n, 'o, O: Owner> {
    negotiator: &'n Negotiator,
    owner: &'o mut O,
    request_id: Option<RequestId>,
    capabilities: Vec<Capability>,
    explain_before_asking: bool,
}

impl<'n, 'o, O: Owner> RequestBuilder<'n, 'o, O> {
    pub(crate) fn new(negotiator: &'n Negotiator, owner: &'o mut O) -> Self {
        Self {
            negotiator,
            owner,
            request_id: None,
            capabilities: Vec::new(),
            explain_before_asking: false,
        }
    }

    /// Set the logical request id
    pub fn request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Replace the capability list
    pub fn capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities = capabilities.into_iter().collect();
        self
    }

    /// Append one capability
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Emit `Explain` instead of asking when the host suggests an explanation
    pub fn explain_before_asking(mut self, flag: bool) -> Self {
        self.explain_before_asking = flag;
        self
    }

    /// Validate without negotiating
    pub fn build(&self) -> Result<RequestConfig, NegotiationError> {
        let request_id = self
            .request_id
            .ok_or_else(|| NegotiationError::invalid("request id is not set"))?;
        RequestConfig::new(
            request_id,
            self.capabilities.iter().cloned(),
            self.explain_before_asking,
        )
    }

    /// Validate and negotiate immediately
    pub fn request(self) -> Result<Negotiation, NegotiationError> {
        let config = self.build()?;
        self.negotiator.negotiate(self.owner, &config)
    }
}
