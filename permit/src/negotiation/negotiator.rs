//! The negotiation engine
//!
//! `negotiate` decides between an immediate `Granted`, an `Explain` step or a
//! host request for the denied subset. The host answers later through
//! `deliver_result`, which classifies the grant vector and dispatches exactly
//! one primary outcome.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use crate::audit::{self, AuditEvent, AuditSink, NullAuditSink};
use crate::capability::{Capability, GrantResult, RequestId};
use crate::error::NegotiationError;
use crate::owner::{Owner, OwnerContext};
use crate::registry::{DispatchReport, OutcomeEvent, OutcomeKind, OutcomeRegistry};

use super::classifier::{classify, Classification};
use super::oracle::CapabilityOracle;
use super::presets::NegotiatorBuilder;
use super::request::{RequestBuilder, RequestConfig};

/// What `negotiate` did this cycle
#[derive(Debug, Clone)]
pub enum Negotiation {
    /// Nothing to ask for; `Granted` was dispatched
    Granted(DispatchReport),
    /// `Explain` was dispatched and the host was not asked
    Explained {
        capabilities: Vec<Capability>,
        report: DispatchReport,
    },
    /// The host was asked for the denied subset; the outcome arrives via
    /// [`Negotiator::deliver_result`]
    Requested { capabilities: Vec<Capability> },
}

impl Negotiation {
    /// Whether a host-level request is now in flight
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Requested { .. })
    }
}

/// What `deliver_result` dispatched
#[derive(Debug, Clone)]
pub struct Delivery {
    pub classification: Classification,
    /// One report per dispatch, in dispatch order
    pub reports: Vec<DispatchReport>,
}

impl Delivery {
    /// The primary outcome
    pub fn outcome(&self) -> OutcomeKind {
        self.classification.outcome
    }

    /// Every kind dispatched, side-effect `Explain` included
    pub fn dispatched(&self) -> Vec<OutcomeKind> {
        self.reports.iter().map(|r| r.kind).collect()
    }
}

/// Negotiates capability grants for owners
///
/// Stateless between calls apart from the injected collaborators, so
/// independent negotiations with distinct request ids can be in flight at the
/// same time. Two negotiations sharing an owner type and request id are a
/// caller error: their results cannot be told apart.
///
/// # Example
///
/// ```rust
/// use permit::{
///     well_known, Capability, MemoryCapabilityOracle, Negotiator, Owner, OwnerKind, RequestId,
/// };
///
/// struct Screen;
///
/// impl Owner for Screen {
///     fn kind(&self) -> OwnerKind {
///         OwnerKind::Screen
///     }
///
///     fn request_capabilities(&mut self, _: &[Capability], _: RequestId) {}
/// }
///
/// let oracle = MemoryCapabilityOracle::new().with_granted([well_known::CAMERA]);
/// let negotiator = Negotiator::new(oracle);
/// let step = negotiator
///     .with_owner(&mut Screen)
///     .request_id(7)
///     .capabilities([well_known::CAMERA])
///     .request()
///     .unwrap();
/// assert!(!step.is_pending());
/// ```
#[derive(Clone)]
pub struct Negotiator {
    oracle: Arc<dyn CapabilityOracle>,
    registry: OutcomeRegistry,
    audit: Arc<dyn AuditSink>,
}

impl Negotiator {
    /// Create a negotiator with an empty registry and no audit trail
    pub fn new(oracle: impl CapabilityOracle + 'static) -> Self {
        Self::from_parts(
            Arc::new(oracle),
            OutcomeRegistry::new(),
            Arc::new(NullAuditSink),
        )
    }

    pub(crate) fn from_parts(
        oracle: Arc<dyn CapabilityOracle>,
        registry: OutcomeRegistry,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            oracle,
            registry,
            audit,
        }
    }

    pub fn builder() -> NegotiatorBuilder {
        NegotiatorBuilder::new()
    }

    pub fn registry(&self) -> &OutcomeRegistry {
        &self.registry
    }

    pub fn oracle(&self) -> &dyn CapabilityOracle {
        self.oracle.as_ref()
    }

    /// Start a fluent request for `owner`
    pub fn with_owner<'n, 'o, O: Owner>(
        &'n self,
        owner: &'o mut O,
    ) -> RequestBuilder<'n, 'o, O> {
        RequestBuilder::new(self, owner)
    }

    /// Capabilities the oracle reports as not granted, in request order
    pub fn denied_capabilities<O: Owner>(
        &self,
        owner: &O,
        request_id: RequestId,
        capabilities: &[Capability],
    ) -> Vec<Capability> {
        let ctx = OwnerContext::of(owner, request_id);
        capabilities
            .iter()
            .filter(|cap| !self.oracle.is_granted(&ctx, cap))
            .cloned()
            .collect()
    }

    /// Whether every capability is granted; always true on legacy platforms
    pub fn has_capabilities<O: Owner>(&self, owner: &O, capabilities: &[Capability]) -> bool {
        if self.oracle.is_legacy_platform() {
            tracing::debug!("Legacy platform, capabilities granted at install");
            return true;
        }
        let ctx = OwnerContext::unscoped(owner);
        capabilities
            .iter()
            .all(|cap| self.oracle.is_granted(&ctx, cap))
    }

    /// Run the ask half of a negotiation
    #[tracing::instrument(
        skip_all,
        fields(owner = type_name::<O>(), request_id = config.request_id())
    )]
    pub fn negotiate<O: Owner>(
        &self,
        owner: &mut O,
        config: &RequestConfig,
    ) -> Result<Negotiation, NegotiationError> {
        let request_id = config.request_id();

        if self.oracle.is_legacy_platform() {
            tracing::debug!("Legacy platform, treating all capabilities as granted");
            return Ok(Negotiation::Granted(self.dispatch(
                owner,
                request_id,
                OutcomeKind::Granted,
                config.capabilities(),
            )));
        }

        let denied = self.denied_capabilities(owner, request_id, config.capabilities());
        tracing::debug!(
            requested = config.capabilities().len(),
            denied = denied.len(),
            "Computed denied subset"
        );

        if denied.is_empty() {
            return Ok(Negotiation::Granted(self.dispatch(
                owner,
                request_id,
                OutcomeKind::Granted,
                config.capabilities(),
            )));
        }

        if !owner.kind().is_addressable() {
            return Err(self.reject_unsupported::<O>(request_id));
        }

        if config.explain_before_asking() {
            let ctx = OwnerContext::of(owner, request_id);
            let explain: Vec<Capability> = denied
                .iter()
                .filter(|cap| self.oracle.should_explain(&ctx, cap))
                .cloned()
                .collect();

            if !explain.is_empty() {
                let report = self.dispatch(owner, request_id, OutcomeKind::Explain, &explain);
                return Ok(Negotiation::Explained {
                    capabilities: explain,
                    report,
                });
            }
        }

        tracing::info!(capabilities = ?denied, "Asking host for capabilities");
        owner.request_capabilities(&denied, request_id);
        self.record(audit::host_requested(type_name::<O>(), request_id, &denied));

        Ok(Negotiation::Requested {
            capabilities: denied,
        })
    }

    /// Run the result half of a negotiation
    ///
    /// Called by the host once per completed request. Handler failures are
    /// reported in the returned [`Delivery`] and never surface as an error.
    #[tracing::instrument(skip_all, fields(owner = type_name::<O>(), request_id = request_id))]
    pub fn deliver_result<O: Owner>(
        &self,
        owner: &mut O,
        request_id: RequestId,
        capabilities: &[Capability],
        results: &[GrantResult],
    ) -> Result<Delivery, NegotiationError> {
        let ctx = OwnerContext::of(owner, request_id);
        let oracle = self.oracle.as_ref();
        let classification = classify(capabilities, results, |cap| {
            oracle.should_explain(&ctx, cap)
        });

        if classification.outcome != OutcomeKind::Granted && !owner.kind().is_addressable() {
            return Err(self.reject_unsupported::<O>(request_id));
        }

        let mut reports = Vec::with_capacity(2);
        if !classification.explain.is_empty() {
            reports.push(self.dispatch(
                owner,
                request_id,
                OutcomeKind::Explain,
                &classification.explain,
            ));
        }

        let subject = match classification.outcome {
            OutcomeKind::Granted => capabilities,
            _ => classification.denied.as_slice(),
        };
        reports.push(self.dispatch(owner, request_id, classification.outcome, subject));

        Ok(Delivery {
            classification,
            reports,
        })
    }

    /// [`Self::deliver_result`] with the host's raw integer result codes
    pub fn deliver_codes<O: Owner>(
        &self,
        owner: &mut O,
        request_id: RequestId,
        capabilities: &[Capability],
        codes: &[i32],
    ) -> Result<Delivery, NegotiationError> {
        let results = GrantResult::from_codes(codes);
        self.deliver_result(owner, request_id, capabilities, &results)
    }

    fn dispatch<O: Owner>(
        &self,
        owner: &mut O,
        request_id: RequestId,
        kind: OutcomeKind,
        capabilities: &[Capability],
    ) -> DispatchReport {
        let event = OutcomeEvent::new(request_id, kind, capabilities.to_vec());
        let report = self.registry.dispatch(owner, &event);

        tracing::info!(
            outcome = %kind,
            handlers = report.invoked,
            failed = report.failures.len(),
            "Outcome dispatched"
        );

        self.record(audit::outcome_dispatched(
            type_name::<O>(),
            request_id,
            kind,
            capabilities,
            report.invoked,
        ));
        for failure in &report.failures {
            self.record(audit::handler_failed(failure));
        }
        report
    }

    fn reject_unsupported<O: Owner>(&self, request_id: RequestId) -> NegotiationError {
        let err = NegotiationError::UnsupportedOwner {
            owner_type: type_name::<O>(),
        };
        tracing::error!(error = %err, "Negotiation rejected");
        self.record(audit::negotiation_rejected(
            type_name::<O>(),
            request_id,
            &err.to_string(),
        ));
        err
    }

    fn record(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(event) {
            tracing::warn!(error = %e, "Failed to record audit event");
        }
    }
}

impl fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiator")
            .field("registry", &self.registry)
            .field("legacy", &self.oracle.is_legacy_platform())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::capability::well_known::{CAMERA, RECORD_AUDIO};
    use crate::negotiation::oracle::{DenialState, MemoryCapabilityOracle};
    use crate::owner::{FreeContext, OwnerKind};

    #[derive(Default)]
    struct Screen {
        asked: Vec<(Vec<Capability>, RequestId)>,
        seen: Vec<OutcomeKind>,
    }

    impl Owner for Screen {
        fn kind(&self) -> OwnerKind {
            OwnerKind::Screen
        }

        fn request_capabilities(&mut self, capabilities: &[Capability], request_id: RequestId) {
            self.asked.push((capabilities.to_vec(), request_id));
        }
    }

    fn negotiator_with(oracle: MemoryCapabilityOracle) -> (Negotiator, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        let negotiator =
            Negotiator::from_parts(Arc::new(oracle), OutcomeRegistry::new(), audit.clone());
        for kind in [
            OutcomeKind::Granted,
            OutcomeKind::Denied,
            OutcomeKind::Explain,
            OutcomeKind::PermanentlyBlocked,
        ] {
            negotiator
                .registry()
                .register(1, kind, move |s: &mut Screen, _: &OutcomeEvent| s.seen.push(kind));
        }
        (negotiator, audit)
    }

    #[test]
    fn test_granted_short_circuit() {
        let oracle = MemoryCapabilityOracle::new().with_granted([CAMERA]);
        let (negotiator, audit) = negotiator_with(oracle);
        let mut screen = Screen::default();

        let step = negotiator
            .negotiate(&mut screen, &RequestConfig::new(1, [CAMERA], false).unwrap())
            .unwrap();

        assert!(matches!(step, Negotiation::Granted(_)));
        assert!(screen.asked.is_empty());
        assert_eq!(screen.seen, vec![OutcomeKind::Granted]);
        assert_eq!(audit.outcomes(), vec![OutcomeKind::Granted]);
    }

    #[test]
    fn test_legacy_platform_grants_everything() {
        let (negotiator, _) = negotiator_with(MemoryCapabilityOracle::legacy());
        let mut screen = Screen::default();

        let step = negotiator
            .negotiate(&mut screen, &RequestConfig::new(1, [CAMERA], true).unwrap())
            .unwrap();

        assert!(matches!(step, Negotiation::Granted(_)));
        assert!(screen.asked.is_empty());
        assert!(negotiator.has_capabilities(&screen, &[CAMERA, RECORD_AUDIO]));
    }

    #[test]
    fn test_request_carries_only_denied_subset() {
        let (negotiator, audit) =
            negotiator_with(MemoryCapabilityOracle::new().with_granted([CAMERA]));
        let mut screen = Screen::default();

        let step = negotiator
            .negotiate(
                &mut screen,
                &RequestConfig::new(1, [CAMERA, RECORD_AUDIO], false).unwrap(),
            )
            .unwrap();

        assert!(step.is_pending());
        assert_eq!(screen.asked, vec![(vec![RECORD_AUDIO], 1)]);
        assert!(screen.seen.is_empty());
        assert_eq!(
            audit.find_by_type(audit::AuditEventType::HostRequested).len(),
            1
        );
    }

    #[test]
    fn test_explain_before_asking_stops_the_cycle() {
        let oracle = MemoryCapabilityOracle::new();
        oracle.deny(CAMERA, DenialState::Explainable);
        let (negotiator, _) = negotiator_with(oracle);
        let mut screen = Screen::default();

        let step = negotiator
            .negotiate(&mut screen, &RequestConfig::new(1, [CAMERA], true).unwrap())
            .unwrap();

        match step {
            Negotiation::Explained { capabilities, .. } => assert_eq!(capabilities, vec![CAMERA]),
            other => panic!("Expected Explained, got {:?}", other),
        }
        assert!(screen.asked.is_empty());
        assert_eq!(screen.seen, vec![OutcomeKind::Explain]);
    }

    #[test]
    fn test_explain_flag_asks_when_nothing_explainable() {
        let (negotiator, _) = negotiator_with(MemoryCapabilityOracle::new());
        let mut screen = Screen::default();

        let step = negotiator
            .negotiate(&mut screen, &RequestConfig::new(1, [CAMERA], true).unwrap())
            .unwrap();

        assert!(step.is_pending());
        assert_eq!(screen.asked.len(), 1);
    }

    #[test]
    fn test_explanation_ignored_when_flag_off() {
        let oracle = MemoryCapabilityOracle::new();
        oracle.deny(CAMERA, DenialState::Explainable);
        let (negotiator, _) = negotiator_with(oracle);
        let mut screen = Screen::default();

        negotiator
            .negotiate(&mut screen, &RequestConfig::new(1, [CAMERA], false).unwrap())
            .unwrap();

        assert_eq!(screen.asked, vec![(vec![CAMERA], 1)]);
        assert!(screen.seen.is_empty());
    }

    #[test]
    fn test_context_owner_cannot_be_asked() {
        let (negotiator, audit) = negotiator_with(MemoryCapabilityOracle::new());

        let err = negotiator
            .negotiate(&mut FreeContext, &RequestConfig::new(1, [CAMERA], false).unwrap())
            .unwrap_err();

        assert!(matches!(err, NegotiationError::UnsupportedOwner { .. }));
        assert_eq!(
            audit
                .find_by_type(audit::AuditEventType::NegotiationRejected)
                .len(),
            1
        );
    }

    #[test]
    fn test_context_owner_gets_granted_short_circuit() {
        let oracle = MemoryCapabilityOracle::new().with_granted([CAMERA]);
        let (negotiator, _) = negotiator_with(oracle);

        let step = negotiator
            .negotiate(&mut FreeContext, &RequestConfig::new(1, [CAMERA], false).unwrap())
            .unwrap();

        match step {
            Negotiation::Granted(report) => assert_eq!(report.invoked, 0),
            other => panic!("Expected Granted, got {:?}", other),
        }
    }

    #[test]
    fn test_deliver_denied_dispatches_explain_then_denied() {
        let oracle = MemoryCapabilityOracle::new();
        oracle.deny(CAMERA, DenialState::Explainable);
        let (negotiator, _) = negotiator_with(oracle);
        let mut screen = Screen::default();

        let delivery = negotiator
            .deliver_result(&mut screen, 1, &[CAMERA], &[GrantResult::NotGranted])
            .unwrap();

        assert_eq!(delivery.outcome(), OutcomeKind::Denied);
        assert_eq!(
            delivery.dispatched(),
            vec![OutcomeKind::Explain, OutcomeKind::Denied]
        );
        assert_eq!(screen.seen, vec![OutcomeKind::Explain, OutcomeKind::Denied]);
    }

    #[test]
    fn test_deliver_codes() {
        let (negotiator, _) = negotiator_with(MemoryCapabilityOracle::new());
        let mut screen = Screen::default();

        let delivery = negotiator
            .deliver_codes(&mut screen, 1, &[CAMERA, RECORD_AUDIO], &[0, -1])
            .unwrap();

        assert_eq!(delivery.outcome(), OutcomeKind::PermanentlyBlocked);
        assert_eq!(delivery.classification.denied, vec![RECORD_AUDIO]);
    }

    #[test]
    fn test_deliver_to_context_owner_rejected_unless_granted() {
        let (negotiator, _) = negotiator_with(MemoryCapabilityOracle::new());

        let ok =
            negotiator.deliver_result(&mut FreeContext, 1, &[CAMERA], &[GrantResult::Granted]);
        assert!(ok.is_ok());

        let err = negotiator
            .deliver_result(&mut FreeContext, 1, &[CAMERA], &[])
            .unwrap_err();
        assert!(matches!(err, NegotiationError::UnsupportedOwner { .. }));
    }

    /// Records the request scope of every grant query
    #[derive(Default)]
    struct ScopeRecorder {
        seen: std::sync::Mutex<Vec<Option<RequestId>>>,
    }

    impl CapabilityOracle for ScopeRecorder {
        fn is_granted(&self, ctx: &OwnerContext, _: &Capability) -> bool {
            self.seen.lock().unwrap().push(ctx.request_id);
            true
        }

        fn should_explain(&self, _: &OwnerContext, _: &Capability) -> bool {
            false
        }
    }

    #[test]
    fn test_standalone_check_has_no_request_scope() {
        let oracle = Arc::new(ScopeRecorder::default());
        let negotiator =
            Negotiator::from_parts(oracle.clone(), OutcomeRegistry::new(), Arc::new(NullAuditSink));
        let mut screen = Screen::default();

        assert!(negotiator.has_capabilities(&screen, &[CAMERA]));
        let config = RequestConfig::new(4, [CAMERA], false).unwrap();
        negotiator.negotiate(&mut screen, &config).unwrap();

        assert_eq!(*oracle.seen.lock().unwrap(), vec![None, Some(4)]);
    }
}
