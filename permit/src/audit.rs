//! Negotiation audit trail
//!
//! One [`AuditEvent`] per host request, outcome dispatch, handler failure and
//! rejected negotiation. Events are in-process observability: nothing is
//! written to disk here and nothing is read back to decide a grant.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use crate::capability::{Capability, RequestId};
use crate::registry::{HandlerFailure, OutcomeKind};

/// A single negotiation step
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// RFC 3339 timestamp
    pub timestamp: String,
    pub event_type: AuditEventType,
    /// Owner type name
    pub owner: String,
    pub request_id: RequestId,
    pub details: AuditDetails,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        owner: impl Into<String>,
        request_id: RequestId,
        details: AuditDetails,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            event_type,
            owner: owner.into(),
            request_id,
            details,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// The owner was asked to forward a grant request to the host
    HostRequested,
    /// An outcome reached the registry
    OutcomeDispatched,
    /// A handler returned an error or panicked
    HandlerFailed,
    /// The negotiation failed before reaching the host
    NegotiationRejected,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AuditDetails {
    Request {
        capabilities: Vec<Capability>,
    },
    Outcome {
        outcome: OutcomeKind,
        capabilities: Vec<Capability>,
        /// Handlers bound to the key
        handlers: usize,
    },
    Failure {
        outcome: OutcomeKind,
        index: usize,
        message: String,
    },
    Rejected {
        reason: String,
    },
}

/// Failure reported by a sink; logged by the negotiator, never propagated
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to write audit event: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize audit event: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Destination for audit events
///
/// # Example
///
/// ```rust
/// use permit::audit::{AuditError, AuditEvent, AuditSink};
///
/// struct StderrAuditSink;
///
/// impl AuditSink for StderrAuditSink {
///     fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
///         eprintln!("{}", serde_json::to_string(&event)?);
///         Ok(())
///     }
/// }
/// ```
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Emits every event as a structured `tracing` event under `permit::audit`
///
/// Route it anywhere with a subscriber, e.g. the JSON format installed by
/// `tracing_support::init_subscriber_with_config`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let details = serde_json::to_string(&event.details)?;
        tracing::info!(
            target: "permit::audit",
            event_type = ?event.event_type,
            owner = %event.owner,
            request_id = event.request_id,
            details = %details,
            "audit"
        );
        Ok(())
    }
}

/// Bounded in-memory sink; the oldest event is evicted once full
pub struct MemoryAuditSink {
    events: Mutex<VecDeque<AuditEvent>>,
    capacity: usize,
}

impl MemoryAuditSink {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Snapshot of the recorded events, oldest first
    pub fn events(&self) -> Vec<AuditEvent> {
        self.matching(|_| true)
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn find_by_type(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.matching(|e| e.event_type == event_type)
    }

    pub fn find_by_request(&self, request_id: RequestId) -> Vec<AuditEvent> {
        self.matching(|e| e.request_id == request_id)
    }

    /// Dispatched outcomes in dispatch order
    pub fn outcomes(&self) -> Vec<OutcomeKind> {
        self.lock()
            .iter()
            .filter_map(|e| match e.details {
                AuditDetails::Outcome { outcome, .. } => Some(outcome),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<AuditEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn matching(&self, keep: impl Fn(&AuditEvent) -> bool) -> Vec<AuditEvent> {
        self.lock().iter().filter(|e| keep(e)).cloned().collect()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut events = self.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }
}

impl fmt::Debug for MemoryAuditSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryAuditSink")
            .field("count", &self.count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}

pub(crate) fn host_requested(
    owner: &str,
    request_id: RequestId,
    capabilities: &[Capability],
) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::HostRequested,
        owner,
        request_id,
        AuditDetails::Request {
            capabilities: capabilities.to_vec(),
        },
    )
}

pub(crate) fn outcome_dispatched(
    owner: &str,
    request_id: RequestId,
    outcome: OutcomeKind,
    capabilities: &[Capability],
    handlers: usize,
) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::OutcomeDispatched,
        owner,
        request_id,
        AuditDetails::Outcome {
            outcome,
            capabilities: capabilities.to_vec(),
            handlers,
        },
    )
}

pub(crate) fn handler_failed(failure: &HandlerFailure) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::HandlerFailed,
        failure.owner_type,
        failure.request_id,
        AuditDetails::Failure {
            outcome: failure.kind,
            index: failure.index,
            message: failure.message.clone(),
        },
    )
}

pub(crate) fn negotiation_rejected(owner: &str, request_id: RequestId, reason: &str) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::NegotiationRejected,
        owner,
        request_id,
        AuditDetails::Rejected {
            reason: reason.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::well_known::CAMERA;

    #[test]
    fn test_memory_sink_queries() {
        let sink = MemoryAuditSink::new();
        sink.record(host_requested("Screen", 7, &[CAMERA])).unwrap();

        assert_eq!(sink.count(), 1);
        let events = sink.find_by_type(AuditEventType::HostRequested);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].owner, "Screen");
        assert_eq!(sink.find_by_request(7).len(), 1);
        assert!(sink.find_by_request(8).is_empty());
    }

    #[test]
    fn test_memory_sink_evicts_oldest() {
        let sink = MemoryAuditSink::with_capacity(2);
        for id in 0..3 {
            sink.record(host_requested("Screen", id, &[CAMERA])).unwrap();
        }

        let ids: Vec<RequestId> = sink.events().iter().map(|e| e.request_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_outcomes_skip_other_events() {
        let sink = MemoryAuditSink::new();
        let explain = outcome_dispatched("Screen", 1, OutcomeKind::Explain, &[CAMERA], 1);
        let denied = outcome_dispatched("Screen", 1, OutcomeKind::Denied, &[CAMERA], 0);
        sink.record(explain).unwrap();
        sink.record(host_requested("Screen", 1, &[CAMERA])).unwrap();
        sink.record(denied).unwrap();

        assert_eq!(
            sink.outcomes(),
            vec![OutcomeKind::Explain, OutcomeKind::Denied]
        );
        sink.clear();
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_stateless_sinks_accept_events() {
        assert!(NullAuditSink
            .record(host_requested("Screen", 1, &[CAMERA]))
            .is_ok());
        assert!(TracingAuditSink
            .record(negotiation_rejected("Ctx", 2, "unsupported owner"))
            .is_ok());
    }

    #[test]
    fn test_event_serialization() {
        let failure = HandlerFailure {
            owner_type: "Screen",
            request_id: 4,
            kind: OutcomeKind::PermanentlyBlocked,
            index: 0,
            message: "boom".into(),
        };
        let json = serde_json::to_string(&handler_failed(&failure)).unwrap();
        assert!(json.contains("\"event_type\":\"handler_failed\""));
        assert!(json.contains("\"type\":\"failure\""));
        assert!(json.contains("permanently_blocked"));
        assert!(json.contains("boom"));
    }
}
