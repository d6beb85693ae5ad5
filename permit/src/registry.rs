//! Outcome registry binding (owner type, request id, outcome) to handlers
//!
//! Bindings are declared once per owner type, usually through
//! `#[outcome_handlers]`, and read on every dispatch. A failing handler is
//! isolated: it is logged and reported, and the remaining handlers still run.

use serde::{Deserialize, Serialize};
use std::any::{type_name, Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use crate::capability::{Capability, RequestId};
use crate::owner::Owner;

/// Classification of a negotiation step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Every requested capability is granted
    Granted,
    /// At least one capability was denied, but it can still be asked for
    Denied,
    /// An explanation should be shown before asking (again)
    Explain,
    /// At least one capability was denied with "don't ask again"
    PermanentlyBlocked,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Explain => "explain",
            Self::PermanentlyBlocked => "permanently_blocked",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments forwarded to every handler of a dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeEvent {
    pub request_id: RequestId,
    pub kind: OutcomeKind,
    /// Capabilities the outcome is about: all requested ones for `Granted`,
    /// the denied ones otherwise
    pub capabilities: Vec<Capability>,
}

impl OutcomeEvent {
    pub fn new(request_id: RequestId, kind: OutcomeKind, capabilities: Vec<Capability>) -> Self {
        Self {
            request_id,
            kind,
            capabilities,
        }
    }
}

/// Return types accepted from outcome handlers
pub trait IntoHandlerResult {
    fn into_handler_result(self) -> anyhow::Result<()>;
}

impl IntoHandlerResult for () {
    fn into_handler_result(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E> IntoHandlerResult for Result<(), E>
where
    E: Into<anyhow::Error>,
{
    fn into_handler_result(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

/// An owner type that declares its own handler bindings
///
/// Usually generated by `#[outcome_handlers]` rather than written by hand.
pub trait HandlerTable: Owner {
    fn register_handlers(registry: &OutcomeRegistry);
}

/// A handler that failed during dispatch
#[derive(Debug, Clone, Error)]
#[error("handler #{index} for {kind} on request {request_id} of {owner_type} failed: {message}")]
pub struct HandlerFailure {
    pub owner_type: &'static str,
    pub request_id: RequestId,
    pub kind: OutcomeKind,
    /// Position in registration order
    pub index: usize,
    pub message: String,
}

/// What happened during a single dispatch
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub kind: OutcomeKind,
    /// Number of handlers found for the key
    pub invoked: usize,
    pub failures: Vec<HandlerFailure>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> usize {
        self.invoked - self.failures.len()
    }
}

type Handler = Arc<dyn Fn(&mut dyn Any, &OutcomeEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BindingKey {
    owner_type: TypeId,
    request_id: RequestId,
    kind: OutcomeKind,
}

impl BindingKey {
    fn of<O: Owner>(request_id: RequestId, kind: OutcomeKind) -> Self {
        Self {
            owner_type: TypeId::of::<O>(),
            request_id,
            kind,
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    bindings: HashMap<BindingKey, Vec<Handler>>,
    /// Owner types whose declared table has been installed
    installed: HashSet<TypeId>,
}

/// Registry of outcome handlers
///
/// Register every binding before the first negotiation involving that owner
/// type; bindings are never removed.
#[derive(Clone, Default)]
pub struct OutcomeRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl OutcomeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `(O, request_id, kind)`
    ///
    /// Duplicate registrations for the same key all fire, in registration order.
    pub fn register<O, F, R>(&self, request_id: RequestId, kind: OutcomeKind, handler: F)
    where
        O: Owner,
        F: Fn(&mut O, &OutcomeEvent) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let erased: Handler = Arc::new(move |target: &mut dyn Any, event: &OutcomeEvent| {
            match target.downcast_mut::<O>() {
                Some(owner) => handler(owner, event).into_handler_result(),
                None => Err(anyhow::anyhow!(
                    "handler bound to {} received a different owner type",
                    type_name::<O>()
                )),
            }
        });

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .bindings
            .entry(BindingKey::of::<O>(request_id, kind))
            .or_default()
            .push(erased);

        tracing::debug!(
            owner = type_name::<O>(),
            request_id,
            outcome = %kind,
            "Outcome handler registered"
        );
    }

    /// Install the handlers an owner type declares; a no-op after the first call
    pub fn install<O: HandlerTable>(&self) -> bool {
        {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            if !inner.installed.insert(TypeId::of::<O>()) {
                return false;
            }
        }
        O::register_handlers(self);
        tracing::debug!(owner = type_name::<O>(), "Handler table installed");
        true
    }

    /// Number of handlers bound to a key
    pub fn handler_count<O: Owner>(&self, request_id: RequestId, kind: OutcomeKind) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .bindings
            .get(&BindingKey::of::<O>(request_id, kind))
            .map_or(0, Vec::len)
    }

    /// Whether any handler is bound for an owner type and request id
    pub fn has_bindings<O: Owner>(&self, request_id: RequestId) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let owner_type = TypeId::of::<O>();
        inner
            .bindings
            .keys()
            .any(|k| k.owner_type == owner_type && k.request_id == request_id)
    }

    /// Invoke every handler bound to `(O, event.request_id, event.kind)` on `owner`
    ///
    /// Handler errors and panics are caught per handler and reported; they never
    /// propagate to the caller.
    pub fn dispatch<O: Owner>(&self, owner: &mut O, event: &OutcomeEvent) -> DispatchReport {
        // Snapshot so handlers run without the lock held
        let handlers: Vec<Handler> = {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            inner
                .bindings
                .get(&BindingKey::of::<O>(event.request_id, event.kind))
                .cloned()
                .unwrap_or_default()
        };

        let owner_type = type_name::<O>();
        let target: &mut dyn Any = owner;
        let mut failures = Vec::new();

        for (index, handler) in handlers.iter().enumerate() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&mut *target, event)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => format!("{:#}", err),
                Err(payload) => panic_message(payload.as_ref()),
            };

            let failure = HandlerFailure {
                owner_type,
                request_id: event.request_id,
                kind: event.kind,
                index,
                message,
            };
            tracing::error!(
                owner = owner_type,
                request_id = event.request_id,
                outcome = %event.kind,
                index,
                error = %failure.message,
                "Outcome handler failed"
            );
            failures.push(failure);
        }

        if handlers.is_empty() {
            tracing::debug!(
                owner = owner_type,
                request_id = event.request_id,
                outcome = %event.kind,
                "No handlers bound"
            );
        }

        DispatchReport {
            kind: event.kind,
            invoked: handlers.len(),
            failures,
        }
    }
}

impl fmt::Debug for OutcomeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("OutcomeRegistry")
            .field("bindings", &inner.bindings.len())
            .field("installed", &inner.installed.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::owner::OwnerKind;

    #[derive(Default)]
    struct Screen {
        calls: Vec<&'static str>,
    }

    impl Owner for Screen {
        fn kind(&self) -> OwnerKind {
            OwnerKind::Screen
        }

        fn request_capabilities(&mut self, _: &[Capability], _: RequestId) {}
    }

    struct Other;

    impl Owner for Other {
        fn kind(&self) -> OwnerKind {
            OwnerKind::Embedded
        }

        fn request_capabilities(&mut self, _: &[Capability], _: RequestId) {}
    }

    fn granted(request_id: RequestId) -> OutcomeEvent {
        OutcomeEvent::new(request_id, OutcomeKind::Granted, vec![])
    }

    #[test]
    fn test_handlers_fire_in_registration_order() {
        let registry = OutcomeRegistry::new();
        registry.register(7, OutcomeKind::Granted, |s: &mut Screen, _: &OutcomeEvent| {
            s.calls.push("first")
        });
        registry.register(7, OutcomeKind::Granted, |s: &mut Screen, _: &OutcomeEvent| {
            s.calls.push("second")
        });

        let mut screen = Screen::default();
        let report = registry.dispatch(&mut screen, &granted(7));

        assert_eq!(report.invoked, 2);
        assert!(report.failures.is_empty());
        assert_eq!(screen.calls, vec!["first", "second"]);
    }

    #[test]
    fn test_lookup_is_keyed_by_request_and_outcome() {
        let registry = OutcomeRegistry::new();
        registry.register(7, OutcomeKind::Denied, |s: &mut Screen, _: &OutcomeEvent| {
            s.calls.push("denied")
        });
        registry.register(8, OutcomeKind::Granted, |s: &mut Screen, _: &OutcomeEvent| {
            s.calls.push("other request")
        });

        let mut screen = Screen::default();
        let report = registry.dispatch(&mut screen, &granted(7));

        assert_eq!(report.invoked, 0);
        assert!(screen.calls.is_empty());
    }

    #[test]
    fn test_lookup_is_keyed_by_owner_type() {
        let registry = OutcomeRegistry::new();
        registry.register(7, OutcomeKind::Granted, |s: &mut Screen, _: &OutcomeEvent| {
            s.calls.push("screen")
        });

        let report = registry.dispatch(&mut Other, &granted(7));
        assert_eq!(report.invoked, 0);
        assert_eq!(registry.handler_count::<Screen>(7, OutcomeKind::Granted), 1);
        assert_eq!(registry.handler_count::<Other>(7, OutcomeKind::Granted), 0);
    }

    #[test]
    fn test_failing_handler_does_not_stop_siblings() {
        let registry = OutcomeRegistry::new();
        registry.register(
            1,
            OutcomeKind::Granted,
            |_: &mut Screen, _: &OutcomeEvent| -> anyhow::Result<()> {
                Err(anyhow::anyhow!("boom"))
            },
        );
        registry.register::<Screen, _, ()>(1, OutcomeKind::Granted, |_, _| {
            panic!("handler exploded")
        });
        registry.register(1, OutcomeKind::Granted, |s: &mut Screen, _: &OutcomeEvent| {
            s.calls.push("survivor")
        });

        let mut screen = Screen::default();
        let report = registry.dispatch(&mut screen, &granted(1));

        assert_eq!(report.invoked, 3);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].index, 0);
        assert!(report.failures[0].message.contains("boom"));
        assert!(report.failures[1].message.contains("handler exploded"));
        assert_eq!(screen.calls, vec!["survivor"]);

        // Registry stays usable after a panic
        let again = registry.dispatch(&mut screen, &granted(1));
        assert_eq!(again.invoked, 3);
    }

    #[test]
    fn test_install_is_idempotent() {
        struct Declared;

        impl Owner for Declared {
            fn kind(&self) -> OwnerKind {
                OwnerKind::Screen
            }

            fn request_capabilities(&mut self, _: &[Capability], _: RequestId) {}
        }

        impl HandlerTable for Declared {
            fn register_handlers(registry: &OutcomeRegistry) {
                registry.register(3, OutcomeKind::Explain, |_: &mut Declared, _| {});
            }
        }

        let registry = OutcomeRegistry::new();
        assert!(registry.install::<Declared>());
        assert!(!registry.install::<Declared>());
        assert_eq!(registry.handler_count::<Declared>(3, OutcomeKind::Explain), 1);
        assert!(registry.has_bindings::<Declared>(3));
        assert!(!registry.has_bindings::<Declared>(4));
    }

    #[test]
    fn test_handler_receives_event() {
        let registry = OutcomeRegistry::new();
        registry.register(
            5,
            OutcomeKind::PermanentlyBlocked,
            |s: &mut Screen, e: &OutcomeEvent| {
                assert_eq!(e.capabilities.len(), 1);
                s.calls.push("blocked");
            },
        );

        let mut screen = Screen::default();
        let event = OutcomeEvent::new(
            5,
            OutcomeKind::PermanentlyBlocked,
            vec![Capability::from_static("cam")],
        );
        registry.dispatch(&mut screen, &event);
        assert_eq!(screen.calls, vec!["blocked"]);
    }
}
