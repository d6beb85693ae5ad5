//! Owners: the entities a negotiation and its handlers belong to
//!
//! An owner is whatever the host addresses its asynchronous grant result to
//! (a screen, an embedded panel) or a free-standing context that can only be
//! told about capabilities that are already granted.

use std::any::{type_name, Any};

use crate::capability::{Capability, RequestId};

/// How the host can address an owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    /// A top-level screen that receives grant results directly
    Screen,
    /// A panel embedded in a screen; results are routed back to it
    Embedded,
    /// A free-standing context with no grant dialog of its own
    Context,
}

impl OwnerKind {
    /// Whether a host-level grant request can be issued for this kind
    pub fn is_addressable(self) -> bool {
        matches!(self, Self::Screen | Self::Embedded)
    }
}

/// An entity that owns negotiations and outcome handlers
///
/// Implementors that are addressable forward `request_capabilities` to the
/// host's grant dialog. The call is fire-and-forget: the host later reports
/// back through [`crate::Negotiator::deliver_result`].
///
/// # Example
///
/// ```rust
/// use permit::{Capability, Owner, OwnerKind, RequestId};
///
/// struct CameraScreen {
///     pending: Vec<(Vec<Capability>, RequestId)>,
/// }
///
/// impl Owner for CameraScreen {
///     fn kind(&self) -> OwnerKind {
///         OwnerKind::Screen
///     }
///
///     fn request_capabilities(&mut self, capabilities: &[Capability], request_id: RequestId) {
///         // Hand off to the platform dialog here
///         self.pending.push((capabilities.to_vec(), request_id));
///     }
/// }
/// ```
///
/// Every owner has to say how the host is asked; there is no silent default:
///
/// ```compile_fail
/// use permit::{Owner, OwnerKind};
///
/// struct ForgetfulScreen;
///
/// impl Owner for ForgetfulScreen {
///     fn kind(&self) -> OwnerKind {
///         OwnerKind::Screen
///     }
/// }
/// ```
pub trait Owner: Any {
    /// How the host addresses this owner
    fn kind(&self) -> OwnerKind;

    /// Ask the host to grant `capabilities` under `request_id`
    ///
    /// Only called for addressable kinds.
    fn request_capabilities(&mut self, capabilities: &[Capability], request_id: RequestId);
}

/// Context handed to the oracle for each status query
#[derive(Debug, Clone, Copy)]
pub struct OwnerContext<'a> {
    /// Owner type name (diagnostics only)
    pub owner_type: &'a str,
    /// How the owner is addressed
    pub kind: OwnerKind,
    /// Logical request the query belongs to; `None` for standalone checks
    pub request_id: Option<RequestId>,
}

impl OwnerContext<'static> {
    /// Context for a query made on behalf of `request_id`
    pub fn of<O: Owner>(owner: &O, request_id: RequestId) -> Self {
        Self {
            request_id: Some(request_id),
            ..Self::unscoped(owner)
        }
    }

    /// Context for a query outside any negotiation
    pub fn unscoped<O: Owner>(owner: &O) -> Self {
        Self {
            owner_type: type_name::<O>(),
            kind: owner.kind(),
            request_id: None,
        }
    }
}

/// A free-standing context with no handlers and no grant dialog
#[derive(Debug, Default, Clone, Copy)]
pub struct FreeContext;

impl Owner for FreeContext {
    fn kind(&self) -> OwnerKind {
        OwnerKind::Context
    }

    fn request_capabilities(&mut self, capabilities: &[Capability], request_id: RequestId) {
        tracing::warn!(
            request_id,
            capabilities = ?capabilities,
            "Free context has no grant dialog, host request dropped"
        );
    }
}
