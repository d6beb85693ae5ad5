//! Capability status oracle
//!
//! The oracle is the host's view of grant state. The negotiator never caches
//! its answers: every decision queries it afresh.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use crate::capability::Capability;
use crate::owner::OwnerContext;

/// Host-reported status of capabilities
///
/// # Example
///
/// ```rust
/// use permit::{Capability, CapabilityOracle, OwnerContext};
///
/// struct EverythingDenied;
///
/// impl CapabilityOracle for EverythingDenied {
///     fn is_granted(&self, _ctx: &OwnerContext, _capability: &Capability) -> bool {
///         false
///     }
///
///     fn should_explain(&self, _ctx: &OwnerContext, _capability: &Capability) -> bool {
///         false
///     }
/// }
/// ```
pub trait CapabilityOracle: Send + Sync {
    /// Whether `capability` is currently granted
    fn is_granted(&self, ctx: &OwnerContext, capability: &Capability) -> bool;

    /// Whether the host suggests explaining `capability` before asking again
    ///
    /// True after a plain denial; false before the first ask and after a
    /// "don't ask again" denial.
    fn should_explain(&self, ctx: &OwnerContext, capability: &Capability) -> bool;

    /// Whether the host predates runtime permissions (everything granted at install)
    fn is_legacy_platform(&self) -> bool {
        false
    }
}

/// Explanation state the host keeps per capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DenialState {
    /// Never asked, or asked and granted
    #[default]
    Fresh,
    /// Denied once; the host would show an explanation
    Explainable,
    /// Denied with "don't ask again"
    NeverAskAgain,
}

#[derive(Debug, Default)]
struct OracleState {
    granted: HashSet<Capability>,
    denials: HashMap<Capability, DenialState>,
}

/// In-memory oracle with mutable grant and explanation state
///
/// Stands in for the host in tests and in hosts that mirror grant state into
/// the process themselves.
#[derive(Debug, Default)]
pub struct MemoryCapabilityOracle {
    state: RwLock<OracleState>,
    legacy: bool,
}

impl MemoryCapabilityOracle {
    /// Create an oracle where nothing is granted
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an oracle reporting a pre-runtime-permission platform
    pub fn legacy() -> Self {
        Self {
            state: RwLock::default(),
            legacy: true,
        }
    }

    /// Builder-style grant
    pub fn with_granted(self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        for cap in capabilities {
            self.grant(cap);
        }
        self
    }

    /// Mark a capability granted; clears its denial state
    pub fn grant(&self, capability: Capability) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.denials.remove(&capability);
        state.granted.insert(capability);
    }

    /// Mark a capability not granted, recording how it was denied
    pub fn deny(&self, capability: Capability, denial: DenialState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.granted.remove(&capability);
        state.denials.insert(capability, denial);
    }

    /// Revoke a grant without recording a denial
    pub fn revoke(&self, capability: &Capability) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.granted.remove(capability);
        state.denials.remove(capability);
    }

    /// Current denial state of a capability
    pub fn denial_state(&self, capability: &Capability) -> DenialState {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.denials.get(capability).copied().unwrap_or_default()
    }

    /// Number of granted capabilities
    pub fn granted_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .granted
            .len()
    }
}

impl CapabilityOracle for MemoryCapabilityOracle {
    fn is_granted(&self, _ctx: &OwnerContext, capability: &Capability) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.granted.contains(capability)
    }

    fn should_explain(&self, _ctx: &OwnerContext, capability: &Capability) -> bool {
        self.denial_state(capability) == DenialState::Explainable
    }

    fn is_legacy_platform(&self) -> bool {
        self.legacy
    }
}

/// Oracle for platforms without runtime permissions
///
/// Reports every capability granted.
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyPlatformOracle;

impl CapabilityOracle for LegacyPlatformOracle {
    fn is_granted(&self, _ctx: &OwnerContext, _capability: &Capability) -> bool {
        true
    }

    fn should_explain(&self, _ctx: &OwnerContext, _capability: &Capability) -> bool {
        false
    }

    fn is_legacy_platform(&self) -> bool {
        true
    }
}
