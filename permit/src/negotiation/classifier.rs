//! Classification of host grant results
//!
//! The host's "should explain" signal is read with opposite meanings before
//! and after asking:
//!
//! | Call site   | `should_explain == true`   | `should_explain == false` |
//! |-------------|----------------------------|---------------------------|
//! | Pre-ask     | Explain, don't ask yet     | Ask                       |
//! | Post-result | Denied (+ Explain)         | Permanently blocked       |
//!
//! Both directions are kept as the host platform defines them.

use crate::capability::{Capability, GrantResult};
use crate::registry::OutcomeKind;

/// Result of interpreting a grant-result vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Primary outcome: `Granted`, `Denied` or `PermanentlyBlocked`
    pub outcome: OutcomeKind,
    /// Capabilities that were not granted
    pub denied: Vec<Capability>,
    /// Denied capabilities that still offer an explanation; non-empty only
    /// for `Denied`, in which case `Explain` fires before `Denied`
    pub explain: Vec<Capability>,
}

impl Classification {
    fn granted() -> Self {
        Self {
            outcome: OutcomeKind::Granted,
            denied: Vec::new(),
            explain: Vec::new(),
        }
    }

    /// Outcome kinds to dispatch, in order
    pub fn dispatch_order(&self) -> Vec<OutcomeKind> {
        if self.explain.is_empty() {
            vec![self.outcome]
        } else {
            vec![OutcomeKind::Explain, self.outcome]
        }
    }
}

/// Pair capabilities with their grant results
///
/// A capability without a result entry counts as not granted. Extra entries
/// beyond the capability list carry no capability and are kept for the
/// all-granted check only.
fn pair<'a>(
    capabilities: &'a [Capability],
    results: &[GrantResult],
) -> (Vec<(&'a Capability, GrantResult)>, bool) {
    let paired = capabilities
        .iter()
        .enumerate()
        .map(|(i, cap)| (cap, results.get(i).copied().unwrap_or(GrantResult::NotGranted)))
        .collect();
    let extra_denied = results
        .iter()
        .skip(capabilities.len())
        .any(|r| !r.is_granted());
    (paired, extra_denied)
}

/// Classify a grant-result vector
///
/// `should_explain` is consulted for denied capabilities only, at
/// classification time, so that a "don't ask again" ticked in the dialog is
/// already reflected.
///
/// A denial that cannot be tied to a capability (an empty vector, or a
/// `NotGranted` entry past the end of the capability list while every listed
/// capability is granted) is `Denied`, never `PermanentlyBlocked`: there is no
/// capability the oracle could report as blocked.
pub fn classify<F>(
    capabilities: &[Capability],
    results: &[GrantResult],
    mut should_explain: F,
) -> Classification
where
    F: FnMut(&Capability) -> bool,
{
    // Cancelled or interrupted request
    if results.is_empty() {
        return Classification {
            outcome: OutcomeKind::Denied,
            denied: capabilities.to_vec(),
            explain: Vec::new(),
        };
    }

    let (paired, extra_denied) = pair(capabilities, results);
    let denied: Vec<Capability> = paired
        .iter()
        .filter(|(_, r)| !r.is_granted())
        .map(|(cap, _)| (*cap).clone())
        .collect();

    if denied.is_empty() {
        if !extra_denied {
            return Classification::granted();
        }
        // A denial with no capability to ask the oracle about
        return Classification {
            outcome: OutcomeKind::Denied,
            denied,
            explain: Vec::new(),
        };
    }

    let explain: Vec<Capability> = denied
        .iter()
        .filter(|c| should_explain(*c))
        .cloned()
        .collect();

    let outcome = if explain.is_empty() {
        OutcomeKind::PermanentlyBlocked
    } else {
        OutcomeKind::Denied
    };

    tracing::debug!(
        outcome = %outcome,
        denied = denied.len(),
        explainable = explain.len(),
        "Grant results classified"
    );

    Classification {
        outcome,
        denied,
        explain,
    }
}
