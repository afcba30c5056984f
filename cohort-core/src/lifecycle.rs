//! Page lifecycle states and their legal transitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a page controller is in its startup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PageLifecycleState {
    #[default]
    Uninitialized,
    WaitingForDependencies,
    CheckingAuth,
    CheckingPermissions,
    LoadingData,
    Rendering,
    Ready,
    Failed,
}

impl PageLifecycleState {
    /// Position in the forward pipeline. `Failed` sits outside it.
    fn ordinal(&self) -> Option<u8> {
        match self {
            Self::Uninitialized => Some(0),
            Self::WaitingForDependencies => Some(1),
            Self::CheckingAuth => Some(2),
            Self::CheckingPermissions => Some(3),
            Self::LoadingData => Some(4),
            Self::Rendering => Some(5),
            Self::Ready => Some(6),
            Self::Failed => None,
        }
    }

    /// Forward steps are one stage at a time. `Failed` is reachable from any
    /// live state and never left. `Ready -> LoadingData` is the refresh path.
    pub fn can_transition_to(&self, next: PageLifecycleState) -> bool {
        match (self.ordinal(), next.ordinal()) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(6), Some(4)) => true,
            (Some(from), Some(to)) => to == from + 1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::WaitingForDependencies => "waiting_for_dependencies",
            Self::CheckingAuth => "checking_auth",
            Self::CheckingPermissions => "checking_permissions",
            Self::LoadingData => "loading_data",
            Self::Rendering => "rendering",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PageLifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::PageLifecycleState::*;
    use super::*;

    const ALL: [PageLifecycleState; 8] = [
        Uninitialized,
        WaitingForDependencies,
        CheckingAuth,
        CheckingPermissions,
        LoadingData,
        Rendering,
        Ready,
        Failed,
    ];

    #[test]
    fn test_forward_path_is_legal() {
        for pair in ALL[..7].windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        assert!(!Uninitialized.can_transition_to(CheckingAuth));
        assert!(!LoadingData.can_transition_to(CheckingAuth));
        assert!(!Rendering.can_transition_to(LoadingData));
    }

    #[test]
    fn test_failed_reachable_from_every_live_state() {
        for state in &ALL[..7] {
            assert!(state.can_transition_to(Failed));
        }
    }

    #[test]
    fn test_failed_is_terminal() {
        for state in ALL {
            assert!(!Failed.can_transition_to(state));
        }
    }

    #[test]
    fn test_refresh_re_enters_loading() {
        assert!(Ready.can_transition_to(LoadingData));
        assert!(!Ready.can_transition_to(Rendering));
    }
}
