use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a graph controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    Unbuilt,
    Built,
    Flowing,
    Stopped,
}

impl ControllerState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: ControllerState) -> bool {
        use ControllerState::*;

        matches!(
            (self, target),
            (Unbuilt, Built) | (Built, Flowing) | (Built, Stopped) | (Flowing, Stopped)
        )
    }

    /// Whether optional elements may be toggled in this state
    pub fn allows_toggle(&self) -> bool {
        matches!(self, Self::Built | Self::Flowing)
    }

    /// Get human-readable state name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unbuilt => "unbuilt",
            Self::Built => "built",
            Self::Flowing => "flowing",
            Self::Stopped => "stopped",
        }
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::Unbuilt
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(ControllerState::Unbuilt.can_transition_to(ControllerState::Built));
        assert!(ControllerState::Built.can_transition_to(ControllerState::Flowing));
        assert!(ControllerState::Flowing.can_transition_to(ControllerState::Stopped));
    }

    #[test]
    fn test_failed_launch_can_stop() {
        assert!(ControllerState::Built.can_transition_to(ControllerState::Stopped));
        assert!(!ControllerState::Unbuilt.can_transition_to(ControllerState::Stopped));
        assert!(!ControllerState::Stopped.can_transition_to(ControllerState::Stopped));
    }

    #[test]
    fn test_no_restart_after_stop() {
        assert!(!ControllerState::Stopped.can_transition_to(ControllerState::Flowing));
        assert!(!ControllerState::Stopped.can_transition_to(ControllerState::Built));
        assert!(!ControllerState::Unbuilt.can_transition_to(ControllerState::Flowing));
        assert!(!ControllerState::Built.can_transition_to(ControllerState::Built));
    }

    #[test]
    fn test_toggle_states() {
        assert!(!ControllerState::Unbuilt.allows_toggle());
        assert!(ControllerState::Built.allows_toggle());
        assert!(ControllerState::Flowing.allows_toggle());
        assert!(!ControllerState::Stopped.allows_toggle());
    }
}
