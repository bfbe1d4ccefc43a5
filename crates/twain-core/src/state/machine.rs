//! Data source lifecycle states.

use std::fmt;

/// Lifecycle of one data source, as seen by the application.
///
/// Maps onto protocol states 3 (closed), 4 (opened / negotiated),
/// 5 (enabled) and 6-7 (transferring).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceState {
    #[default]
    Closed,
    /// Device open, capabilities not yet negotiated.
    Opened,
    /// Negotiation finished; capabilities may still be set.
    Negotiated,
    /// Armed for transfer, waiting for the source to signal.
    Enabled,
    /// Transfer-ready received; images are being retrieved.
    Transferring,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceState::Closed => write!(f, "CLOSED"),
            SourceState::Opened => write!(f, "OPENED"),
            SourceState::Negotiated => write!(f, "NEGOTIATED"),
            SourceState::Enabled => write!(f, "ENABLED"),
            SourceState::Transferring => write!(f, "TRANSFERRING"),
        }
    }
}

impl SourceState {
    /// Capability sets are only valid before the source is enabled.
    pub fn is_negotiable(&self) -> bool {
        matches!(self, SourceState::Opened | SourceState::Negotiated)
    }

    /// The device handle is held.
    pub fn is_open(&self) -> bool {
        !matches!(self, SourceState::Closed)
    }

    /// The source UI is enabled and must be disabled before closing.
    pub fn is_enabled(&self) -> bool {
        matches!(self, SourceState::Enabled | SourceState::Transferring)
    }

    fn can_advance_to(&self, next: SourceState) -> bool {
        use SourceState::*;
        matches!(
            (self, next),
            (Closed, Opened)
                | (Opened, Negotiated)
                | (Negotiated, Enabled)
                | (Enabled, Transferring)
                | (_, Closed)
        )
    }
}

/// Current state plus transition bookkeeping.
#[derive(Debug, Default)]
pub struct StateTracker {
    state: SourceState,
    transitions: usize,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Number of transitions taken since construction.
    pub fn transitions(&self) -> usize {
        self.transitions
    }

    /// Transition to a new state. Returns `false` (and stays put) when the
    /// transition skips a step of the lifecycle.
    pub fn goto_state(&mut self, new_state: SourceState) -> bool {
        if !self.state.can_advance_to(new_state) {
            tracing::warn!(from = %self.state, to = %new_state, "Rejected state transition");
            return false;
        }
        tracing::info!(from = %self.state, to = %new_state, "State transition");
        self.state = new_state;
        self.transitions += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_order() {
        let mut tracker = StateTracker::new();
        assert!(tracker.goto_state(SourceState::Opened));
        assert!(!tracker.goto_state(SourceState::Enabled));
        assert_eq!(tracker.state(), SourceState::Opened);
        assert!(tracker.goto_state(SourceState::Negotiated));
        assert!(tracker.goto_state(SourceState::Enabled));
        assert!(tracker.goto_state(SourceState::Transferring));
        assert!(tracker.goto_state(SourceState::Closed));
        assert_eq!(tracker.transitions(), 5);
    }

    #[test]
    fn test_state_predicates() {
        assert!(SourceState::Opened.is_negotiable());
        assert!(!SourceState::Enabled.is_negotiable());
        assert!(SourceState::Transferring.is_enabled());
        assert!(!SourceState::Closed.is_open());
    }
}
