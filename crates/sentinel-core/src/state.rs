//! Endpoint state derivation.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::probe::ProbeResult;

/// Default number of recent outcomes considered by the deriver.
pub const DEFAULT_WINDOW: usize = 3;

/// Derived endpoint state. Not persisted as the sole record of truth — it is
/// recomputed from recent probe history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointState {
    Unknown,
    Up,
    Degraded,
    Down,
}

/// A state change worth telling the rest of the system about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub endpoint_id: Uuid,
    pub old_state: EndpointState,
    pub new_state: EndpointState,
    pub at: DateTime<Utc>,
    pub triggering_probe: ProbeResult,
}

/// Rolling window of recent probe outcomes used to derive state for one
/// endpoint, plus the previously derived state so transitions can be
/// detected.
#[derive(Debug, Clone)]
pub struct StateDeriver {
    window: VecDeque<bool>,
    capacity: usize,
    previous: EndpointState,
}

impl StateDeriver {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            previous: EndpointState::Unknown,
        }
    }

    pub fn current(&self) -> EndpointState {
        self.previous
    }

    /// Record a new probe outcome and return a transition if the derived
    /// state differs from the previous one. Rules evaluated in order:
    /// fewer than `capacity` samples → Unknown; all success → Up; all
    /// failure → Down; otherwise → Degraded.
    pub fn record(&mut self, probe: ProbeResult) -> Option<StateTransition> {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(probe.success);

        let derived = if self.window.len() < self.capacity {
            EndpointState::Unknown
        } else if self.window.iter().all(|&ok| ok) {
            EndpointState::Up
        } else if self.window.iter().all(|&ok| !ok) {
            EndpointState::Down
        } else {
            EndpointState::Degraded
        };

        if derived == self.previous {
            return None;
        }

        let transition = StateTransition {
            endpoint_id: probe.endpoint_id,
            old_state: self.previous,
            new_state: derived,
            at: probe.attempted_at,
            triggering_probe: probe,
        };
        self.previous = derived;
        Some(transition)
    }
}

impl Default for StateDeriver {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(endpoint_id: Uuid, success: bool) -> ProbeResult {
        if success {
            ProbeResult::success(endpoint_id, 200, 10)
        } else {
            ProbeResult::failure(endpoint_id, Some(500), "server error")
        }
    }

    #[test]
    fn fewer_than_window_is_unknown() {
        let endpoint_id = Uuid::new_v4();
        let mut deriver = StateDeriver::new(3);
        let t1 = deriver.record(probe(endpoint_id, true));
        assert!(t1.is_none(), "unknown -> unknown is not a transition");
        assert_eq!(deriver.current(), EndpointState::Unknown);
    }

    #[test]
    fn three_successes_transition_to_up() {
        let endpoint_id = Uuid::new_v4();
        let mut deriver = StateDeriver::new(3);
        deriver.record(probe(endpoint_id, true));
        deriver.record(probe(endpoint_id, true));
        let t = deriver.record(probe(endpoint_id, true)).expect("transition");
        assert_eq!(t.old_state, EndpointState::Unknown);
        assert_eq!(t.new_state, EndpointState::Up);
    }

    #[test]
    fn three_failures_transition_to_down() {
        let endpoint_id = Uuid::new_v4();
        let mut deriver = StateDeriver::new(3);
        deriver.record(probe(endpoint_id, false));
        deriver.record(probe(endpoint_id, false));
        let t = deriver.record(probe(endpoint_id, false)).expect("transition");
        assert_eq!(t.new_state, EndpointState::Down);
    }

    #[test]
    fn mixed_outcomes_are_degraded() {
        let endpoint_id = Uuid::new_v4();
        let mut deriver = StateDeriver::new(3);
        deriver.record(probe(endpoint_id, true));
        deriver.record(probe(endpoint_id, true));
        deriver.record(probe(endpoint_id, true));
        let t = deriver
            .record(probe(endpoint_id, false))
            .expect("transition to degraded");
        assert_eq!(t.old_state, EndpointState::Up);
        assert_eq!(t.new_state, EndpointState::Degraded);
    }

    #[test]
    fn n_minus_one_failures_one_success_holds_state() {
        // Invariant #3: with N-1 failures and one success, state remains up
        // or degraded (never flips straight to down).
        let endpoint_id = Uuid::new_v4();
        let mut deriver = StateDeriver::new(3);
        deriver.record(probe(endpoint_id, true));
        deriver.record(probe(endpoint_id, true));
        deriver.record(probe(endpoint_id, true));
        deriver.record(probe(endpoint_id, false));
        deriver.record(probe(endpoint_id, false));
        assert_ne!(deriver.current(), EndpointState::Down);
    }

    #[test]
    fn no_transition_emitted_when_state_unchanged() {
        let endpoint_id = Uuid::new_v4();
        let mut deriver = StateDeriver::new(3);
        deriver.record(probe(endpoint_id, true));
        deriver.record(probe(endpoint_id, true));
        deriver.record(probe(endpoint_id, true));
        let repeat = deriver.record(probe(endpoint_id, true));
        assert!(repeat.is_none());
    }
}
