//! Incident lifecycle decisions.
//!
//! This module is deliberately storage-agnostic: it decides *what* should
//! happen for a given state transition, and the caller (sentinel-engine,
//! backed by sentinel-repository) is responsible for applying the decision
//! under a compare-and-set that preserves "at most one open auto-incident
//! per endpoint" even under concurrent transitions.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::incident::{EndpointIncident, Incident};
use crate::state::EndpointState;

/// What the incident manager decided to do in response to a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum IncidentDecision {
    /// Open a new auto-incident and associate it with the endpoint.
    Open {
        incident: Incident,
        association: EndpointIncident,
    },
    /// Resolve the endpoint's open auto-incident, if the caller finds one.
    ResolveOpenAuto { endpoint_id: Uuid, at: DateTime<Utc> },
    /// No action: the transition does not cross an incident boundary.
    NoOp,
}

/// Decide what to do for an `old -> new` endpoint state transition, applying
/// the auto-open / auto-close rules.
///
/// `endpoint_name` and `critical` are only used when opening; `open_auto`
/// should be `true` iff the caller has confirmed (under its compare-and-set)
/// that no open auto-incident currently exists for this endpoint — passing
/// `true` when one already exists is a caller bug, not something this
/// function can detect without repository access.
pub fn decide(
    endpoint_id: Uuid,
    endpoint_name: &str,
    critical: bool,
    old_state: EndpointState,
    new_state: EndpointState,
    at: DateTime<Utc>,
) -> IncidentDecision {
    use EndpointState::*;
    match (old_state, new_state) {
        (Up, Down) | (Degraded, Down) => {
            let incident = Incident::open_auto(endpoint_name, critical, at);
            let association = EndpointIncident::open(endpoint_id, incident.id, at);
            IncidentDecision::Open {
                incident,
                association,
            }
        }
        (Down, Up) => IncidentDecision::ResolveOpenAuto { endpoint_id, at },
        _ => IncidentDecision::NoOp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn down_transition_opens_incident() {
        let endpoint_id = Uuid::new_v4();
        let decision = decide(
            endpoint_id,
            "api",
            false,
            EndpointState::Up,
            EndpointState::Down,
            Utc::now(),
        );
        match decision {
            IncidentDecision::Open {
                incident,
                association,
            } => {
                assert!(incident.title.contains("api"));
                assert_eq!(association.endpoint_id, endpoint_id);
                assert_eq!(association.incident_id, incident.id);
            }
            other => panic!("expected Open, got {other:?}"),
        }
    }

    #[test]
    fn degraded_to_down_also_opens() {
        let decision = decide(
            Uuid::new_v4(),
            "api",
            true,
            EndpointState::Degraded,
            EndpointState::Down,
            Utc::now(),
        );
        assert!(matches!(decision, IncidentDecision::Open { .. }));
    }

    #[test]
    fn recovery_resolves() {
        let endpoint_id = Uuid::new_v4();
        let decision = decide(
            endpoint_id,
            "api",
            false,
            EndpointState::Down,
            EndpointState::Up,
            Utc::now(),
        );
        assert_eq!(
            decision,
            IncidentDecision::ResolveOpenAuto {
                endpoint_id,
                at: match decision.clone() {
                    IncidentDecision::ResolveOpenAuto { at, .. } => at,
                    _ => unreachable!(),
                }
            }
        );
    }

    #[test]
    fn up_to_degraded_is_noop() {
        let decision = decide(
            Uuid::new_v4(),
            "api",
            false,
            EndpointState::Up,
            EndpointState::Degraded,
            Utc::now(),
        );
        assert_eq!(decision, IncidentDecision::NoOp);
    }
}
