//! Broadcast hub. Each subscriber (typically one SSE connection) gets its
//! own receiving handle on a shared, bounded ring buffer. The hub publishes
//! periodic keepalives, periodic status snapshots, and immediate
//! state-transition events; a subscriber that falls behind the buffer's
//! depth has its oldest unread frames silently dropped (most-recent-wins)
//! rather than blocking the publisher or everyone else, so one slow
//! subscriber cannot stall the others.
//!
//! Grounded on the mailbox-per-subscriber shape used for broadcasting
//! metric/check events to multiple actors in server-monitoring systems:
//! events fan out to independent readers, and a lagging or closed
//! subscriber is treated as routine, not exceptional. `tokio::sync::broadcast`
//! gives this eviction behavior natively, so the hub itself stays a thin
//! wrapper rather than reimplementing a ring buffer.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use sentinel_core::{EndpointState, StateTransition};
use sentinel_repository::Repository;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::info;
use uuid::Uuid;

/// Default subscriber mailbox depth.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 32;
/// Default keepalive cadence.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
/// Default status-snapshot cadence.
pub const DEFAULT_STATUS_BROADCAST_INTERVAL: Duration = Duration::from_secs(30);

/// One message delivered to a subscriber's mailbox.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Frame {
    Keepalive,
    StatusSnapshot { endpoints: Vec<EndpointStatus> },
    Transition(StateTransition),
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointStatus {
    pub endpoint_id: Uuid,
    pub state: EndpointState,
}

pub type SubscriberId = Uuid;

/// Broadcast hub. Cheap to clone; all state lives behind the inner
/// `tokio::sync::broadcast::Sender`, which owns the shared ring buffer.
#[derive(Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<Frame>,
}

impl BroadcastHub {
    pub fn new(mailbox_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(mailbox_capacity);
        Self { sender }
    }

    /// Register a new subscriber and return its receiving handle on the
    /// shared ring buffer. The caller is expected to drive this receiver
    /// into an SSE response stream; dropping it is the only "unsubscribe"
    /// needed; `tokio::sync::broadcast` tracks live receivers itself.
    pub fn subscribe(&self) -> (SubscriberId, broadcast::Receiver<Frame>) {
        (Uuid::new_v4(), self.sender.subscribe())
    }

    /// No-op: kept so callers (e.g. the SSE stream's `Drop` impl) don't need
    /// to change. `tokio::sync::broadcast` already frees a subscriber's slot
    /// when its `Receiver` is dropped.
    pub fn unsubscribe(&self, _id: SubscriberId) {}

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish one frame to every subscriber. When a subscriber's buffer is
    /// full of unread frames, `tokio::sync::broadcast` overwrites the oldest
    /// one to make room (most-recent-wins); that subscriber's next `recv`
    /// simply observes a `Lagged` gap instead of blocking the publisher or
    /// any other subscriber. A publish with zero live subscribers is not an
    /// error.
    pub fn publish(&self, frame: Frame) {
        let _ = self.sender.send(frame);
    }

    pub fn publish_transition(&self, transition: StateTransition) {
        self.publish(Frame::Transition(transition));
    }

    /// Spawn the hub's background publishers: keepalive ticker and status
    /// snapshot ticker. Returns their join handles so the composition root
    /// can fold them into its shutdown sequence.
    ///
    /// `current_states` is the live view the scheduler's state deriver
    /// writes into as transitions happen; the repository is
    /// only consulted here to enumerate which endpoints currently exist,
    /// since derived state is runtime-only and never persisted as a
    /// separate record.
    pub fn spawn_background_tasks<R: Repository + 'static>(
        &self,
        repository: Arc<R>,
        current_states: Arc<DashMap<Uuid, EndpointState>>,
        ping_interval: Duration,
        status_interval: Duration,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let keepalive_hub = self.clone();
        let keepalive_task = tokio::spawn(async move {
            let mut ticker = interval(ping_interval);
            loop {
                ticker.tick().await;
                keepalive_hub.publish(Frame::Keepalive);
            }
        });

        let snapshot_hub = self.clone();
        let snapshot_task = tokio::spawn(async move {
            let mut ticker = interval(status_interval);
            loop {
                ticker.tick().await;
                if snapshot_hub.subscriber_count() == 0 {
                    continue;
                }
                match snapshot_all(repository.as_ref(), &current_states).await {
                    Ok(endpoints) => snapshot_hub.publish(Frame::StatusSnapshot { endpoints }),
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to build status snapshot");
                    }
                }
            }
        });

        info!("broadcast hub background tasks started");
        vec![keepalive_task, snapshot_task]
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}

async fn snapshot_all<R: Repository + ?Sized>(
    repository: &R,
    current_states: &DashMap<Uuid, EndpointState>,
) -> sentinel_repository::RepoResult<Vec<EndpointStatus>> {
    let endpoints = repository.list_all_enabled_endpoints().await?;
    let statuses = endpoints
        .into_iter()
        .map(|endpoint| EndpointStatus {
            endpoint_id: endpoint.id,
            state: current_states
                .get(&endpoint.id)
                .map(|entry| *entry.value())
                .unwrap_or(EndpointState::Unknown),
        })
        .collect();
    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_frame() {
        let hub = BroadcastHub::new(4);
        let (_, mut rx) = hub.subscribe();
        hub.publish(Frame::Keepalive);
        let frame = rx.recv().await.unwrap();
        assert!(matches!(frame, Frame::Keepalive));
    }

    #[tokio::test]
    async fn full_mailbox_drops_oldest_in_favor_of_newest() {
        let hub = BroadcastHub::new(1);
        let (_, mut rx) = hub.subscribe();
        hub.publish(Frame::Keepalive);
        // Buffer (capacity 1) is now full of the unread keepalive; this
        // publish must displace it rather than being silently lost for the
        // subscriber forever.
        let transition = sample_transition();
        hub.publish(Frame::Transition(transition.clone()));

        // The receiver observes the gap as a `Lagged` error on its next
        // `recv`, then resumes from the oldest still-available frame, which
        // is the transition that evicted the keepalive.
        let received = loop {
            match rx.recv().await {
                Ok(frame) => break frame,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("unexpected recv error: {e}"),
            }
        };
        assert!(matches!(received, Frame::Transition(t) if t.endpoint_id == transition.endpoint_id));
    }

    #[tokio::test]
    async fn unsubscribe_is_a_harmless_no_op() {
        let hub = BroadcastHub::new(4);
        let (id, _rx) = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        hub.unsubscribe(id);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn dropping_a_receiver_decrements_subscriber_count() {
        let hub = BroadcastHub::new(4);
        let (_, rx) = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        drop(rx);
        assert_eq!(hub.subscriber_count(), 0);
    }

    fn sample_transition() -> StateTransition {
        use sentinel_core::ProbeResult;
        let endpoint_id = Uuid::new_v4();
        StateTransition {
            endpoint_id,
            old_state: EndpointState::Up,
            new_state: EndpointState::Down,
            at: chrono::Utc::now(),
            triggering_probe: ProbeResult::failure(endpoint_id, Some(500), "error"),
        }
    }
}
