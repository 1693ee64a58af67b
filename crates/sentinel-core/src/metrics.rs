//! Process-level counters exposed by the admin `/metrics` endpoint. Plain
//! atomics, incremented at the call sites that already emit `tracing`
//! events for the same outcome; no exporter lives here, that's an
//! API-layer concern.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::notification::ChannelType;

#[derive(Debug, Default)]
pub struct Metrics {
    pub probes_executed: AtomicU64,
    pub probes_failed: AtomicU64,
    pub incidents_opened: AtomicU64,
    pub incidents_resolved: AtomicU64,
    notifications_sent: DashMap<ChannelType, AtomicU64>,
    notifications_failed: DashMap<ChannelType, AtomicU64>,
}

impl Metrics {
    pub fn record_probe(&self, success: bool) {
        self.probes_executed.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.probes_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_incident_opened(&self) {
        self.incidents_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_incident_resolved(&self) {
        self.incidents_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self, provider: ChannelType, success: bool) {
        let map = if success {
            &self.notifications_sent
        } else {
            &self.notifications_failed
        };
        map.entry(provider).or_insert_with(|| AtomicU64::new(0)).fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the per-provider delivery counters as `(sent, failed)`
    /// pairs, for the `/metrics` handler to serialize.
    pub fn delivery_snapshot(&self) -> Vec<(ChannelType, u64, u64)> {
        let mut channels: Vec<ChannelType> = self
            .notifications_sent
            .iter()
            .map(|e| *e.key())
            .chain(self.notifications_failed.iter().map(|e| *e.key()))
            .collect();
        channels.sort();
        channels.dedup();
        channels
            .into_iter()
            .map(|channel| {
                let sent = self
                    .notifications_sent
                    .get(&channel)
                    .map(|c| c.load(Ordering::Relaxed))
                    .unwrap_or(0);
                let failed = self
                    .notifications_failed
                    .get(&channel)
                    .map(|c| c.load(Ordering::Relaxed))
                    .unwrap_or(0);
                (channel, sent, failed)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_failure_counts_both_totals() {
        let metrics = Metrics::default();
        metrics.record_probe(true);
        metrics.record_probe(false);
        assert_eq!(metrics.probes_executed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.probes_failed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn delivery_snapshot_tracks_each_provider_independently() {
        let metrics = Metrics::default();
        metrics.record_delivery(ChannelType::Webhook, true);
        metrics.record_delivery(ChannelType::Webhook, false);
        metrics.record_delivery(ChannelType::Slack, true);
        let snapshot = metrics.delivery_snapshot();
        assert_eq!(snapshot.len(), 2);
        let webhook = snapshot.iter().find(|(c, ..)| *c == ChannelType::Webhook).unwrap();
        assert_eq!((webhook.1, webhook.2), (1, 1));
    }
}
