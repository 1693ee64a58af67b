//! Scheduler and worker pool.
//!
//! Each enabled endpoint gets an independent cadence ticker. Ticks become
//! jobs on a bounded queue; a fixed-size worker pool drains the queue. At
//! most one probe may be outstanding per endpoint at a time — a tick that
//! arrives while a probe is in flight is coalesced by the most-recent-wins
//! policy on the per-endpoint pending slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use sentinel_core::{Endpoint, ProbeResult};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::prober::Prober;

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 10;
/// Default bounded queue depth, expressed as a multiple of worker count.
pub const QUEUE_DEPTH_MULTIPLIER: usize = 4;
/// Default graceful-shutdown budget.
pub const DEFAULT_GRACEFUL_SHUTDOWN: Duration = Duration::from_secs(30);

/// A unit of scheduled work: probe this endpoint now.
#[derive(Debug, Clone)]
struct Job {
    endpoint: Endpoint,
}

/// Control messages the scheduler accepts for endpoint mutation.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    Add(Endpoint),
    Update(Endpoint),
    Delete(Uuid),
}

/// Sink the scheduler delivers completed probes to. The caller (composition
/// root) wires this to the state deriver / incident manager / broadcast hub.
pub type ResultSink = mpsc::Sender<ProbeResult>;

struct TickerHandle {
    cancel: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
    interval_secs: u32,
}

/// Owns per-endpoint cadence tickers and a fixed worker pool.
pub struct Scheduler {
    job_tx: Mutex<Option<mpsc::Sender<Job>>>,
    job_rx: Mutex<Option<mpsc::Receiver<Job>>>,
    tickers: Mutex<HashMap<Uuid, TickerHandle>>,
    in_flight: Arc<dashmap::DashSet<Uuid>>,
    workers: usize,
    prober: Arc<Prober>,
    result_sink: ResultSink,
    shutdown: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(workers: usize, prober: Arc<Prober>, result_sink: ResultSink) -> Arc<Self> {
        let queue_depth = workers * QUEUE_DEPTH_MULTIPLIER;
        let (job_tx, job_rx) = mpsc::channel(queue_depth.max(1));
        Arc::new(Self {
            job_tx: Mutex::new(Some(job_tx)),
            job_rx: Mutex::new(Some(job_rx)),
            tickers: Mutex::new(HashMap::new()),
            in_flight: Arc::new(dashmap::DashSet::new()),
            workers,
            prober,
            result_sink,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Apply a control event: add/update/delete an endpoint's ticker.
    pub async fn apply(self: &Arc<Self>, event: ControlEvent) {
        match event {
            ControlEvent::Add(endpoint) => self.start_ticker(endpoint).await,
            ControlEvent::Update(endpoint) => {
                let mut tickers = self.tickers.lock().await;
                let needs_restart = tickers
                    .get(&endpoint.id)
                    .map(|t| t.interval_secs != endpoint.interval_secs)
                    .unwrap_or(true);
                if needs_restart {
                    if let Some(old) = tickers.remove(&endpoint.id) {
                        old.cancel.store(true, Ordering::SeqCst);
                        old.task.abort();
                    }
                    drop(tickers);
                    if endpoint.enabled {
                        self.start_ticker(endpoint).await;
                    }
                }
            }
            ControlEvent::Delete(id) => {
                let mut tickers = self.tickers.lock().await;
                if let Some(ticker) = tickers.remove(&id) {
                    ticker.cancel.store(true, Ordering::SeqCst);
                    ticker.task.abort();
                }
                self.in_flight.remove(&id);
            }
        }
    }

    async fn start_ticker(self: &Arc<Self>, endpoint: Endpoint) {
        if !endpoint.enabled {
            return;
        }
        let Some(job_tx) = self.job_tx.lock().await.clone() else {
            // Scheduler is shutting down; refuse new tickers.
            return;
        };
        let id = endpoint.id;
        let interval_secs = endpoint.interval_secs;
        let cancel = Arc::new(AtomicBool::new(false));
        let in_flight = self.in_flight.clone();
        let ticker_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs as u64));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if ticker_cancel.load(Ordering::SeqCst) {
                    break;
                }
                if in_flight.contains(&id) {
                    // Coalesce: a probe for this endpoint is already running
                    // or already queued.
                    continue;
                }
                in_flight.insert(id);
                let job = Job {
                    endpoint: endpoint.clone(),
                };
                if job_tx.try_send(job).is_err() {
                    // Queue full: drop the oldest-pending-for-this-endpoint
                    // semantics collapse to "this tick is dropped", since the
                    // in-flight guard already prevents pile-up per endpoint.
                    in_flight.remove(&id);
                    warn!(endpoint_id = %id, "scheduler queue full, dropping tick");
                }
            }
        });

        self.tickers.lock().await.insert(
            id,
            TickerHandle {
                cancel,
                task,
                interval_secs,
            },
        );
    }

    /// Run the fixed-size worker pool until the queue closes. Call once
    /// from the composition root; returns after `shutdown` drains it.
    /// Concurrency is capped at `self.workers` via a semaphore rather than
    /// a dedicated pool of long-lived tasks, so a stuck probe only starves
    /// its own permit, not a whole worker's queue.
    pub async fn run(self: Arc<Self>) {
        let mut rx = self
            .job_rx
            .lock()
            .await
            .take()
            .expect("run() must only be called once");

        let permits = Arc::new(tokio::sync::Semaphore::new(self.workers));
        let mut inflight_tasks: JoinSet<()> = JoinSet::new();

        while let Some(job) = rx.recv().await {
            let permit = permits.clone().acquire_owned().await.expect("semaphore never closed");
            let prober = self.prober.clone();
            let result_sink = self.result_sink.clone();
            let in_flight = self.in_flight.clone();
            inflight_tasks.spawn(async move {
                let _permit = permit;
                run_job(job, &prober, &result_sink, &in_flight).await;
            });
            // Bound memory: reap finished tasks instead of letting the set
            // grow unboundedly across the scheduler's lifetime.
            while inflight_tasks.try_join_next().is_some() {}
        }
        while inflight_tasks.join_next().await.is_some() {}
    }

    /// Shutdown sequence: stop tickers, refuse new enqueues, wait up to
    /// `graceful` for in-flight probes, then drain and close.
    pub async fn shutdown(self: &Arc<Self>, graceful: Duration) {
        self.shutdown.store(true, Ordering::SeqCst);
        let mut tickers = self.tickers.lock().await;
        for (_, ticker) in tickers.drain() {
            ticker.cancel.store(true, Ordering::SeqCst);
            ticker.task.abort();
        }
        drop(tickers);
        // Dropping the last sender lets `run()`'s receive loop end once the
        // queue drains, closing the output channel in turn.
        self.job_tx.lock().await.take();

        let deadline = tokio::time::Instant::now() + graceful;
        while !self.in_flight.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if !self.in_flight.is_empty() {
            warn!(
                outstanding = self.in_flight.len(),
                "shutdown deadline reached with probes still in flight"
            );
        }
        info!("scheduler shutdown complete");
    }
}

async fn run_job(
    job: Job,
    prober: &Arc<Prober>,
    result_sink: &ResultSink,
    in_flight: &dashmap::DashSet<Uuid>,
) {
    let endpoint_id = job.endpoint.id;
    let outcome = std::panic::AssertUnwindSafe(prober.probe(&job.endpoint))
        .catch_unwind()
        .await;

    let result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            error!(endpoint_id = %endpoint_id, error = %e, "probe failed to execute");
            ProbeResult::failure(endpoint_id, None, e.to_string())
        }
        Err(_) => {
            // A panic inside a worker is recovered and logged as a
            // synthetic failed probe; the worker continues.
            error!(endpoint_id = %endpoint_id, "worker panicked during probe, recovered");
            ProbeResult::failure(endpoint_id, None, "internal error: probe task panicked")
        }
    };

    in_flight.remove(&endpoint_id);
    let _ = result_sink.send(result).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::HttpMethod;
    use std::collections::BTreeMap;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(url: String, interval: u32) -> Endpoint {
        let now = chrono::Utc::now();
        Endpoint {
            id: Uuid::new_v4(),
            name: "svc".into(),
            description: None,
            url,
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            body: None,
            interval_secs: interval,
            timeout_secs: 5,
            expected_status: Endpoint::default_expected_status(),
            max_retry_attempts: 0,
            retry_backoff_secs: 1,
            critical: false,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn at_most_one_outstanding_probe_per_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::channel(16);
        let prober = Arc::new(Prober::new().unwrap());
        let scheduler = Scheduler::new(2, prober, tx);
        let runner = tokio::spawn(scheduler.clone().run());

        scheduler
            .apply(ControlEvent::Add(endpoint(server.uri(), 60)))
            .await;

        // Force extra ticks quickly to confirm they coalesce rather than
        // piling up: with only one slow mock response in flight we expect
        // exactly one completed probe result within the test window.
        tokio::time::sleep(Duration::from_millis(400)).await;
        scheduler.shutdown(Duration::from_secs(1)).await;
        drop(scheduler);

        let mut count = 0;
        while tokio::time::timeout(Duration::from_millis(50), rx.recv())
            .await
            .ok()
            .flatten()
            .is_some()
        {
            count += 1;
        }
        assert_eq!(count, 1, "exactly one probe result expected before shutdown");
        let _ = runner.await;
    }
}
