//! Monitoring engine: cadence scheduling and HTTP probing.

pub mod prober;
pub mod scheduler;

pub use prober::{Prober, ProberError, BODY_CAP_BYTES, MAX_BACKOFF, MAX_REDIRECTS};
pub use scheduler::{ControlEvent, ResultSink, Scheduler, DEFAULT_GRACEFUL_SHUTDOWN, DEFAULT_WORKERS};
