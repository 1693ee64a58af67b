//! HTTP prober.

use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::Client;
use sentinel_core::{Endpoint, HttpMethod, ProbeResult};
use thiserror::Error;
use tracing::{info_span, warn, Instrument};

/// Probe bodies are read up to this cap to measure true time-to-completion;
/// content beyond it is discarded.
pub const BODY_CAP_BYTES: usize = 1024 * 1024;

/// Global ceiling on the computed backoff delay between retries, regardless
/// of endpoint configuration.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Maximum redirects followed before giving up.
pub const MAX_REDIRECTS: usize = 5;

#[derive(Error, Debug)]
pub enum ProberError {
    #[error("header {0} contains a CR or LF byte")]
    HeaderInjection(String),
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Executes configured HTTP checks against endpoints, with retries, backoff,
/// and a per-attempt deadline.
pub struct Prober {
    client: Client,
}

impl Prober {
    pub fn new() -> Result<Self, ProberError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .cookie_store(false)
            .build()
            .map_err(|e| ProberError::ClientBuild(e.to_string()))?;
        Ok(Self { client })
    }

    /// Run one full probe (initial attempt plus retries) against `endpoint`.
    /// Only the *final* attempt's outcome is returned for persistence;
    /// retries do not generate intermediate probe records, but
    /// the returned `response_time_ms` reflects total wall time across all
    /// attempts of this call.
    pub async fn probe(&self, endpoint: &Endpoint) -> Result<ProbeResult, ProberError> {
        validate_headers(&endpoint.headers)?;

        let started = Instant::now();
        let attempts = 1 + endpoint.max_retry_attempts as u32;
        let mut last_outcome: Option<(bool, Option<u16>, Option<String>)> = None;

        for attempt in 1..=attempts {
            let span = info_span!("probe_attempt", endpoint_id = %endpoint.id, attempt);
            let outcome = self.attempt(endpoint).instrument(span).await;
            let success = outcome.0;
            last_outcome = Some(outcome);

            if success || attempt == attempts {
                break;
            }

            let delay = backoff_delay(endpoint.retry_backoff_secs, attempt);
            warn!(
                endpoint_id = %endpoint.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "probe attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }

        let (success, status, error) = last_outcome.expect("at least one attempt always runs");
        let elapsed_ms = started.elapsed().as_millis() as u64;

        Ok(if success {
            ProbeResult::success(endpoint.id, status.unwrap_or(0), elapsed_ms)
        } else {
            let mut result = ProbeResult::failure(endpoint.id, status, error.unwrap_or_default());
            result.response_time_ms = Some(elapsed_ms);
            result
        })
    }

    async fn attempt(&self, endpoint: &Endpoint) -> (bool, Option<u16>, Option<String>) {
        let method = to_reqwest_method(endpoint.method);
        let mut builder = self
            .client
            .request(method, &endpoint.url)
            .timeout(Duration::from_secs(endpoint.timeout_secs as u64));

        for (name, value) in &endpoint.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &endpoint.body {
            builder = builder.body(body.clone());
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                match read_capped_body(response).await {
                    Ok(_) => {
                        let success = endpoint.expected_status.contains(&status);
                        (success, Some(status), None)
                    }
                    Err(e) => (false, Some(status), Some(e)),
                }
            }
            Err(e) => {
                let message = if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                };
                (false, None, Some(message))
            }
        }
    }
}

impl Default for Prober {
    fn default() -> Self {
        Self::new().expect("default reqwest client configuration is always valid")
    }
}

async fn read_capped_body(response: reqwest::Response) -> Result<usize, String> {
    use futures::StreamExt;
    let mut stream = response.bytes_stream();
    let mut total = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| e.to_string())?;
        total += chunk.len();
        if total >= BODY_CAP_BYTES {
            break;
        }
    }
    Ok(total)
}

fn validate_headers(headers: &std::collections::BTreeMap<String, String>) -> Result<(), ProberError> {
    for (name, value) in headers {
        if value.contains('\r') || value.contains('\n') {
            return Err(ProberError::HeaderInjection(name.clone()));
        }
    }
    Ok(())
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Options => reqwest::Method::OPTIONS,
    }
}

/// Exponential backoff `base * 2^(k-1)` with up to 25% jitter, capped by
/// `MAX_BACKOFF`.
pub fn backoff_delay(base_secs: u32, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    let base = Duration::from_secs(base_secs.max(1) as u64);
    let scaled = base.saturating_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX));
    let capped = scaled.min(MAX_BACKOFF);
    let jitter_frac: f64 = rand::thread_rng().gen_range(0.0..0.25);
    let jitter = capped.mul_f64(jitter_frac);
    (capped + jitter).min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::Endpoint;
    use std::collections::BTreeMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(url: String) -> Endpoint {
        let now = chrono::Utc::now();
        Endpoint {
            id: uuid::Uuid::new_v4(),
            name: "svc".into(),
            description: None,
            url,
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            body: None,
            interval_secs: 60,
            timeout_secs: 5,
            expected_status: Endpoint::default_expected_status(),
            max_retry_attempts: 2,
            retry_backoff_secs: 1,
            critical: false,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn successful_response_is_recorded_as_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let prober = Prober::new().unwrap();
        let result = prober
            .probe(&endpoint(format!("{}/health", server.uri())))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.status, Some(200));
    }

    #[tokio::test]
    async fn unexpected_status_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut ep = endpoint(format!("{}/health", server.uri()));
        ep.max_retry_attempts = 0;
        let prober = Prober::new().unwrap();
        let result = prober.probe(&ep).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.status, Some(500));
    }

    #[tokio::test]
    async fn final_attempt_only_is_persisted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut ep = endpoint(format!("{}/flaky", server.uri()));
        ep.retry_backoff_secs = 0;
        let prober = Prober::new().unwrap();
        let result = prober.probe(&ep).await.unwrap();
        assert!(result.success, "the final attempt succeeded, so the probe is a success");
    }

    #[test]
    fn header_with_crlf_is_rejected() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Custom".to_string(), "value\r\nSet-Cookie: evil".to_string());
        assert!(validate_headers(&headers).is_err());
    }

    #[test]
    fn backoff_grows_exponentially_and_is_capped() {
        let d1 = backoff_delay(1, 1);
        let d2 = backoff_delay(1, 2);
        assert!(d2 >= d1);
        let huge = backoff_delay(1, 30);
        assert!(huge <= MAX_BACKOFF + MAX_BACKOFF.mul_f64(0.25));
    }
}
