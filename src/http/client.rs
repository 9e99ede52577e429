//! Retrying HTTP fetcher
//!
//! One bounded state machine per call: attempt, classify, sleep, retry.
//! Permanent failures (4xx other than 429) surface immediately; 429,
//! 5xx, timeouts and connection failures back off exponentially until
//! the retry limit is exhausted.

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Liveness probe: quick attempts with a tight timeout, never more
const PROBE_ATTEMPTS: u32 = 3;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_WAIT: Duration = Duration::from_secs(1);

/// Bounded exponential-backoff retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Wait before the first retry; doubles on each subsequent one
    pub initial_wait: Duration,
    /// Number of retries after the initial attempt
    pub retry_limit: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_wait: Duration::from_secs(1),
            retry_limit: 5,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry `n` (1-based): `initial * 2^(n-1)`
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_wait * factor
    }
}

/// Sleep seam so retry timing is deterministic under test
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, wait: Duration);
}

/// Production sleeper backed by the tokio timer
#[derive(Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, wait: Duration) {
        tokio::time::sleep(wait).await;
    }
}

/// HTTP fetcher wrapping every outbound call in the retry state machine
pub struct RetryingFetcher {
    client: Client,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryingFetcher {
    /// Create a fetcher with the given retry policy.
    ///
    /// Connections are kept alive across slices; that's an optimization,
    /// not something callers may rely on.
    pub fn new(policy: RetryPolicy) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .user_agent(concat!("mixport/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the sleeper (tests use a recording no-op)
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// The active retry policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET the URL with the given query pairs, returning the body text
    pub async fn get(&self, url: &str, query: &[(String, String)]) -> Result<String> {
        self.request_text(Method::GET, url, query, None).await
    }

    /// POST a form body, returning the response text
    pub async fn post_form(&self, url: &str, form: &[(String, String)]) -> Result<String> {
        self.request_text(Method::POST, url, &[], Some(form)).await
    }

    /// Probe the service root for liveness.
    ///
    /// A small number of quick, tightly-bounded attempts; never errors,
    /// returns false on exhaustion so callers can fail fast with a
    /// service-unavailable condition before starting real work.
    pub async fn service_available(&self, endpoint: &str) -> bool {
        let Some(root) = service_root(endpoint) else {
            return false;
        };

        for attempt in 1..=PROBE_ATTEMPTS {
            let result = self
                .client
                .get(root.clone())
                .timeout(PROBE_TIMEOUT)
                .send()
                .await;
            match result {
                Ok(response) if !response.status().is_server_error() => return true,
                Ok(response) => {
                    debug!(
                        "Liveness probe got HTTP {} (attempt {attempt}/{PROBE_ATTEMPTS})",
                        response.status()
                    );
                }
                Err(e) => {
                    debug!("Liveness probe failed (attempt {attempt}/{PROBE_ATTEMPTS}): {e}");
                }
            }
            if attempt < PROBE_ATTEMPTS {
                self.sleeper.sleep(PROBE_WAIT).await;
            }
        }
        false
    }

    async fn request_text(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        form: Option<&[(String, String)]>,
    ) -> Result<String> {
        let mut attempt = 1u32;
        loop {
            match self.try_once(method.clone(), url, query, form).await {
                Ok(body) => {
                    debug!("Request succeeded: {method} {url}");
                    return Ok(body);
                }
                Err(e) if e.is_retryable() => {
                    if attempt > self.policy.retry_limit {
                        return Err(Error::RetriesExhausted {
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }
                    let wait = self.policy.backoff(attempt);
                    warn!(
                        "Request failed (attempt {attempt}/{}), retrying in {wait:?}: {e}",
                        self.policy.retry_limit + 1
                    );
                    self.sleeper.sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_once(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        form: Option<&[(String, String)]>,
    ) -> Result<String> {
        let mut request = self.client.request(method, url).timeout(REQUEST_TIMEOUT);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(form) = form {
            request = request.form(form);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    response.text().await.map_err(Error::Http)
                } else {
                    let body = response.text().await.unwrap_or_default();
                    Err(Error::http_status(status.as_u16(), body))
                }
            }
            Err(e) if e.is_timeout() => Err(Error::Timeout {
                timeout_ms: REQUEST_TIMEOUT.as_millis() as u64,
            }),
            Err(e) => Err(Error::Http(e)),
        }
    }
}

impl std::fmt::Debug for RetryingFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingFetcher")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Root URL of the service an endpoint belongs to
fn service_root(endpoint: &str) -> Option<Url> {
    let mut url = Url::parse(endpoint).ok()?;
    url.set_path("/");
    url.set_query(None);
    Some(url)
}
