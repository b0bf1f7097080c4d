//! Retrying HTTP client for the upstream telemetry API.
//!
//! Wraps a [`Transport`] with a [`RetryPolicy`]: transient server statuses
//! and connection-level failures are retried with exponential backoff, up to
//! a fixed attempt budget. Every failure mode comes back as a [`FetchError`]
//! value so a bad gauge can never abort a scrape cycle.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Terminal fetch failure, after the retry budget is spent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// A raw HTTP response: status code and body text.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Transport-level failure for a single attempt.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("timed out")]
    Timeout,

    #[error("{0}")]
    Connection(String),
}

/// A single HTTP GET attempt. The retry loop sits on top of this seam, so
/// tests can drive it with a scripted fake instead of a live server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<RawResponse, TransportError>;
}

/// Production transport backed by a pooled `reqwest` client.
///
/// One instance is shared read-only by all workers across all scrape cycles.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(5)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<RawResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_reqwest_error)?;

        Ok(RawResponse { status, body })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connection(e.to_string())
    }
}

/// Retry policy: attempt budget, backoff schedule, and the set of HTTP
/// statuses treated as transient.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first (default 3, so 4 attempts total).
    pub max_retries: u32,

    /// Backoff before the first retry; doubles on each further retry.
    pub backoff_base: Duration,

    /// HTTP statuses that are retried rather than returned.
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            retry_statuses: vec![500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    /// Whether a response status should be retried.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Backoff before retry number `retry` (1-based): base * 2^(retry-1).
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(retry.saturating_sub(1))
    }
}

/// HTTP GET with transparent retry/backoff.
pub struct RetryingClient<T: Transport> {
    transport: T,
    policy: RetryPolicy,
    request_timeout: Duration,
}

impl<T: Transport> RetryingClient<T> {
    pub fn new(transport: T, policy: RetryPolicy, request_timeout: Duration) -> Self {
        Self {
            transport,
            policy,
            request_timeout,
        }
    }

    /// Fetch `url`, retrying transient failures per the policy.
    ///
    /// Returns the response body on any 2xx status. A non-retryable status
    /// fails immediately; exhausting the budget yields
    /// [`FetchError::Exhausted`] carrying the last attempt's failure.
    pub async fn get(&self, url: &str) -> Result<String, FetchError> {
        let mut last: Option<FetchError> = None;

        for attempt in 0..=self.policy.max_retries {
            // Backoff only before retries, never before the first attempt.
            if attempt > 0 {
                tokio::time::sleep(self.policy.backoff_delay(attempt)).await;
            }

            match self.transport.get(url, self.request_timeout).await {
                Ok(resp) if (200..300).contains(&resp.status) => return Ok(resp.body),
                Ok(resp) if self.policy.is_retryable_status(resp.status) => {
                    tracing::debug!(
                        url,
                        status = resp.status,
                        attempt,
                        "Transient HTTP status, retrying"
                    );
                    last = Some(FetchError::Status(resp.status));
                }
                Ok(resp) => return Err(FetchError::Status(resp.status)),
                Err(TransportError::Timeout) => {
                    tracing::debug!(url, attempt, "Request timed out, retrying");
                    last = Some(FetchError::Timeout);
                }
                Err(TransportError::Connection(e)) => {
                    tracing::debug!(url, attempt, error = %e, "Connection error, retrying");
                    last = Some(FetchError::Connection(e));
                }
            }
        }

        let attempts = self.policy.max_retries + 1;
        Err(FetchError::Exhausted {
            attempts,
            last: last
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    /// Transport returning a scripted sequence of results.
    struct FakeTransport {
        script: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
        calls: AtomicUsize,
    }

    impl FakeTransport {
        fn new(script: Vec<Result<RawResponse, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn get(&self, _url: &str, _timeout: Duration) -> Result<RawResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TransportError::Connection("script exhausted".into())))
        }
    }

    fn ok(status: u16, body: &str) -> Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status,
            body: body.to_string(),
        })
    }

    fn client(transport: FakeTransport) -> RetryingClient<FakeTransport> {
        RetryingClient::new(transport, RetryPolicy::default(), Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt_no_backoff() {
        let client = client(FakeTransport::new(vec![ok(200, "hello")]));

        let start = Instant::now();
        let body = client.get("http://example/x").await.unwrap();

        assert_eq!(body, "hello");
        assert_eq!(client.transport.calls(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_on_transient_status_then_succeeds() {
        let client = client(FakeTransport::new(vec![
            ok(503, ""),
            ok(503, ""),
            ok(200, "data"),
        ]));

        let start = Instant::now();
        let body = client.get("http://example/x").await.unwrap();

        assert_eq!(body, "data");
        assert_eq!(client.transport.calls(), 3);
        // Two backoffs precede the third attempt: 0.5s + 1.0s.
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_status_fails_immediately() {
        let client = client(FakeTransport::new(vec![ok(404, "not found")]));

        let err = client.get("http://example/x").await.unwrap_err();

        assert_eq!(err, FetchError::Status(404));
        assert_eq!(client.transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_four_attempts() {
        let client = client(FakeTransport::new(vec![
            ok(502, ""),
            ok(502, ""),
            ok(502, ""),
            ok(502, ""),
        ]));

        let err = client.get("http://example/x").await.unwrap_err();

        assert_eq!(client.transport.calls(), 4);
        match err {
            FetchError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert!(last.contains("502"));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_on_connection_error() {
        let client = client(FakeTransport::new(vec![
            Err(TransportError::Connection("refused".into())),
            ok(200, "recovered"),
        ]));

        let body = client.get("http://example/x").await.unwrap();
        assert_eq!(body, "recovered");
        assert_eq!(client.transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_on_timeout() {
        let client = client(FakeTransport::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
        ]));

        let err = client.get("http://example/x").await.unwrap_err();
        match err {
            FetchError::Exhausted { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[test]
    fn test_backoff_schedule_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_retryable_status_set() {
        let policy = RetryPolicy::default();
        for status in [500, 502, 503, 504] {
            assert!(policy.is_retryable_status(status));
        }
        for status in [200, 301, 400, 404, 429] {
            assert!(!policy.is_retryable_status(status));
        }
    }
}
