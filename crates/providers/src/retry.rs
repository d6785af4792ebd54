//! Retry with jittered exponential backoff.
//!
//! On a transient failure (no response at all, HTTP 429, any 5xx, a
//! timeout, or a provider-declared retryable error) the whole request is
//! restarted from scratch — streams are never resumed mid-flight. Attempt
//! `n` sleeps `initial_backoff * 2^n`, capped, plus up to ±20 % jitter.
//! Retries are invisible to callers; a non-retryable error or an exhausted
//! budget surfaces as a provider error wrapping the cause.

use std::future::Future;
use std::time::Duration;

use sw_domain::config::RetryConfig;
use sw_domain::error::{Error, Result};
use sw_domain::session::Session;

use crate::traits::{fold_chunks, ProviderResponse, StreamingClient};

/// Resolved retry policy for one provider.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// The backoff for the given attempt (0-indexed) before jitter:
    /// `initial * 2^attempt`, capped at `max_backoff`.
    pub fn pre_jitter_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_backoff.as_millis() as f64;
        let delay_ms = base_ms * 2f64.powi(attempt as i32);
        let capped_ms = delay_ms.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// The actual sleep for the given attempt: pre-jitter delay perturbed
    /// by up to ±20 %.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.pre_jitter_delay(attempt).as_millis() as f64;
        let jittered = base * (1.0 + 0.2 * jitter_fraction(attempt));
        Duration::from_millis(jittered.max(0.0) as u64)
    }
}

/// Cheap deterministic fraction in [-1, 1) based on the attempt number.
/// Not cryptographically random — just enough to spread retry storms.
fn jitter_fraction(attempt: u32) -> f64 {
    let hash = attempt.wrapping_add(1).wrapping_mul(2654435761); // Knuth multiplicative hash
    (hash as f64) / (u32::MAX as f64) * 2.0 - 1.0
}

/// Run `op`, retrying transient failures per `policy`.
///
/// Every retry restarts `op` from scratch. A non-retryable error, or an
/// exhausted budget, returns a provider error wrapping the cause.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, provider_id: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    provider = %provider_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient provider error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                let message = if e.is_transient() {
                    format!("retry budget exhausted after {attempt} retries: {e}")
                } else {
                    e.to_string()
                };
                return Err(Error::Provider {
                    provider: provider_id.to_owned(),
                    message,
                    retryable: false,
                });
            }
        }
    }
}

/// Stream the session and fold the chunks, retrying per `policy`.
pub async fn complete_with_retry(
    client: &dyn StreamingClient,
    session: &Session,
    policy: &RetryPolicy,
) -> Result<ProviderResponse> {
    with_retry(policy, client.provider_id(), move || async move {
        let stream = client.stream(session).await?;
        fold_chunks(stream).await
    })
    .await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use sw_domain::session::SessionMetadata;
    use sw_domain::stream::{BoxStream, Chunk};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(50),
        }
    }

    /// A provider that fails with HTTP 500 a fixed number of times, then
    /// streams a fixed response.
    struct FlakyClient {
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait::async_trait]
    impl StreamingClient for FlakyClient {
        fn provider_id(&self) -> &str {
            "flaky"
        }

        async fn stream(
            &self,
            _session: &Session,
        ) -> Result<BoxStream<'static, Result<Chunk>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(Error::Http {
                    status: Some(500),
                    message: "internal error".into(),
                });
            }
            Ok(Box::pin(futures_util::stream::iter(vec![
                Ok(Chunk::Text { text: "ok".into() }),
                Ok(Chunk::MessageStop),
            ])))
        }
    }

    fn session() -> Session {
        Session::new("sys", SessionMetadata::default())
    }

    #[tokio::test]
    async fn two_failures_then_success_records_two_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = FlakyClient {
            failures: 2,
            calls: calls.clone(),
        };
        let policy = fast_policy(3);

        let response = complete_with_retry(&client, &session(), &policy)
            .await
            .unwrap();
        assert_eq!(response.text, "ok");
        // 1 initial attempt + exactly 2 retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn budget_exhaustion_wraps_the_cause() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = FlakyClient {
            failures: 10,
            calls: calls.clone(),
        };
        let policy = fast_policy(2);

        let err = complete_with_retry(&client, &session(), &policy)
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3); // initial + 2 retries
        match err {
            Error::Provider {
                provider,
                message,
                retryable,
            } => {
                assert_eq!(provider, "flaky");
                assert!(message.contains("internal error"));
                assert!(!retryable);
            }
            other => panic!("expected provider error, got {other}"),
        }
    }

    #[tokio::test]
    async fn non_retryable_error_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let policy = fast_policy(3);

        let err = with_retry(&policy, "p", move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Http {
                    status: Some(401),
                    message: "unauthorized".into(),
                })
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, Error::Provider { retryable: false, .. }));
    }

    #[test]
    fn pre_jitter_backoff_is_strictly_increasing_until_the_cap() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        };
        let delays: Vec<_> = (0..5).map(|a| policy.pre_jitter_delay(a)).collect();
        for pair in delays.windows(2) {
            assert!(pair[1] > pair[0], "expected strictly increasing: {delays:?}");
        }
        assert_eq!(delays[0], Duration::from_millis(500));
        assert_eq!(delays[1], Duration::from_millis(1000));
        assert_eq!(delays[2], Duration::from_millis(2000));
    }

    #[test]
    fn pre_jitter_backoff_caps_at_max() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(30),
        };
        assert_eq!(policy.pre_jitter_delay(6), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let policy = RetryPolicy {
            max_retries: 8,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_secs(300),
        };
        for attempt in 0..8 {
            let pre = policy.pre_jitter_delay(attempt).as_millis() as f64;
            let actual = policy.delay_for_attempt(attempt).as_millis() as f64;
            let deviation = (actual - pre).abs() / pre;
            assert!(deviation <= 0.2 + 1e-3, "attempt {attempt}: deviation {deviation}");
        }
    }
}
