use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RemoteError;

/// Bounded retry with linear backoff for remote calls.
///
/// Transient (5xx) failures are retried up to `max_attempts` times, sleeping
/// `attempt * base_delay` between attempts. Fatal failures are returned
/// immediately. Exhaustion and cancellation both yield the caller's give-up
/// value rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before the attempt after `attempt`, saturating at
    /// [`Duration::MAX`].
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.checked_mul(attempt).unwrap_or(Duration::MAX)
    }

    /// Runs `op` under this policy.
    ///
    /// `url` identifies the pull request in log output. If `cancel` fires
    /// during a backoff sleep the loop stops and `give_up` is returned; the
    /// token is left cancelled for the caller to observe.
    pub async fn run<T, F, Fut>(
        &self,
        url: &str,
        cancel: &CancellationToken,
        give_up: T,
        mut op: F,
    ) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 0;

        while attempt < self.max_attempts {
            let (status, message) = match op().await {
                Ok(value) => return Ok(value),
                Err(RemoteError::Transient { status, message }) => (status, message),
                Err(RemoteError::Fatal(err)) => return Err(err),
            };

            attempt += 1;
            warn!(
                url,
                status,
                attempt,
                max_attempts = self.max_attempts,
                "Server error ({message}), attempt {attempt}/{}",
                self.max_attempts
            );

            if attempt >= self.max_attempts {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(url, attempt, "Cancelled during backoff");
                    return Ok(give_up);
                }
                _ = tokio::time::sleep(self.backoff(attempt)) => {}
            }
        }

        warn!(url, "Giving up after repeated server errors");
        Ok(give_up)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        fmt,
        sync::{
            Arc, Mutex,
            atomic::{AtomicU32, Ordering},
        },
    };

    use tokio::time::Instant;
    use tracing::{
        Event, Level, Subscriber,
        field::{Field, Visit},
    };
    use tracing_subscriber::{
        Layer,
        layer::{Context, SubscriberExt},
    };

    use super::*;

    const URL: &str = "https://github.com/o/r/pull/1";

    /// Records the fields of every warning emitted while installed.
    #[derive(Clone, Default)]
    struct Warnings(Arc<Mutex<Vec<BTreeMap<String, String>>>>);

    impl Warnings {
        fn fields(&self) -> Vec<BTreeMap<String, String>> {
            self.0.lock().unwrap().clone()
        }
    }

    struct FieldMap<'a>(&'a mut BTreeMap<String, String>);

    impl Visit for FieldMap<'_> {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.insert(field.name().to_string(), value.to_string());
        }

        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.insert(field.name().to_string(), format!("{value:?}"));
        }
    }

    impl<S: Subscriber> Layer<S> for Warnings {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                let mut fields = BTreeMap::new();
                event.record(&mut FieldMap(&mut fields));
                self.0.lock().unwrap().push(fields);
            }
        }
    }

    fn flaky(failures: u32, calls: &AtomicU32) -> Result<&'static str, RemoteError> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < failures {
            Err(RemoteError::transient(502, "Bad Gateway"))
        } else {
            Ok("done")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_two_transient_failures() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let result = RetryPolicy::default()
            .run("https://github.com/o/r/pull/1", &cancel, "gave up", || {
                let calls = &calls;
                async move { flaky(2, calls) }
            })
            .await
            .unwrap();

        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result = RetryPolicy::default()
            .run("https://github.com/o/r/pull/1", &cancel, "gave up", || {
                let calls = &calls;
                async move { flaky(u32::MAX, calls) }
            })
            .await
            .unwrap();

        assert_eq!(result, "gave up");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: anyhow::Result<bool> = RetryPolicy::default()
            .run("https://github.com/o/r/pull/1", &cancel, false, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RemoteError::Fatal(anyhow::anyhow!("connection reset"))) }
            })
            .await;

        assert!(result.unwrap_err().to_string().contains("connection reset"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_backoff_gives_up() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result = RetryPolicy::default()
            .run("https://github.com/o/r/pull/1", &cancel, "gave up", || {
                let calls = &calls;
                let cancel = &cancel;
                async move {
                    // Fail once, then cancel before the backoff completes.
                    let result = flaky(u32::MAX, calls);
                    cancel.cancel();
                    result
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "gave up");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_scales_with_base_delay() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let result = RetryPolicy::new(4, Duration::from_millis(250))
            .run("https://github.com/o/r/pull/1", &cancel, "gave up", || {
                let calls = &calls;
                async move { flaky(u32::MAX, calls) }
            })
            .await
            .unwrap();

        assert_eq!(result, "gave up");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 250ms + 500ms + 750ms; no sleep after the final attempt.
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_names_url_and_attempt() {
        let warnings = Warnings::default();
        let _default =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(warnings.clone()));
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        RetryPolicy::default()
            .run(URL, &cancel, "gave up", || {
                let calls = &calls;
                async move { flaky(1, calls) }
            })
            .await
            .unwrap();

        let fields = warnings.fields();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0]["url"], URL);
        assert_eq!(fields[0]["attempt"], "1");
        assert_eq!(fields[0]["max_attempts"], "3");
        assert_eq!(fields[0]["status"], "502");
        assert!(fields[0]["message"].contains("attempt 1/3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_warnings_count_up_to_give_up() {
        let warnings = Warnings::default();
        let _default =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(warnings.clone()));
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        RetryPolicy::default()
            .run(URL, &cancel, "gave up", || {
                let calls = &calls;
                async move { flaky(u32::MAX, calls) }
            })
            .await
            .unwrap();

        let fields = warnings.fields();
        let attempts: Vec<&str> = fields
            .iter()
            .filter_map(|f| f.get("attempt").map(String::as_str))
            .collect();
        assert_eq!(attempts, ["1", "2", "3"]);
        assert!(fields.iter().all(|f| f["url"] == URL));
        let last = fields.last().unwrap();
        assert!(last["message"].contains("Giving up"));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy::new(3, Duration::from_secs(u64::MAX / 2 + 1));
        assert_eq!(policy.backoff(1), Duration::from_secs(u64::MAX / 2 + 1));
        assert_eq!(policy.backoff(2), Duration::MAX);
    }
}
