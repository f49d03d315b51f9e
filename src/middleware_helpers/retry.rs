use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Factor to multiply delay by after each attempt
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff schedule, one entry per attempt: 100ms, 200ms, 400ms with the defaults.
    ///
    /// The entry for the final attempt is never slept; after it the caller escalates.
    pub fn schedule(&self) -> Vec<Duration> {
        let mut delay = self.initial_delay;
        let mut schedule = Vec::with_capacity(self.max_attempts as usize);
        for _ in 0..self.max_attempts {
            schedule.push(delay);
            delay = self.next_delay(delay);
        }
        schedule
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_factor).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Retry policy for determining if an error is retryable
pub trait RetryPolicy<E> {
    fn is_retryable(&self, error: &E) -> bool;
}

impl<E, F> RetryPolicy<E> for F
where
    F: Fn(&E) -> bool,
{
    fn is_retryable(&self, error: &E) -> bool {
        self(error)
    }
}

/// Retryable database failures: connection loss, pool exhaustion, lock contention
/// and statement errors. Record-not-found and type conversion errors are final.
pub struct DbRetryPolicy;

impl RetryPolicy<sea_orm::DbErr> for DbRetryPolicy {
    fn is_retryable(&self, error: &sea_orm::DbErr) -> bool {
        use sea_orm::DbErr;

        matches!(
            error,
            DbErr::ConnectionAcquire(_)
                | DbErr::Conn(_)
                | DbErr::Exec(_)
                | DbErr::Query(_)
                | DbErr::Custom(_)
        )
    }
}

/// Returned once the operation gave up.
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub attempts: u32,
    pub error: E,
}

impl<E: fmt::Display> fmt::Display for RetryFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed after {} attempts: {}", self.attempts, self.error)
    }
}

/// Execute an async operation with exponential backoff.
///
/// `operation` receives the 1-based attempt number. No delay follows the
/// last attempt.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    policy: impl RetryPolicy<E>,
    mut operation: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation(attempts).await {
            Ok(result) => {
                if attempts > 1 {
                    debug!("Operation succeeded after {} attempts", attempts);
                }
                return Ok(result);
            }
            Err(error) => {
                if attempts >= config.max_attempts || !policy.is_retryable(&error) {
                    warn!("Operation failed after {} attempts: {}", attempts, error);
                    return Err(RetryFailure { attempts, error });
                }

                warn!(
                    "Attempt {} failed: {}. Retrying in {:?}...",
                    attempts, error, delay
                );

                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[test]
    fn default_schedule_doubles_from_100ms() {
        let schedule = RetryConfig::default().schedule();
        assert_eq!(
            schedule,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[test]
    fn schedule_is_capped_by_max_delay() {
        let config = RetryConfig {
            max_attempts: 4,
            initial_delay: Duration::from_millis(300),
            max_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
        };
        assert_eq!(config.schedule()[3], Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_attempts_with_backoff_between_them() {
        let calls: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();

        let result: Result<(), _> = with_retry(
            &RetryConfig::default(),
            |_: &String| true,
            move |_| {
                recorded.lock().unwrap().push(Instant::now());
                async { Err::<(), String>("database is locked".to_string()) }
            },
        )
        .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 3);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        let first_gap = calls[1] - calls[0];
        let second_gap = calls[2] - calls[1];
        assert!(first_gap >= Duration::from_millis(100) && first_gap < Duration::from_millis(150));
        assert!(second_gap >= Duration::from_millis(200) && second_gap < Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_success() {
        let result = with_retry(&RetryConfig::default(), |_: &String| true, |attempt| async move {
            if attempt < 2 {
                Err("transient".to_string())
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_is_returned_immediately() {
        let result: Result<(), _> =
            with_retry(&RetryConfig::default(), |_: &String| false, |_| async {
                Err::<(), String>("row missing".to_string())
            })
            .await;

        assert_eq!(result.unwrap_err().attempts, 1);
    }
}
