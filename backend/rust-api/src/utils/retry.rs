use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(500),
            jitter_max: Some(Duration::from_millis(25)),
        }
    }
}

impl RetryConfig {
    /// Attempt writes: a few quick retries, then the failure is surfaced.
    pub fn remote_write() -> Self {
        Self::default()
    }

    /// Document-processing status polls: long-lived, capped backoff.
    pub fn processing_poll() -> Self {
        Self {
            max_attempts: 120,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            jitter_max: Some(Duration::from_millis(250)),
        }
    }

    pub fn no_wait(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter_max: None,
        }
    }
}

pub async fn retry_async_with_config<F, Fut, T, E>(config: RetryConfig, f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    retry_async_when(config, f, |_| true).await
}

/// Retries while `should_retry` accepts the error; other errors return immediately.
pub async fn retry_async_when<F, Fut, T, E, P>(
    config: RetryConfig,
    mut f: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempts_left = config.max_attempts.max(1);
    let mut backoff = config.base_backoff;

    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempts_left = attempts_left.saturating_sub(1);
                if attempts_left == 0 || !should_retry(&e) {
                    return Err(e);
                }

                let extra = match config.jitter_max {
                    Some(jitter_max) if !jitter_max.is_zero() => {
                        let jitter_ms = jitter_max.as_millis() as u64;
                        Duration::from_millis(rand::random::<u64>() % (jitter_ms + 1))
                    }
                    _ => Duration::ZERO,
                };
                let wait = backoff + extra;
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }

                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retry_succeeds_after_retries() {
        let counter = AtomicUsize::new(0);

        let res: Result<usize, &'static str> =
            retry_async_with_config(RetryConfig::no_wait(3), || async {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("fail")
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(res, Ok(2));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_fails_after_max_attempts() {
        let counter = AtomicUsize::new(0);

        let res: Result<(), &'static str> =
            retry_async_with_config(RetryConfig::no_wait(2), || async {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("always fail")
            })
            .await;

        assert!(res.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let counter = AtomicUsize::new(0);

        let res: Result<(), &'static str> = retry_async_when(
            RetryConfig::no_wait(5),
            || async {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("fatal")
            },
            |err| *err != "fatal",
        )
        .await;

        assert_eq!(res, Err("fatal"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backoff_waits_between_attempts() {
        let cfg = RetryConfig {
            max_attempts: 3,
            base_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(10),
            jitter_max: None,
        };
        let started = std::time::Instant::now();

        let res: Result<(), ()> = retry_async_with_config(cfg, || async { Err(()) }).await;

        assert!(res.is_err());
        assert!(started.elapsed() >= Duration::from_millis(15));
    }
}
