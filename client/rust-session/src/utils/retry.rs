use std::time::Duration;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
            jitter_max: Some(Duration::from_millis(50)),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting. Used where the caller handles failure itself.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter_max: None,
        }
    }

    fn wait_for(&self, backoff: Duration) -> Duration {
        match self.jitter_max {
            Some(jitter_max) => {
                let jitter_ms = jitter_max.as_millis() as u64;
                let extra = if jitter_ms == 0 {
                    0
                } else {
                    rand::random::<u64>() % (jitter_ms + 1)
                };
                backoff + Duration::from_millis(extra)
            }
            None => backoff,
        }
    }
}

/// Runs `op` until it succeeds, the policy is exhausted, or `is_transient`
/// rejects the error. Non-transient errors are returned immediately.
pub async fn retry_transient<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut op: F,
    is_transient: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempts_left = policy.max_attempts.max(1);
    let mut backoff = policy.base_backoff;

    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempts_left = attempts_left.saturating_sub(1);
                if attempts_left == 0 || !is_transient(&e) {
                    return Err(e);
                }

                let wait = policy.wait_for(backoff);
                tracing::debug!("Transient failure, retrying in {}ms", wait.as_millis());
                tokio::time::sleep(wait).await;

                backoff = std::cmp::min(backoff * 2, policy.max_backoff);
            }
        }
    }
}
