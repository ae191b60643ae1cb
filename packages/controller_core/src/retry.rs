use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

/// Fixed-interval polling with a hard attempt budget. Every wait in the
/// controller goes through one of these, so none of them is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    /// Waiting for the compositor and audio server after boot.
    pub const READINESS: RetryPolicy = RetryPolicy::new(60, Duration::from_secs(1));
    /// Waiting for the service process to appear or disappear.
    pub const PROCESS_STATE: RetryPolicy = RetryPolicy::new(20, Duration::from_millis(250));
    /// Waiting for a fresh install's control API to accept the first user.
    pub const INITIAL_CREDENTIALS: RetryPolicy = RetryPolicy::new(20, Duration::from_millis(250));

    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        RetryPolicy { max_attempts, interval }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// True if `attempt` (zero based) is the last one the budget allows.
    pub fn is_final(&self, attempt: u32) -> bool {
        attempt + 1 >= self.attempts()
    }

    /// Runs `attempt` until it breaks or the budget is spent, sleeping
    /// `interval` between attempts (never after the last). Returns the break
    /// value, or the value of the final attempt as the error.
    pub async fn run<B, C, F, Fut>(&self, mut attempt: F) -> Result<B, C>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ControlFlow<B, C>>,
    {
        let mut current = 0;

        loop {
            match attempt(current).await {
                ControlFlow::Break(value) => return Ok(value),
                ControlFlow::Continue(last) => {
                    if self.is_final(current) {
                        return Err(last);
                    }
                }
            }

            current += 1;
            tokio::time::sleep(self.interval).await;
        }
    }
}

pub(crate) fn describe_wait(interval: Duration) -> String {
    let secs = interval.as_secs_f64();
    if secs == 1.0 {
        "1 second".to_string()
    } else {
        format!("{} seconds", secs)
    }
}
