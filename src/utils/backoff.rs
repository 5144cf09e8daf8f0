use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio::time::Instant;

use crate::BackoffPolicy;
use crate::Result;

/// Randomized exponential backoff driven by a [`BackoffPolicy`].
///
/// Time is measured with `tokio::time`, so paused test clocks apply.
#[derive(Debug)]
pub struct ExponentialBackoff {
    policy: BackoffPolicy,
    current_interval: Duration,
    started_at: Instant,
}

impl ExponentialBackoff {
    pub fn new(policy: &BackoffPolicy) -> Self {
        Self {
            policy: *policy,
            current_interval: Duration::from_millis(policy.initial_interval_ms),
            started_at: Instant::now(),
        }
    }

    /// Restarts both the interval progression and the elapsed budget.
    pub fn reset(&mut self) {
        self.current_interval = Duration::from_millis(self.policy.initial_interval_ms);
        self.started_at = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Delay before the next attempt, or `None` once the elapsed budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        let delay = randomize(self.current_interval, self.policy.randomization_factor);
        self.increment_interval();

        if self.policy.is_bounded()
            && self.elapsed() + delay > Duration::from_millis(self.policy.max_elapsed_ms)
        {
            return None;
        }
        Some(delay)
    }

    fn increment_interval(&mut self) {
        let next_ms = (self.current_interval.as_millis() as f64 * self.policy.multiplier).round() as u64;
        self.current_interval = Duration::from_millis(next_ms.min(self.policy.max_interval_ms));
    }
}

fn randomize(
    interval: Duration,
    randomization_factor: f64,
) -> Duration {
    if randomization_factor.is_nan() || randomization_factor <= 0.0 {
        return interval;
    }
    let secs = interval.as_secs_f64();
    let delta = randomization_factor * secs;
    Duration::from_secs_f64(rand::thread_rng().gen_range((secs - delta).max(0.0)..=(secs + delta)))
}

/// Runs `operation` until it succeeds, backing off between attempts.
///
/// `notify` is called with the failure and the upcoming delay before every
/// sleep. Permanent errors (see [`crate::Error::is_permanent`]) and an
/// exhausted elapsed budget return the last error.
pub async fn retry_notify<F, Fut, T, N>(
    policy: &BackoffPolicy,
    mut operation: F,
    mut notify: N,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    N: FnMut(&crate::Error, Duration),
{
    let mut backoff = ExponentialBackoff::new(policy);
    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if error.is_permanent() {
            return Err(error);
        }

        match backoff.next_backoff() {
            Some(delay) => {
                notify(&error, delay);
                sleep(delay).await;
            }
            None => return Err(error),
        }
    }
}
