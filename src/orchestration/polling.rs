use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// Cooperative stop signal shared between a caller and a running workflow.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Sleeps in short slices. Returns `false` if cancelled before or during
    /// the wait.
    pub fn sleep(&self, total: Duration) -> bool {
        let mut remaining = total;
        while !remaining.is_zero() {
            if self.is_cancelled() {
                return false;
            }
            let step = remaining.min(SLEEP_SLICE);
            thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
        !self.is_cancelled()
    }
}

/// Bounded retry policy for the proof-set confirmation poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Multiplier applied to the delay after every unconfirmed attempt.
    pub backoff_factor: f64,
    pub max_interval: Duration,
    pub max_attempts: Option<u32>,
    pub max_wait: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            backoff_factor: 1.5,
            max_interval: Duration::from_secs(60),
            max_attempts: Some(120),
            max_wait: Some(Duration::from_secs(60 * 60)),
        }
    }
}

impl PollPolicy {
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            backoff_factor: 1.0,
            max_interval: interval,
            max_attempts: Some(max_attempts),
            max_wait: None,
        }
    }

    /// Delay before attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = if self.backoff_factor.is_finite() && self.backoff_factor > 1.0 {
            self.backoff_factor
        } else {
            1.0
        };
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let scaled = self.interval.as_secs_f64() * factor.powi(exponent);
        let cap = self.max_interval.max(self.interval);
        if !scaled.is_finite() || scaled >= cap.as_secs_f64() {
            return cap;
        }
        Duration::from_secs_f64(scaled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Confirmed { proof_set_id: u64, attempts: u32 },
    /// Budget exhausted without a confirmation; not a failure.
    Pending { attempts: u32 },
    Cancelled { attempts: u32 },
}

/// Waits, then calls `check` until it yields an id, the policy's budget
/// runs out, or the token is cancelled. Errors from `check` end the poll.
pub fn poll_until_confirmed<E, F>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<PollOutcome, E>
where
    F: FnMut(u32) -> Result<Option<u64>, E>,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Ok(PollOutcome::Cancelled { attempts });
        }
        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            return Ok(PollOutcome::Pending { attempts });
        }

        let delay = policy.delay_for(attempts + 1);
        if let Some(max_wait) = policy.max_wait {
            if started.elapsed() + delay > max_wait {
                return Ok(PollOutcome::Pending { attempts });
            }
        }
        if !cancel.sleep(delay) {
            return Ok(PollOutcome::Cancelled { attempts });
        }

        attempts += 1;
        if let Some(proof_set_id) = check(attempts)? {
            return Ok(PollOutcome::Confirmed {
                proof_set_id,
                attempts,
            });
        }
    }
}
