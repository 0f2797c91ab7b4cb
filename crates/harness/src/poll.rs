//! Bounded polling with backoff for page stability and spinner checks

use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};

/// Backoff schedule for [`poll_until`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay after the first unmet check
    pub initial_delay: Duration,

    /// Upper bound for a single delay
    pub max_delay: Duration,

    /// Growth factor applied after each unmet check
    pub multiplier: f64,

    /// Overall budget; the poll fails with a timeout once exceeded
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            timeout: Duration::from_secs(90),
        }
    }
}

impl PollConfig {
    fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier.max(1.0)).min(self.max_delay)
    }
}

/// Poll `check` until it reports `true`.
///
/// The calling flow is blocked for the whole poll and nothing outside can
/// cancel it; it only ends when the condition holds, `check` errors, or the
/// budget in `config.timeout` runs out.
pub async fn poll_until<F, Fut>(config: &PollConfig, what: &str, mut check: F) -> HarnessResult<u32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HarnessResult<bool>>,
{
    let start = Instant::now();
    let mut delay = config.initial_delay;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if check().await? {
            debug!("{} settled after {} check(s)", what, attempts);
            return Ok(attempts);
        }

        if start.elapsed() + delay > config.timeout {
            return Err(HarnessError::Timeout(format!(
                "{} (after {} checks in {} ms)",
                what,
                attempts,
                start.elapsed().as_millis()
            )));
        }

        sleep(delay).await;
        delay = config.next_delay(delay);
    }
}
