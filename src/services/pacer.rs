use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Enforces a minimum (jittered) delay between external API calls.
///
/// This is throttling discipline against free-tier rate limits, not a
/// concurrency primitive: pipeline runs are sequential, the pacer just keeps
/// successive calls from firing back-to-back.
#[derive(Clone)]
pub struct Pacer {
    last_call: Arc<Mutex<Instant>>,
    min_delay: Duration,
    /// Extra random delay added on top, as a fraction of `min_delay`.
    jitter_frac: f64,
}

impl Pacer {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            last_call: Arc::new(Mutex::new(Instant::now() - min_delay)),
            min_delay,
            jitter_frac: 0.5,
        }
    }

    /// Wait until the pacing window since the previous call has elapsed.
    pub async fn wait(&self) {
        let wait_time = {
            let last = self.last_call.lock();
            let elapsed = last.elapsed();
            let jitter = self.min_delay.mul_f64(self.jitter_frac * rand::random::<f64>());
            let window = self.min_delay + jitter;
            (elapsed < window).then(|| window - elapsed)
        }; // lock dropped before sleeping

        if let Some(delay) = wait_time {
            sleep(delay).await;
        }

        *self.last_call.lock() = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;

    #[tokio::test]
    async fn first_call_is_immediate() {
        let pacer = Pacer::new(Duration::from_millis(200));
        let start = StdInstant::now();
        pacer.wait().await;
        assert!(start.elapsed().as_millis() < 100, "first call should not wait");
    }

    #[tokio::test]
    async fn second_call_waits_out_the_window() {
        let pacer = Pacer::new(Duration::from_millis(100));
        pacer.wait().await;
        let start = StdInstant::now();
        pacer.wait().await;
        assert!(
            start.elapsed().as_millis() >= 90,
            "second call should wait at least the minimum delay"
        );
    }
}
