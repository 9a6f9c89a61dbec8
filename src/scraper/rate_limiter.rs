use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Fixed minimum spacing between consecutive requests to one origin
pub struct Politeness {
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Politeness {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_request: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait until at least `delay` has passed since the previous call
    pub async fn wait(&self) {
        let required_delay = {
            let mut last = self.last_request.lock().await;
            let now = Instant::now();

            let required_delay = match *last {
                Some(previous) => self.delay.saturating_sub(now.duration_since(previous)),
                None => Duration::ZERO,
            };

            *last = Some(now + required_delay);
            required_delay
        };

        if !required_delay.is_zero() {
            debug!("Politeness: waiting {}ms", required_delay.as_millis());
            tokio::time::sleep(required_delay).await;
        }
    }
}

impl Default for Politeness {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_not_delayed() {
        let politeness = Politeness::new(Duration::from_millis(1500));
        let start = Instant::now();
        politeness.wait().await;
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_requests_are_spaced() {
        let politeness = Politeness::new(Duration::from_millis(1000));
        let start = Instant::now();

        politeness.wait().await;
        politeness.wait().await;
        politeness.wait().await;

        assert!(start.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_work_counts_toward_delay() {
        let politeness = Politeness::new(Duration::from_millis(1000));
        politeness.wait().await;

        tokio::time::sleep(Duration::from_millis(700)).await;
        let before = Instant::now();
        politeness.wait().await;

        let waited = before.elapsed();
        assert!(waited >= Duration::from_millis(300));
        assert!(waited < Duration::from_millis(400));
    }
}
