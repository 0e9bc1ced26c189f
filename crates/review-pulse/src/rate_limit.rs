use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces out calls to a remote backend by a minimum interval.
///
/// The first call goes through immediately; each later call waits until
/// `min_interval` has passed since the previous one was released.
#[derive(Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    next_allowed: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_allowed: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn acquire(&self) {
        let mut next = self.next_allowed.lock().await;
        if let Some(at) = *next {
            if at > Instant::now() {
                tokio::time::sleep_until(at).await;
            }
        }
        *next = Some(Instant::now() + self.min_interval);
    }
}
