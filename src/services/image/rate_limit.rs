//! Minimum spacing between calls to each image backend.
//!
//! The limit is enforced by the remote account, not per request, so one
//! `RateLimiter` is built at startup and shared by every illustrator.

use crate::core::story::ImageProvider;
use log::info;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Minimum time between two dispatches to the same backend.
pub const MIN_CALL_SPACING: Duration = Duration::from_secs(12);
/// Wait after the backend explicitly reports a rate limit.
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(30);

pub struct RateLimiter {
    spacing: Duration,
    dalle: Mutex<Option<Instant>>,
    gemini: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_spacing(MIN_CALL_SPACING)
    }

    pub fn with_spacing(spacing: Duration) -> Self {
        Self {
            spacing,
            dalle: Mutex::new(None),
            gemini: Mutex::new(None),
        }
    }

    fn slot(&self, provider: ImageProvider) -> &Mutex<Option<Instant>> {
        match provider {
            ImageProvider::Dalle => &self.dalle,
            ImageProvider::Gemini => &self.gemini,
        }
    }

    /// Waits out the remaining spacing for `provider`, then records and
    /// returns the dispatch time. The lock is held while waiting, so
    /// concurrent callers queue up behind each other.
    pub async fn acquire(&self, provider: ImageProvider) -> Instant {
        let mut last_call = self.slot(provider).lock().await;
        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.spacing {
                let wait = self.spacing - elapsed;
                info!("Waiting {:.1}s before next {} call", wait.as_secs_f32(), provider);
                sleep(wait).await;
            }
        }
        let now = Instant::now();
        *last_call = Some(now);
        now
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
