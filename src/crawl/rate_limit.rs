//! Fetch throttling
//!
//! One throttle gates every outgoing request twice: a global request budget
//! across all origins, and a minimum interval per origin. A robots.txt
//! crawl-delay widens the origin's interval but never narrows it below the
//! configured default.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

pub struct FetchThrottle {
    global: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    default_interval: Duration,
    origins: Mutex<HashMap<String, OriginPacing>>,
}

/// Pacing state for one origin (host:port). `next_slot` is reserved under the
/// map lock, so two tasks can never claim the same slot.
struct OriginPacing {
    next_slot: Instant,
    min_interval: Duration,
}

impl FetchThrottle {
    pub fn new(per_origin_rps: f64, global_rps: u32) -> Self {
        let global_rps = NonZeroU32::new(global_rps).unwrap_or(nonzero!(1u32));
        Self {
            global: RateLimiter::direct(Quota::per_second(global_rps)),
            default_interval: Duration::from_secs_f64(1.0 / per_origin_rps.max(0.001)),
            origins: Mutex::new(HashMap::new()),
        }
    }

    /// Apply a robots.txt crawl-delay to an origin
    pub async fn set_crawl_delay(&self, origin: &str, delay: Duration) {
        if delay <= self.default_interval {
            return;
        }
        let mut origins = self.origins.lock().await;
        let pacing = origins
            .entry(origin.to_string())
            .or_insert_with(|| OriginPacing {
                next_slot: Instant::now(),
                min_interval: self.default_interval,
            });
        pacing.min_interval = delay;
        debug!("Crawl delay for {}: {:?}", origin, delay);
    }

    /// Block until a request to `origin` is allowed
    pub async fn acquire(&self, origin: &str) {
        self.global.until_ready().await;

        let wait = {
            let mut origins = self.origins.lock().await;
            let pacing = origins
                .entry(origin.to_string())
                .or_insert_with(|| OriginPacing {
                    next_slot: Instant::now(),
                    min_interval: self.default_interval,
                });
            let now = Instant::now();
            let slot = pacing.next_slot.max(now);
            pacing.next_slot = slot + pacing.min_interval;
            slot - now
        };

        if !wait.is_zero() {
            trace!("Pacing {}: waiting {:?}", origin, wait);
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;

    #[tokio::test]
    async fn test_origin_pacing_enforces_interval() {
        // 10 req/s per origin: three requests need at least two 100ms gaps
        let throttle = FetchThrottle::new(10.0, 1000);

        let start = StdInstant::now();
        throttle.acquire("example.org").await;
        throttle.acquire("example.org").await;
        throttle.acquire("example.org").await;

        assert!(start.elapsed() >= Duration::from_millis(180));
    }

    #[tokio::test]
    async fn test_distinct_origins_do_not_block_each_other() {
        // 2 req/s per origin would mean 500ms between same-origin requests
        let throttle = FetchThrottle::new(2.0, 1000);

        let start = StdInstant::now();
        throttle.acquire("a.example.org").await;
        throttle.acquire("b.example.org").await;
        throttle.acquire("c.example.org:8080").await;

        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_crawl_delay_widens_pacing() {
        let throttle = FetchThrottle::new(1000.0, 1000);
        throttle
            .set_crawl_delay("slow.example.org", Duration::from_millis(100))
            .await;

        let start = StdInstant::now();
        throttle.acquire("slow.example.org").await;
        throttle.acquire("slow.example.org").await;

        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_crawl_delay_never_narrows_the_default() {
        // Default interval 100ms; a 1ms crawl-delay must not shorten it
        let throttle = FetchThrottle::new(10.0, 1000);
        throttle
            .set_crawl_delay("example.org", Duration::from_millis(1))
            .await;

        let start = StdInstant::now();
        throttle.acquire("example.org").await;
        throttle.acquire("example.org").await;

        assert!(start.elapsed() >= Duration::from_millis(90));
    }
}
