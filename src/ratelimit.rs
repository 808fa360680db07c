use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window counter per client IP. Process-local, which is all a
/// single-node service needs.
pub struct RateLimiter {
    max_attempts: u32,
    window: Duration,
    buckets: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Records an attempt and reports whether it is still within the limit.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        // Drop elapsed windows so the map does not grow one entry per
        // source IP forever; the caller's own entry is recreated below.
        buckets.retain(|_, w| now.duration_since(w.started) < self.window);
        let window = buckets.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        window.count += 1;
        window.count <= self.max_attempts
    }

    #[cfg(test)]
    fn tracked_ips(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last])
    }

    #[test]
    fn allows_up_to_the_limit_then_blocks() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        for _ in 0..5 {
            assert!(limiter.check(ip(1)));
        }
        assert!(!limiter.check(ip(1)));
    }

    #[test]
    fn ips_are_counted_separately() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check(ip(1)));
        assert!(!limiter.check(ip(1)));
        assert!(limiter.check(ip(2)));
    }

    #[test]
    fn stale_buckets_are_evicted() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check(ip(1)));
        assert_eq!(limiter.tracked_ips(), 1);
        std::thread::sleep(Duration::from_millis(25));
        // An attempt from another IP sweeps the elapsed entry out.
        assert!(limiter.check(ip(2)));
        assert_eq!(limiter.tracked_ips(), 1);
    }

    #[test]
    fn window_resets_after_elapse() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check(ip(1)));
        assert!(!limiter.check(ip(1)));
        std::thread::sleep(Duration::from_millis(25));
        assert!(limiter.check(ip(1)));
    }
}
