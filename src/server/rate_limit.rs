use axum::extract::{ Request, State };
use axum::http::{ HeaderMap, HeaderName, HeaderValue };
use axum::middleware::Next;
use axum::response::{ IntoResponse, Response };
use chrono::{ DateTime, Duration, Utc };
use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::{ InMemoryState, NotKeyed };
use governor::{ Quota, RateLimiter };
use log::warn;
use std::num::NonZeroU32;
use std::sync::Arc;

use super::error::ApiError;
use super::AppState;

pub type GlobalGuard = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateDecision {
    /// Whole seconds until the window resets, at least 1.
    pub fn retry_after(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }
}

struct Window {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Per-client request counter over fixed windows.
///
/// Every request counts, including rejected ones. A key's window restarts
/// lazily on the first request after it expired.
pub struct FixedWindowLimiter {
    windows: DashMap<String, Window>,
    limit: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window: Duration::from_std(window).unwrap_or_else(|_| Duration::minutes(1)),
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn check_and_increment(&self, key: &str) -> RateDecision {
        let now = self.clock.now();
        let mut entry = self.windows
            .entry(key.to_string())
            .or_insert_with(|| Window { count: 0, reset_at: now + self.window });

        if now > entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + self.window;
        }
        entry.count = entry.count.saturating_add(1);

        RateDecision {
            allowed: entry.count <= self.limit,
            limit: self.limit,
            remaining: self.limit.saturating_sub(entry.count),
            reset_at: entry.reset_at,
        }
    }

    /// Drops windows that have already expired.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|_, w| w.reset_at >= now);
        before - self.windows.len()
    }
}

pub fn global_guard(per_second: u32) -> GlobalGuard {
    let rate = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_second(rate))
}

/// `x-forwarded-for`, then `x-real-ip`, else `unknown`.
pub fn client_key(headers: &HeaderMap) -> String {
    ["x-forwarded-for", "x-real-ip"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: impl ToString) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if state.global_guard.check().is_err() {
        warn!("Global request rate exceeded");
        return ApiError::rate_limited("Server is busy. Please retry shortly.", 1).into_response();
    }

    let key = client_key(req.headers());
    let decision = state.limiter.check_and_increment(&key);

    let mut response = if decision.allowed {
        next.run(req).await
    } else {
        warn!("Rate limit exceeded for {}", key);
        let retry_after = decision.retry_after(state.limiter.clock().now());
        ApiError::rate_limited("Too many requests. Please slow down.", retry_after).into_response()
    };

    let headers = response.headers_mut();
    set_header(headers, "x-ratelimit-limit", decision.limit);
    set_header(headers, "x-ratelimit-remaining", decision.remaining);
    set_header(headers, "x-ratelimit-reset", decision.reset_at.timestamp());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ManualClock;
    use std::time::Duration as StdDuration;

    fn limiter(limit: u32) -> (FixedWindowLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (FixedWindowLimiter::new(limit, StdDuration::from_secs(60), clock.clone()), clock)
    }

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let (limiter, clock) = limiter(3);
        let remaining: Vec<u32> = (0..3).map(|_| limiter.check_and_increment("1.2.3.4").remaining).collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        let denied = limiter.check_and_increment("1.2.3.4");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.retry_after(clock.now()), 60);

        assert!(limiter.check_and_increment("5.6.7.8").allowed);
    }

    #[test]
    fn window_resets_lazily_after_expiry() {
        let (limiter, clock) = limiter(1);
        assert!(limiter.check_and_increment("k").allowed);
        assert!(!limiter.check_and_increment("k").allowed);

        clock.advance(StdDuration::from_secs(61));
        let decision = limiter.check_and_increment("k");
        assert!(decision.allowed);
        assert_eq!(decision.reset_at, clock.now() + Duration::seconds(60));
    }

    #[test]
    fn purge_drops_only_expired_windows() {
        let (limiter, clock) = limiter(5);
        limiter.check_and_increment("old");
        clock.advance(StdDuration::from_secs(30));
        limiter.check_and_increment("new");
        clock.advance(StdDuration::from_secs(40));
        assert_eq!(limiter.purge_expired(), 1);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let (limiter, _) = limiter(1000);
        let limiter = Arc::new(limiter);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        limiter.check_and_increment("shared");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(limiter.check_and_increment("shared").remaining, 1000 - 401);
    }

    #[test]
    fn client_key_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers), "unknown");
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_key(&headers), "10.0.0.2");
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(client_key(&headers), "203.0.113.9");
    }
}
