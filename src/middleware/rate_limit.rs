//! Credential-Endpoint Rate Limiting
//!
//! Token-bucket limiter keyed by `(endpoint label, client IP)`. Each bucket
//! starts at capacity and refills continuously at capacity/window, clamped
//! to capacity. A request consumes one token; an empty bucket rejects with
//! 429 before any handler logic runs, so a limited caller never reaches the
//! password hasher or the user store.
//!
//! Scope is a single process. There is no cross-replica coordination;
//! operators either pin clients to a replica or accept per-replica quotas.
//!
//! Client IP resolution trusts `X-Forwarded-For` (first entry), then
//! `X-Real-IP`, then the peer address. Operators must ensure only trusted
//! proxies set these headers.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};

use crate::config::AppState;
use crate::service::AuthError;
use crate::views;

/// Outcome of a bucket check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    /// Rejected; roughly how long until one token refills.
    Limited { retry_after_secs: u64 },
}

struct Bucket {
    tokens: f64,
    /// Also serves as the last-seen time for idle eviction.
    last_refill: Instant,
}

/// Shared token-bucket limiter. One instance serves every credential
/// endpoint; buckets are keyed by endpoint label and client address.
pub struct RateLimiter {
    capacity: f64,
    window: Duration,
    buckets: Mutex<HashMap<(&'static str, IpAddr), Bucket>>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        RateLimiter {
            capacity: f64::from(capacity.max(1)),
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Attempts to consume one token for `(label, ip)`.
    pub fn check(&self, label: &'static str, ip: IpAddr) -> Decision {
        self.check_at(label, ip, Instant::now())
    }

    fn check_at(&self, label: &'static str, ip: IpAddr, now: Instant) -> Decision {
        let refill_per_sec = self.capacity / self.window.as_secs_f64();

        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");
        let bucket = buckets.entry((label, ip)).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Decision::Allowed
        } else {
            let deficit = 1.0 - bucket.tokens;
            Decision::Limited {
                retry_after_secs: (deficit / refill_per_sec).ceil() as u64,
            }
        }
    }

    /// Evicts buckets idle for at least twice the window.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) {
        let idle_cutoff = self.window * 2;
        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < idle_cutoff);
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.buckets.lock().unwrap().len()
    }
}

/// Middleware limiting the credential endpoints. Only the submitting POSTs
/// consume budget; rendering the forms does not.
pub async fn limit_credentials(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let label = match (request.method(), request.uri().path()) {
        (&Method::POST, "/sign_in") | (&Method::POST, "/api/auth/signin") => "sign_in",
        (&Method::POST, "/sign_up") => "sign_up",
        _ => return next.run(request).await,
    };

    let ip = client_ip(&request);
    match state.limiter.check(label, ip) {
        Decision::Allowed => next.run(request).await,
        Decision::Limited { retry_after_secs } => {
            tracing::warn!(%ip, label, "Rate limit hit");
            if request.uri().path().starts_with("/api/") {
                AuthError::RateLimited { retry_after_secs }.into_response()
            } else {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Html(views::too_many_requests_page()),
                )
                    .into_response()
            }
        }
    }
}

/// Resolves the client address: first `X-Forwarded-For` entry, then
/// `X-Real-IP`, then the connection's peer address.
pub fn client_ip(request: &Request) -> IpAddr {
    if let Some(ip) = forwarded_ip(request.headers()) {
        return ip;
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            if let Ok(ip) = first.trim().parse() {
                return Some(ip);
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(180);

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, last))
    }

    #[test]
    fn bucket_at_capacity_allows_then_rejects() {
        let limiter = RateLimiter::new(10, WINDOW);
        let t0 = Instant::now();

        for _ in 0..10 {
            assert_eq!(limiter.check_at("sign_in", ip(1), t0), Decision::Allowed);
        }
        assert!(matches!(
            limiter.check_at("sign_in", ip(1), t0),
            Decision::Limited { .. }
        ));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1, WINDOW);
        let t0 = Instant::now();

        assert_eq!(limiter.check_at("sign_in", ip(1), t0), Decision::Allowed);
        assert!(matches!(
            limiter.check_at("sign_in", ip(1), t0),
            Decision::Limited { .. }
        ));

        // A different address and a different endpoint both have their own
        // budget.
        assert_eq!(limiter.check_at("sign_in", ip(2), t0), Decision::Allowed);
        assert_eq!(limiter.check_at("sign_up", ip(1), t0), Decision::Allowed);
    }

    #[test]
    fn tokens_refill_with_elapsed_time() {
        let limiter = RateLimiter::new(10, WINDOW);
        let t0 = Instant::now();

        for _ in 0..10 {
            limiter.check_at("sign_in", ip(1), t0);
        }
        assert!(matches!(
            limiter.check_at("sign_in", ip(1), t0),
            Decision::Limited { .. }
        ));

        // One token refills every window/capacity = 18 seconds.
        let t1 = t0 + Duration::from_secs(18);
        assert_eq!(limiter.check_at("sign_in", ip(1), t1), Decision::Allowed);
        assert!(matches!(
            limiter.check_at("sign_in", ip(1), t1),
            Decision::Limited { .. }
        ));
    }

    #[test]
    fn refill_clamps_at_capacity() {
        let limiter = RateLimiter::new(2, WINDOW);
        let t0 = Instant::now();
        limiter.check_at("sign_in", ip(1), t0);

        // A long quiet period must not bank more than `capacity` tokens.
        let much_later = t0 + WINDOW * 10;
        assert_eq!(limiter.check_at("sign_in", ip(1), much_later), Decision::Allowed);
        assert_eq!(limiter.check_at("sign_in", ip(1), much_later), Decision::Allowed);
        assert!(matches!(
            limiter.check_at("sign_in", ip(1), much_later),
            Decision::Limited { .. }
        ));
    }

    #[test]
    fn retry_after_reflects_refill_rate() {
        let limiter = RateLimiter::new(10, WINDOW);
        let t0 = Instant::now();
        for _ in 0..10 {
            limiter.check_at("sign_in", ip(1), t0);
        }

        match limiter.check_at("sign_in", ip(1), t0) {
            Decision::Limited { retry_after_secs } => assert_eq!(retry_after_secs, 18),
            Decision::Allowed => panic!("bucket should be empty"),
        }
    }

    #[test]
    fn sweep_evicts_idle_buckets_only() {
        let limiter = RateLimiter::new(10, WINDOW);
        let t0 = Instant::now();
        limiter.check_at("sign_in", ip(1), t0);
        limiter.check_at("sign_in", ip(2), t0 + WINDOW);
        assert_eq!(limiter.bucket_count(), 2);

        // At t0 + 2*window, the first bucket has been idle exactly twice the
        // window and goes away; the second is only one window idle.
        limiter.sweep_at(t0 + WINDOW * 2);
        assert_eq!(limiter.bucket_count(), 1);
    }
}
