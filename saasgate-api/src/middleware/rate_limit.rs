/// Request throttling for the anonymous auth endpoints
///
/// Token bucket per client, kept in process memory. The client is the first
/// `X-Forwarded-For` hop, else the peer address.
///
/// # Algorithm
///
/// - Tokens refill at a constant rate (`per_minute / 60` per second)
/// - Each request consumes 1 token
/// - Request blocked if bucket empty, with `Retry-After` set
///
/// # Example
///
/// ```no_run
/// use saasgate_api::middleware::rate_limit::{throttle, Throttle};
/// use axum::{middleware, routing::post, Router};
/// use std::sync::Arc;
///
/// let login_throttle = Arc::new(Throttle::per_minute("login", 30));
///
/// let app: Router = Router::new().route(
///     "/login",
///     post(handler).layer(middleware::from_fn_with_state(login_throttle, throttle)),
/// );
/// # async fn handler() {}
/// ```

use crate::error::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Buckets kept before idle ones are pruned
const PRUNE_THRESHOLD: usize = 10_000;

/// Rate limit configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    /// Maximum requests per minute
    pub requests_per_minute: u32,

    /// Token refill rate (tokens per second)
    pub refill_rate: f64,

    /// Maximum tokens in bucket (burst capacity)
    pub bucket_capacity: u32,
}

impl RateLimit {
    pub fn per_minute(requests_per_minute: u32) -> Self {
        RateLimit {
            requests_per_minute,
            refill_rate: requests_per_minute as f64 / 60.0,
            bucket_capacity: requests_per_minute,
        }
    }
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, now: Instant) -> Self {
        TokenBucket {
            tokens: capacity as f64,
            last_refill: now,
        }
    }

    fn refill(&mut self, rate: f64, capacity: u32, now: Instant) {
        let elapsed_secs = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed_secs * rate).min(capacity as f64);
        self.last_refill = now;
    }

    fn try_consume(&mut self, count: f64) -> bool {
        if self.tokens >= count {
            self.tokens -= count;
            true
        } else {
            false
        }
    }

    fn seconds_until_available(&self, count: f64, rate: f64) -> u64 {
        let deficit = count - self.tokens;
        if deficit <= 0.0 {
            0
        } else {
            (deficit / rate).ceil() as u64
        }
    }

    fn is_full(&self, capacity: u32) -> bool {
        self.tokens >= capacity as f64
    }
}

/// Outcome of one check
#[derive(Debug, PartialEq)]
pub enum ThrottleDecision {
    Allowed,
    Limited { retry_after: u64 },
}

/// One named limit with per-client buckets
#[derive(Debug)]
pub struct Throttle {
    name: &'static str,
    limit: RateLimit,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl Throttle {
    /// A limit of 0 disables throttling
    pub fn per_minute(name: &'static str, requests_per_minute: u32) -> Self {
        Throttle {
            name,
            limit: RateLimit::per_minute(requests_per_minute),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn check(&self, client: &str) -> ThrottleDecision {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: &str, now: Instant) -> ThrottleDecision {
        if self.limit.requests_per_minute == 0 {
            return ThrottleDecision::Allowed;
        }

        let RateLimit {
            refill_rate,
            bucket_capacity,
            ..
        } = self.limit;

        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if buckets.len() > PRUNE_THRESHOLD {
            buckets.retain(|_, bucket| {
                bucket.refill(refill_rate, bucket_capacity, now);
                !bucket.is_full(bucket_capacity)
            });
        }

        let bucket = buckets
            .entry(client.to_string())
            .or_insert_with(|| TokenBucket::new(bucket_capacity, now));
        bucket.refill(refill_rate, bucket_capacity, now);

        if bucket.try_consume(1.0) {
            ThrottleDecision::Allowed
        } else {
            ThrottleDecision::Limited {
                retry_after: bucket.seconds_until_available(1.0, refill_rate).max(1),
            }
        }
    }
}

/// Throttles shared through application state
#[derive(Debug, Clone)]
pub struct Throttles {
    pub login: Arc<Throttle>,
    pub register: Arc<Throttle>,
    pub password_reset: Arc<Throttle>,
}

impl Throttles {
    pub fn new(login: u32, register: u32, password_reset: u32) -> Self {
        Throttles {
            login: Arc::new(Throttle::per_minute("login", login)),
            register: Arc::new(Throttle::per_minute("register", register)),
            password_reset: Arc::new(Throttle::per_minute("password_reset", password_reset)),
        }
    }
}

/// First `X-Forwarded-For` hop, else the peer address
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Throttling middleware
///
/// # Errors
///
/// - 429 Too Many Requests with `Retry-After`
pub async fn throttle(
    State(throttle): State<Arc<Throttle>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_key(request.headers(), peer);

    if let ThrottleDecision::Limited { retry_after } = throttle.check(&client) {
        tracing::warn!(throttle = throttle.name(), client = %client, retry_after, "Request throttled");
        return Err(ApiError::RateLimitExceeded {
            retry_after,
            message: format!(
                "Request was throttled. Expected available in {} seconds.",
                retry_after
            ),
        });
    }

    Ok(next.run(request).await)
}
