//! Fixed-window rate limiting stage
//!
//! Windows are aligned to the epoch (`bucket = now / window`), so every key's
//! counter resets at the same instants. A stage is configured with a key
//! extractor, a request budget, the window length and whether exceeding the
//! budget rejects the request (429) or only marks it with [`RateLimited`].

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::client_ip::{self, ClientIp};
use super::identity::Identity;
use crate::config::RateRule;

/// Derives the rate limiting key from a request; `None` skips limiting
pub type KeyFn = fn(&Request<Body>) -> Option<String>;

/// Key by resolved client address (anonymous callers)
pub fn by_client_ip(request: &Request<Body>) -> Option<String> {
    let ip = request
        .extensions()
        .get::<ClientIp>()
        .map(|ClientIp(ip)| ip.clone())
        .unwrap_or_else(|| client_ip::resolve_from_request(request));
    Some(format!("ip:{}", ip))
}

/// Key by authenticated identity
pub fn by_identity(request: &Request<Body>) -> Option<String> {
    request
        .extensions()
        .get::<Identity>()
        .map(|Identity(name)| format!("user:{}", name))
}

/// Marker left on requests over budget when the stage does not block.
/// Handlers read it as `Option<Extension<RateLimited>>`; the demo routes
/// report it as `"rate_limited"` in their JSON.
#[derive(Debug, Clone, Copy)]
pub struct RateLimited;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: u64 },
}

/// Per-key counters for the current window: key -> (bucket, count)
pub struct FixedWindowLimiter {
    counters: DashMap<String, (u64, u32)>,
    limit: u32,
    window_secs: u64,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            counters: DashMap::new(),
            limit,
            window_secs: window.as_secs().max(1),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Utc::now().timestamp().max(0) as u64)
    }

    /// Count one request for `key` at `now` (epoch seconds)
    pub fn check_at(&self, key: &str, now: u64) -> RateDecision {
        let bucket = now / self.window_secs;
        let mut entry = self.counters.entry(key.to_string()).or_insert((bucket, 0));

        if entry.0 != bucket {
            *entry = (bucket, 0);
        }
        entry.1 = entry.1.saturating_add(1);

        if entry.1 <= self.limit {
            RateDecision::Allowed {
                remaining: self.limit - entry.1,
            }
        } else {
            RateDecision::Limited {
                retry_after: (bucket + 1) * self.window_secs - now,
            }
        }
    }

    /// Drop counters from past windows
    pub fn cleanup_at(&self, now: u64) {
        let bucket = now / self.window_secs;
        self.counters.retain(|_, (b, _)| *b == bucket);
    }

    pub fn cleanup(&self) {
        self.cleanup_at(Utc::now().timestamp().max(0) as u64);
    }

    pub fn tracked_keys(&self) -> usize {
        self.counters.len()
    }
}

pub struct RateLimitStage {
    scope: &'static str,
    limiter: FixedWindowLimiter,
    key: KeyFn,
    block: bool,
}

impl RateLimitStage {
    pub fn new(scope: &'static str, rule: &RateRule, key: KeyFn) -> Self {
        Self {
            scope,
            limiter: FixedWindowLimiter::new(rule.requests, Duration::from_secs(rule.window_secs)),
            key,
            block: rule.block,
        }
    }

    pub fn limiter(&self) -> &FixedWindowLimiter {
        &self.limiter
    }
}

fn too_many_requests(retry_after: u64, limit: u32, timeframe: u64) -> Response {
    let body = serde_json::json!({
        "status": "error",
        "message": "Rate limit exceeded. Please try again later.",
        "retry_after": retry_after,
        "limit": limit,
        "timeframe": timeframe,
    });
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

/// Middleware entry point, used with `axum::middleware::from_fn_with_state`
pub async fn enforce(
    State(stage): State<Arc<RateLimitStage>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(key) = (stage.key)(&request) else {
        return next.run(request).await;
    };

    match stage.limiter.check(&key) {
        RateDecision::Allowed { .. } => next.run(request).await,
        RateDecision::Limited { retry_after } => {
            warn!(scope = stage.scope, key = %key, retry_after = retry_after, "Rate limit exceeded");
            if stage.block {
                too_many_requests(retry_after, stage.limiter.limit, stage.limiter.window_secs)
            } else {
                request.extensions_mut().insert(RateLimited);
                next.run(request).await
            }
        }
    }
}
