use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;

use crate::{
    config::Config,
    utils::{error_codes, error_to_api_response},
};

/// Fixed-window counter for one `ip:path` key.
#[derive(Debug)]
struct RateLimitEntry {
    count: u32,
    reset_at: Instant,
    first_request: Instant,
}

/// Process-local rate limiter. State lives in this process only: it is lost
/// on restart and not shared across instances.
pub struct RateLimiter {
    config: Arc<Config>,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// `None` admits the request; `Some(retry_after)` rejects it.
    pub async fn check(&self, key: String) -> Option<Duration> {
        let now = Instant::now();
        let window = self.config.rate_limit_window();
        let mut entries = self.entries.lock().await;

        let entry = entries.entry(key).or_insert_with(|| RateLimitEntry {
            count: 0,
            reset_at: now + window,
            first_request: now,
        });

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + window;
        }

        entry.count += 1;
        if entry.count > self.config.rate_limit_requests {
            tracing::debug!(
                "over limit after {} requests, first seen {:?} ago",
                entry.count,
                now.saturating_duration_since(entry.first_request)
            );
            Some(entry.reset_at.saturating_duration_since(now))
        } else {
            None
        }
    }

    /// Drops every entry whose window has passed. Returns how many were
    /// removed. Driven by a background interval task.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| now < entry.reset_at);
        before - entries.len()
    }

    pub async fn check_rate_limit(
        self: Arc<Self>,
        req: Request<Body>,
        next: Next,
    ) -> Result<Response, StatusCode> {
        let ip = client_ip(&req);
        let key = format!("{}:{}", ip, req.uri().path());

        if let Some(retry_after) = self.check(key).await {
            let secs = retry_after.as_secs().max(1);
            tracing::warn!(
                "rate limit exceeded for {} on {}, retry in {}s",
                ip,
                req.uri().path(),
                secs
            );

            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                error_to_api_response::<()>(
                    error_codes::RATE_LIMIT,
                    format!("Too many requests, retry in {} seconds", secs),
                ),
            )
                .into_response();
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            return Ok(response);
        }

        Ok(next.run(req).await)
    }
}

/// Client IP: `x-real-ip`, else the first `x-forwarded-for` entry, else the
/// socket address.
fn client_ip(req: &Request<Body>) -> String {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    req.headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip.as_deref())
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    limiter.check_rate_limit(req, next).await
}
