//! Per-principal token bucket rate limiting
//!
//! Buckets refill at `rate_limit_rpm / 60` tokens per second with burst
//! equal to the per-minute budget. Keys are the bearer credential when
//! present, otherwise the source IP.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use lru::LruCache;
use std::net::SocketAddr;
use tokio::sync::Mutex;
use tracing::debug;

use gatehouse_audit::{AuditEvent, AuditKind};
use gatehouse_config::RateLimitConfig;
use gatehouse_mcp::McpError;

use crate::error::ApiError;
use crate::state::GatewayCore;

/// Bounded number of tracked clients
const MAX_TRACKED_CLIENTS: usize = 10_000;

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(burst: f64) -> Self {
        Self {
            tokens: burst,
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self, burst: f64, refill_per_sec: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(burst);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Shared limiter state
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<LruCache<String, TokenBucket>>,
    denial_counter: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = NonZeroUsize::new(MAX_TRACKED_CLIENTS).expect("nonzero capacity");
        Self {
            config,
            buckets: Mutex::new(LruCache::new(capacity)),
            denial_counter: AtomicU64::new(0),
        }
    }

    /// Check one request against the caller's bucket
    pub async fn check(&self, key: &str) -> bool {
        if !self.config.enabled {
            return true;
        }
        let burst = self.config.requests_per_minute as f64;
        let refill = burst / 60.0;

        let mut buckets = self.buckets.lock().await;
        let bucket = match buckets.get_mut(key) {
            Some(bucket) => bucket,
            None => {
                buckets.put(key.to_string(), TokenBucket::new(burst));
                buckets.get_mut(key).expect("just inserted")
            }
        };
        bucket.try_consume(burst, refill)
    }

    /// True for 1-in-N denials, so floods do not flood the audit trail
    pub fn should_audit_denial(&self) -> bool {
        let n = self.denial_counter.fetch_add(1, Ordering::Relaxed);
        n % self.config.audit_sample as u64 == 0
    }
}

fn client_key(request: &Request) -> String {
    if let Some(bearer) = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        return format!("auth:{}", bearer);
    }
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return format!("ip:{}", addr.ip());
    }
    "anonymous".to_string()
}

pub async fn rate_limit_middleware(
    State(core): State<GatewayCore>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);
    if core.rate_limiter.check(&key).await {
        return next.run(request).await;
    }

    debug!(%key, "rate limit exceeded");
    if core.rate_limiter.should_audit_denial() {
        core.audit
            .record(AuditEvent::failure(AuditKind::RateLimited).details(serde_json::json!({
                "key_kind": key.split(':').next().unwrap_or("unknown"),
            })))
            .await;
    }
    ApiError(McpError::RateLimited).into_response()
}

pub fn build(config: &RateLimitConfig) -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(config.clone()))
}
