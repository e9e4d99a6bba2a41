/*!
 * # Rate Limiting Module
 *
 * Fixed-window request limiting for the API.
 *
 * Requests are keyed by the authenticated subject (`user:<sub>`) when the
 * auth middleware has already run, otherwise by client IP taken from
 * `X-Forwarded-For` or `X-Real-IP`. Counters live either in process memory
 * or in Redis, so the limit can be shared across instances.
 *
 * ## Usage
 *
 * ```ignore
 * let limiter = Arc::new(RateLimiter::new(
 *     RateLimitConfig::default(),
 *     Arc::new(InMemoryRateLimitStore::new()),
 * ));
 *
 * let app = Router::new()
 *     .route("/", get(handler))
 *     .layer(axum::middleware::from_fn_with_state(limiter, rate_limit_middleware));
 * ```
 */
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use metrics::counter;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::errors::ServiceError;

fn num_to_header_value<T: ToString>(n: T) -> http::HeaderValue {
    http::HeaderValue::from_str(&n.to_string())
        .unwrap_or_else(|_| http::HeaderValue::from_static("0"))
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_duration: Duration,
    pub enable_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_duration: Duration::from_secs(60),
            enable_headers: true,
        }
    }
}

impl From<&AppConfig> for RateLimitConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            requests_per_window: cfg.rate_limit_requests_per_window,
            window_duration: Duration::from_secs(cfg.rate_limit_window_seconds.max(1)),
            enable_headers: cfg.rate_limit_enable_headers,
        }
    }
}

/// Result of counting one request against its window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

impl RateLimitDecision {
    fn from_count(count: u64, config: &RateLimitConfig, reset_after: Duration) -> Self {
        let limit = config.requests_per_window;
        let allowed = count <= u64::from(limit);
        let remaining = if allowed {
            limit.saturating_sub(count.min(u64::from(u32::MAX)) as u32)
        } else {
            0
        };
        Self {
            allowed,
            limit,
            remaining,
            reset_after,
        }
    }
}

/// Backing storage for window counters.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Counts one request for `key` and reports whether it fits the window.
    async fn hit(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitDecision, RateLimitError>;

    async fn reset(&self, key: &str) -> Result<(), RateLimitError>;

    /// Drops locally held windows older than `window`; returns how many went.
    async fn cleanup_expired(&self, window: Duration) -> usize;
}

#[derive(Debug, Clone)]
struct WindowEntry {
    count: u64,
    window_start: Instant,
}

/// Process-local counters.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    entries: DashMap<String, WindowEntry>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn hit_now(&self, key: &str, config: &RateLimitConfig) -> RateLimitDecision {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| WindowEntry {
                count: 0,
                window_start: now,
            });

        if now.duration_since(entry.window_start) >= config.window_duration {
            entry.count = 0;
            entry.window_start = now;
        }
        entry.count += 1;

        let elapsed = now.duration_since(entry.window_start);
        let reset_after = config.window_duration.saturating_sub(elapsed);
        RateLimitDecision::from_count(entry.count, config, reset_after)
    }

    fn evict_expired(&self, window: Duration) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < window);
        before.saturating_sub(self.entries.len())
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitDecision, RateLimitError> {
        Ok(self.hit_now(key, config))
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn cleanup_expired(&self, window: Duration) -> usize {
        self.evict_expired(window)
    }
}

/// Counters shared through Redis. Falls back to local counters while Redis
/// is unreachable.
pub struct RedisRateLimitStore {
    client: Arc<redis::Client>,
    namespace: String,
    fallback: InMemoryRateLimitStore,
}

impl RedisRateLimitStore {
    pub fn new(client: Arc<redis::Client>, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            fallback: InMemoryRateLimitStore::new(),
        }
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    async fn hit_redis(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitDecision, redis::RedisError> {
        let mut conn = self.client.get_async_connection().await?;
        let redis_key = self.redis_key(key);
        let window_secs = config.window_duration.as_secs().max(1);

        let count: i64 = conn.incr(&redis_key, 1).await?;
        if count == 1 {
            let _: () = conn.expire(&redis_key, window_secs as usize).await?;
        }

        // A key left without a TTL would never reset
        let ttl: i64 = conn.ttl(&redis_key).await?;
        let ttl_secs = if ttl > 0 {
            ttl as u64
        } else {
            let _: () = conn.expire(&redis_key, window_secs as usize).await?;
            window_secs
        };

        Ok(RateLimitDecision::from_count(
            count.max(0) as u64,
            config,
            Duration::from_secs(ttl_secs),
        ))
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn hit(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitDecision, RateLimitError> {
        match self.hit_redis(key, config).await {
            Ok(decision) => Ok(decision),
            Err(err) => {
                warn!(error = %err, "Redis rate limit check failed, using in-memory fallback");
                self.fallback.hit(key, config).await
            }
        }
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        self.fallback.reset(key).await?;
        let mut conn = self.client.get_async_connection().await?;
        let _: () = conn.del(self.redis_key(key)).await?;
        Ok(())
    }

    // Redis expires its own keys; only the fallback needs sweeping
    async fn cleanup_expired(&self, window: Duration) -> usize {
        self.fallback.evict_expired(window)
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, store: Arc<dyn RateLimitStore>) -> Self {
        Self { store, config }
    }

    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::new(config, Arc::new(InMemoryRateLimitStore::new()))
    }

    /// Chooses Redis when enabled and the URL parses, otherwise memory.
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        let config = RateLimitConfig::from(cfg);
        if !cfg.rate_limit_use_redis {
            return Self::in_memory(config);
        }
        match redis::Client::open(cfg.redis_url.as_str()) {
            Ok(client) => Self::new(
                config,
                Arc::new(RedisRateLimitStore::new(
                    Arc::new(client),
                    cfg.rate_limit_namespace.clone(),
                )),
            ),
            Err(err) => {
                warn!(error = %err, "Invalid Redis URL for rate limiting, using in-memory store");
                Self::in_memory(config)
            }
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub async fn check(&self, key: &str) -> Result<RateLimitDecision, RateLimitError> {
        self.store.hit(key, &self.config).await
    }

    pub async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        self.store.reset(key).await
    }

    pub async fn cleanup_expired(&self) -> usize {
        self.store
            .cleanup_expired(self.config.window_duration)
            .await
    }
}

/// Periodically evicts expired windows so the key map stays bounded by the
/// number of clients seen within one window.
pub async fn start_cleanup_task(limiter: Arc<RateLimiter>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        let removed = limiter.cleanup_expired().await;
        if removed > 0 {
            debug!(removed, "Rate limiter cleanup completed");
        }
    }
}

pub fn extract_ip_key(headers: &HeaderMap) -> String {
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return format!("ip:{}", ip);
    }

    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return format!("ip:{}", ip);
    }

    "ip:unknown".to_string()
}

/// Prefers the authenticated subject over the client address.
pub fn extract_key(request: &Request) -> String {
    match request.extensions().get::<AuthUser>() {
        Some(user) => format!("user:{}", user.user_id),
        None => extract_ip_key(request.headers()),
    }
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert("X-RateLimit-Limit", num_to_header_value(decision.limit));
    headers.insert(
        "X-RateLimit-Remaining",
        num_to_header_value(decision.remaining),
    );
    headers.insert(
        "X-RateLimit-Reset",
        num_to_header_value(decision.reset_after.as_secs()),
    );
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = extract_key(&request);

    let decision = match limiter.check(&key).await {
        Ok(decision) => decision,
        Err(e) => {
            warn!(error = %e, key = %key, "Rate limiter error, allowing request");
            return next.run(request).await;
        }
    };

    if !decision.allowed {
        warn!(key = %key, limit = decision.limit, "Rate limit exceeded");
        counter!("rate_limit_rejections_total", 1);

        let mut response = ServiceError::RateLimitExceeded {
            retry_after_secs: decision.reset_after.as_secs(),
        }
        .into_response();
        if limiter.config().enable_headers {
            apply_headers(response.headers_mut(), &decision);
        }
        return response;
    }

    debug!(key = %key, remaining = decision.remaining, "Rate limit check passed");
    let mut response = next.run(request).await;
    if limiter.config().enable_headers {
        apply_headers(response.headers_mut(), &decision);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Router};
    use tower::ServiceExt;

    fn config(limit: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_window: limit,
            window_duration: Duration::from_secs(60),
            enable_headers: true,
        }
    }

    #[tokio::test]
    async fn in_memory_store_allows_up_to_the_limit() {
        let limiter = RateLimiter::in_memory(config(2));

        let first = limiter.check("ip:1.1.1.1").await.unwrap();
        let second = limiter.check("ip:1.1.1.1").await.unwrap();
        let third = limiter.check("ip:1.1.1.1").await.unwrap();

        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);
        assert!(!third.allowed);
    }

    #[tokio::test]
    async fn keys_are_counted_independently() {
        let limiter = RateLimiter::in_memory(config(1));

        assert!(limiter.check("user:a").await.unwrap().allowed);
        assert!(limiter.check("user:b").await.unwrap().allowed);
        assert!(!limiter.check("user:a").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn reset_clears_the_window() {
        let limiter = RateLimiter::in_memory(config(1));
        limiter.check("k").await.unwrap();
        limiter.reset("k").await.unwrap();

        assert!(limiter.check("k").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn expired_window_starts_over() {
        let limiter = RateLimiter::in_memory(RateLimitConfig {
            requests_per_window: 1,
            window_duration: Duration::from_millis(20),
            enable_headers: true,
        });
        limiter.check("k").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(limiter.check("k").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn cleanup_evicts_expired_windows() {
        let window = Duration::from_millis(1);
        let store = Arc::new(InMemoryRateLimitStore::new());
        let limiter = RateLimiter::new(
            RateLimitConfig {
                requests_per_window: 5,
                window_duration: window,
                enable_headers: false,
            },
            store.clone(),
        );

        for i in 0..10_000 {
            limiter.check(&format!("ip:10.0.{}.{}", i / 256, i % 256)).await.unwrap();
        }
        assert_eq!(store.len(), 10_000);

        tokio::time::sleep(Duration::from_millis(20)).await;
        limiter.check("user:fresh").await.unwrap();

        // The fresh key may or may not outlive a 1ms window by now
        let removed = limiter.cleanup_expired().await;
        assert!(removed >= 10_000, "removed {removed}");
        assert!(store.len() <= 1, "left {}", store.len());
    }

    #[tokio::test]
    async fn cleanup_keeps_live_windows() {
        let limiter = RateLimiter::in_memory(config(3));
        limiter.check("user:a").await.unwrap();

        assert_eq!(limiter.cleanup_expired().await, 0);
        assert_eq!(limiter.check("user:a").await.unwrap().remaining, 1);
    }

    #[tokio::test]
    async fn redis_fallback_windows_are_evicted() {
        let client = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        let store = RedisRateLimitStore::new(Arc::new(client), "test");
        let short = RateLimitConfig {
            requests_per_window: 5,
            window_duration: Duration::from_millis(1),
            enable_headers: false,
        };

        store.hit("a", &short).await.unwrap();
        store.hit("b", &short).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(store.cleanup_expired(short.window_duration).await, 2);
        assert!(store.fallback.is_empty());
    }

    #[tokio::test]
    async fn unreachable_redis_falls_back_to_memory() {
        let client = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        let store = RedisRateLimitStore::new(Arc::new(client), "test");

        let decision = store.hit("k", &config(5)).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[test]
    fn ip_key_prefers_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.1, 10.0.0.2".parse().unwrap());
        headers.insert("x-real-ip", "10.9.9.9".parse().unwrap());
        assert_eq!(extract_ip_key(&headers), "ip:10.0.0.1");

        headers.remove("x-forwarded-for");
        assert_eq!(extract_ip_key(&headers), "ip:10.9.9.9");

        assert_eq!(extract_ip_key(&HeaderMap::new()), "ip:unknown");
    }

    #[tokio::test]
    async fn middleware_returns_429_with_headers() {
        let limiter = Arc::new(RateLimiter::in_memory(config(1)));
        let app = Router::new().route("/", get(|| async { "ok" })).layer(
            axum::middleware::from_fn_with_state(limiter, rate_limit_middleware),
        );

        let request = || {
            Request::builder()
                .uri("/")
                .header("x-real-ip", "192.0.2.1")
                .body(Body::empty())
                .unwrap()
        };

        let ok = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(ok.headers()["X-RateLimit-Remaining"], "0");

        let limited = app.oneshot(request()).await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(limited.headers().contains_key("retry-after"));
        assert_eq!(limited.headers()["X-RateLimit-Limit"], "1");
    }
}
