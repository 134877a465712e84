//! Request-id, rate-limiting, and auth-context middleware layered around the router (spec
//! section 4.16). CORS, body-size-limiting, and request tracing are handled by `tower-http`
//! layers composed directly in [`crate::routes::build_router`] instead of being hand-rolled
//! here; this module covers the two concerns the corpus always writes bespoke: per-client
//! rate limiting and auth-context extraction.

use crate::auth::{authenticate, AuthContext};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Request id extension type; set by [`request_id_middleware`], read by handlers and logs.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

struct RequestCount {
    count: u32,
    window_start: Instant,
}

/// Fixed-window per-client request counter. Each client id gets `requests_per_window`
/// requests per `window_duration`; the window resets wholesale once it elapses rather than
/// sliding continuously.
pub struct RateLimiterState {
    requests: RwLock<HashMap<String, RequestCount>>,
    requests_per_window: u32,
    window_duration: Duration,
}

pub enum RateLimitOutcome {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

impl RateLimiterState {
    pub fn new(requests_per_window: u32, window_duration: Duration) -> Self {
        RateLimiterState { requests: RwLock::new(HashMap::new()), requests_per_window, window_duration }
    }

    pub async fn check_and_increment(&self, client_id: &str) -> RateLimitOutcome {
        let mut requests = self.requests.write().await;
        let now = Instant::now();
        let entry = requests
            .entry(client_id.to_string())
            .or_insert(RequestCount { count: 0, window_start: now });

        if now.duration_since(entry.window_start) > self.window_duration {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        if entry.count > self.requests_per_window {
            let elapsed = now.duration_since(entry.window_start);
            let retry_after_secs = self.window_duration.saturating_sub(elapsed).as_secs().max(1);
            RateLimitOutcome::Limited { retry_after_secs }
        } else {
            RateLimitOutcome::Allowed { remaining: self.requests_per_window - entry.count }
        }
    }
}

fn client_id(headers: &HeaderMap) -> String {
    if let Some(api_key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return format!("key:{api_key}");
    }
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next() {
            return format!("ip:{}", ip.trim());
        }
    }
    "ip:unknown".to_string()
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let client = client_id(&headers);
    match state.rate_limiter.check_and_increment(&client).await {
        RateLimitOutcome::Allowed { remaining } => {
            let mut response = next.run(request).await;
            if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
                response.headers_mut().insert("x-ratelimit-remaining", value);
            }
            response
        }
        RateLimitOutcome::Limited { retry_after_secs } => {
            let error = flowforge_core::error::ForgeError::Validation(format!(
                "rate limit exceeded, retry after {retry_after_secs}s"
            ));
            let mut response = ApiError::from(error).into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("retry-after", value);
            }
            response
        }
    }
}

/// Resolves the caller's [`AuthContext`] from request headers and stashes it in request
/// extensions. A request that fails authentication short-circuits here with the mapped
/// error response rather than reaching any handler.
pub async fn auth_context_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state.settings, &headers) {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Pulls the [`AuthContext`] a handler needs out of request extensions. Only missing when
/// `auth_context_middleware` was not layered in front of the route, which is a wiring bug.
pub fn require_auth_context(request: &Request) -> Result<AuthContext, ApiError> {
    request
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or_else(|| ApiError::from(flowforge_core::error::ForgeError::Unauthorized("missing auth context".to_string())))
}

pub async fn metrics_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    let is_error = response.status().is_client_error() || response.status().is_server_error();
    state.metrics.record_request(&method, &path, is_error, latency_ms);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_allows_up_to_the_configured_count() {
        let limiter = RateLimiterState::new(2, Duration::from_secs(60));
        assert!(matches!(limiter.check_and_increment("a").await, RateLimitOutcome::Allowed { .. }));
        assert!(matches!(limiter.check_and_increment("a").await, RateLimitOutcome::Allowed { .. }));
        assert!(matches!(limiter.check_and_increment("a").await, RateLimitOutcome::Limited { .. }));
    }

    #[tokio::test]
    async fn rate_limiter_tracks_clients_independently() {
        let limiter = RateLimiterState::new(1, Duration::from_secs(60));
        assert!(matches!(limiter.check_and_increment("a").await, RateLimitOutcome::Allowed { .. }));
        assert!(matches!(limiter.check_and_increment("b").await, RateLimitOutcome::Allowed { .. }));
    }

    #[test]
    fn client_id_prefers_api_key_over_forwarded_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "secret".parse().unwrap());
        headers.insert("x-forwarded-for", "1.2.3.4".parse().unwrap());
        assert_eq!(client_id(&headers), "key:secret");
    }

    #[test]
    fn client_id_falls_back_to_forwarded_ip_then_unknown() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "5.6.7.8, 9.9.9.9".parse().unwrap());
        assert_eq!(client_id(&headers), "ip:5.6.7.8");
        assert_eq!(client_id(&HeaderMap::new()), "ip:unknown");
    }
}
