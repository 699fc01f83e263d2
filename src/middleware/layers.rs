use std::net::SocketAddr;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use crate::api::routes::ApiState;
use crate::middleware::{Decision, DenyReason, EndpointClass};

/// Resolve the client IP: first `X-Forwarded-For` entry, then `X-Real-IP`,
/// then the socket peer address.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    peer.ip().to_string()
}

/// A request counts as authenticated once it carries an API key header or a
/// bearer token. Whether the credential is valid is the handler's problem —
/// the limiter only picks the threshold tier from it.
pub fn is_authenticated(headers: &HeaderMap) -> bool {
    if headers.contains_key("x-api-key") {
        return true;
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("Bearer "))
        .unwrap_or(false)
}

/// Rate limit gate. Runs before any handler logic; a denial becomes a 429
/// (403 for blacklisted IPs) carrying `Retry-After` and `X-RateLimit-Reset`.
pub async fn rate_limit(
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(req.headers(), peer);
    let path = req.uri().path().to_string();
    let class = EndpointClass::from_path(&path);
    let authenticated = is_authenticated(req.headers());

    match state.limiter.check_rate_limit(&ip, class, authenticated) {
        Decision::Allowed => {
            let mut response = next.run(req).await;
            let limit = if authenticated {
                state.limiter.config().auth_requests_per_minute
            } else {
                state.limiter.config().ip_requests_per_minute
            };
            response
                .headers_mut()
                .insert("x-ratelimit-limit", HeaderValue::from(limit));
            response
        }
        Decision::Denied { reason, retry_after_secs } => {
            warn!(%ip, %path, %reason, "rate limited");
            let status = match reason {
                DenyReason::Forbidden => StatusCode::FORBIDDEN,
                _ => StatusCode::TOO_MANY_REQUESTS,
            };
            let body = Json(serde_json::json!({
                "error": "rate_limit_exceeded",
                "message": reason.to_string(),
                "retry_after": retry_after_secs,
            }));
            let reset = now_secs() + retry_after_secs;

            let mut response = (status, body).into_response();
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            headers.insert("x-ratelimit-reset", HeaderValue::from(reset));
            response
        }
    }
}

/// OWASP-recommended response headers. HSTS only when the proxy says the
/// outer connection was HTTPS.
pub async fn security_headers(req: Request, next: Next) -> Response {
    let https = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("https"))
        .unwrap_or(false);

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "x-xss-protection",
        HeaderValue::from_static("1; mode=block"),
    );
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );
    if https {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }
    // Loose CSP — this is a JSON API, not a browser app.
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; script-src 'self' 'unsafe-inline'; \
             style-src 'self' 'unsafe-inline'; img-src 'self' data: https:; \
             font-src 'self'; frame-ancestors 'none'",
        ),
    );

    response
}

/// Audit log plus latency sampling. `/health` is polled by orchestration and
/// stays out of the log.
pub async fn request_log(
    State(state): State<ApiState>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let mut response = next.run(req).await;

    let elapsed = start.elapsed();
    state.latency.record(elapsed);

    if path != "/health" {
        info!(
            %method,
            %path,
            status = response.status().as_u16(),
            elapsed_ms = format_args!("{:.1}", elapsed.as_secs_f64() * 1000.0),
            "request"
        );
    }

    if let Ok(value) = HeaderValue::from_str(&format!("{:.6}", elapsed.as_secs_f64())) {
        response.headers_mut().insert("x-process-time", value);
    }

    response
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
