mod layers;
mod rate_limiter;

pub use layers::{client_ip, is_authenticated, rate_limit, request_log, security_headers};
pub use rate_limiter::{
    Decision, DenyReason, EndpointClass, RateLimitConfig, RateLimiter, RateLimiterStats,
};
