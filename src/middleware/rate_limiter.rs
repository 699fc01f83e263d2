use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::warn;

use crate::config::{
    BLACKLIST_RETRY_AFTER_SECS, OVERLOAD_RETRY_AFTER_SECS, RATE_CLEANUP_INTERVAL_SECS,
    RATE_RETENTION_SECS,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Rate limit thresholds, fixed at construction.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Aggregate budget across all IPs — first line of defense.
    pub global_requests_per_minute: usize,
    pub global_requests_per_second: usize,

    /// Per-IP budget for unauthenticated callers.
    pub ip_requests_per_minute: usize,
    pub ip_requests_per_second: usize,

    /// Per-IP budget once an API key is presented (looser).
    pub auth_requests_per_minute: usize,
    pub auth_requests_per_second: usize,

    /// Brute-force defense.
    pub login_attempts_per_minute: usize,
    pub register_attempts_per_minute: usize,

    /// How long an abusive IP stays blocked once a tight threshold trips.
    pub block_duration_secs: u64,

    /// Always admitted, never blocked.
    pub whitelist_ips: HashSet<String>,
    /// Always rejected.
    pub blacklist_ips: HashSet<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_requests_per_minute: 1000,
            global_requests_per_second: 50,
            ip_requests_per_minute: 100,
            ip_requests_per_second: 10,
            auth_requests_per_minute: 300,
            auth_requests_per_second: 30,
            login_attempts_per_minute: 5,
            register_attempts_per_minute: 3,
            block_duration_secs: 300,
            whitelist_ips: ["127.0.0.1", "::1"].iter().map(|s| s.to_string()).collect(),
            blacklist_ips: HashSet::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoint classification
// ---------------------------------------------------------------------------

/// Which counter family a request path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    Registration,
    Login,
    General,
}

impl EndpointClass {
    /// Login covers every credential-bearing endpoint, API-key issuance
    /// included.
    pub fn from_path(path: &str) -> Self {
        match path {
            "/users/register" | "/register" => EndpointClass::Registration,
            "/users/login" | "/login" | "/users/api-keys" => EndpointClass::Login,
            _ => EndpointClass::General,
        }
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Blacklisted IP — the HTTP layer maps this to 403 rather than 429.
    Forbidden,
    TemporarilyBlocked,
    TooManyRegistrationAttempts,
    TooManyLoginAttempts,
    RequestFrequencyTooHigh,
    TooManyRequestsPerMinute,
    ServiceOverloaded,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DenyReason::Forbidden => "access forbidden",
            DenyReason::TemporarilyBlocked => "temporarily blocked",
            DenyReason::TooManyRegistrationAttempts => "too many registration attempts",
            DenyReason::TooManyLoginAttempts => "too many login attempts",
            DenyReason::RequestFrequencyTooHigh => "request frequency too high",
            DenyReason::TooManyRequestsPerMinute => "too many requests (per-minute limit)",
            DenyReason::ServiceOverloaded => "service overloaded",
        };
        write!(f, "{s}")
    }
}

/// Outcome of a rate limit check. A denial is a normal result, not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Allowed,
    Denied {
        reason: DenyReason,
        retry_after_secs: u64,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Observability snapshot for /stats/ratelimit.
#[derive(Debug, Serialize)]
pub struct RateLimiterStats {
    pub active_ips: usize,
    pub blocked_ips: usize,
    pub global_rpm: usize,
}

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

/// In-memory sliding-window rate limiter.
///
/// Single-process only: all state lives in this process. A multi-process or
/// distributed deployment needs an external shared store (e.g. Redis) behind
/// the same check interface — do not scale this out as-is.
///
/// Every mutation runs inside one mutex-guarded critical section so the
/// check-and-increment per IP is atomic under concurrent bursts.
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

#[derive(Debug)]
struct LimiterState {
    /// IP → generic request timestamps (seconds since the Unix epoch).
    requests: HashMap<String, Vec<f64>>,
    login_attempts: HashMap<String, Vec<f64>>,
    register_attempts: HashMap<String, Vec<f64>>,
    /// IP → unblock time.
    blocked: HashMap<String, f64>,
    /// Admitted generic requests across all IPs.
    global_requests: Vec<f64>,
    last_cleanup: f64,
}

impl LimiterState {
    fn new(now: f64) -> Self {
        Self {
            requests: HashMap::new(),
            login_attempts: HashMap::new(),
            register_attempts: HashMap::new(),
            blocked: HashMap::new(),
            global_requests: Vec::new(),
            last_cleanup: now,
        }
    }

    /// Opportunistic garbage collection, at most once per cleanup interval.
    /// Drops timestamps older than the retention horizon, removes emptied
    /// per-IP entries and expired blocks.
    fn cleanup(&mut self, now: f64) {
        if now - self.last_cleanup < RATE_CLEANUP_INTERVAL_SECS {
            return;
        }
        self.last_cleanup = now;
        let cutoff = now - RATE_RETENTION_SECS;

        prune(&mut self.requests, cutoff);
        prune(&mut self.login_attempts, cutoff);
        prune(&mut self.register_attempts, cutoff);
        self.blocked.retain(|_, until| *until >= now);
        self.global_requests.retain(|&t| t > cutoff);
    }
}

fn prune(map: &mut HashMap<String, Vec<f64>>, cutoff: f64) {
    map.retain(|_, timestamps| {
        timestamps.retain(|&t| t > cutoff);
        !timestamps.is_empty()
    });
}

/// Timestamps strictly inside the trailing window — a true sliding window,
/// recomputed on every check.
fn count_recent(timestamps: &[f64], now: f64, window_secs: f64) -> usize {
    let cutoff = now - window_secs;
    timestamps.iter().filter(|&&t| t > cutoff).count()
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LimiterState::new(now_secs())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Decide whether to admit a request from `ip`.
    ///
    /// First matching rule wins: whitelist → blacklist → active block →
    /// registration/login attempt counters (blocking the IP when tripped) →
    /// per-IP second/minute windows → global second window.
    ///
    /// The current request's timestamp is recorded before counting, so with a
    /// threshold of N the (N+1)-th call inside the window is the first denied.
    pub fn check_rate_limit(
        &self,
        ip: &str,
        class: EndpointClass,
        is_authenticated: bool,
    ) -> Decision {
        let now = now_secs();
        let mut st = self.lock_state();
        st.cleanup(now);

        if self.config.whitelist_ips.contains(ip) {
            return Decision::Allowed;
        }

        if self.config.blacklist_ips.contains(ip) {
            return Decision::Denied {
                reason: DenyReason::Forbidden,
                retry_after_secs: BLACKLIST_RETRY_AFTER_SECS,
            };
        }

        if let Some(&until) = st.blocked.get(ip) {
            if until > now {
                return Decision::Denied {
                    reason: DenyReason::TemporarilyBlocked,
                    retry_after_secs: (until - now) as u64,
                };
            }
            // Lazy expiry — drop the stale entry and keep evaluating.
            st.blocked.remove(ip);
        }

        match class {
            EndpointClass::Registration => {
                let attempts = st.register_attempts.entry(ip.to_string()).or_default();
                attempts.push(now);
                if count_recent(attempts, now, 60.0) > self.config.register_attempts_per_minute {
                    self.block_locked(&mut st, ip, now, self.config.block_duration_secs);
                    return Decision::Denied {
                        reason: DenyReason::TooManyRegistrationAttempts,
                        retry_after_secs: self.config.block_duration_secs,
                    };
                }
                Decision::Allowed
            }

            EndpointClass::Login => {
                let attempts = st.login_attempts.entry(ip.to_string()).or_default();
                attempts.push(now);
                if count_recent(attempts, now, 60.0) > self.config.login_attempts_per_minute {
                    self.block_locked(&mut st, ip, now, self.config.block_duration_secs);
                    return Decision::Denied {
                        reason: DenyReason::TooManyLoginAttempts,
                        retry_after_secs: self.config.block_duration_secs,
                    };
                }
                Decision::Allowed
            }

            EndpointClass::General => {
                st.global_requests.push(now);
                let requests = st.requests.entry(ip.to_string()).or_default();
                requests.push(now);

                let (rpm, rps) = if is_authenticated {
                    (
                        self.config.auth_requests_per_minute,
                        self.config.auth_requests_per_second,
                    )
                } else {
                    (
                        self.config.ip_requests_per_minute,
                        self.config.ip_requests_per_second,
                    )
                };

                let second_count = count_recent(requests, now, 1.0);
                let minute_count = count_recent(requests, now, 60.0);

                if second_count > rps {
                    return Decision::Denied {
                        reason: DenyReason::RequestFrequencyTooHigh,
                        retry_after_secs: 1,
                    };
                }
                if minute_count > rpm {
                    return Decision::Denied {
                        reason: DenyReason::TooManyRequestsPerMinute,
                        retry_after_secs: 60,
                    };
                }
                if count_recent(&st.global_requests, now, 1.0)
                    > self.config.global_requests_per_second
                {
                    return Decision::Denied {
                        reason: DenyReason::ServiceOverloaded,
                        retry_after_secs: OVERLOAD_RETRY_AFTER_SECS,
                    };
                }

                Decision::Allowed
            }
        }
    }

    /// Block an IP for `duration_secs` (configured default when None).
    /// Whitelisted IPs are never blocked.
    pub fn block_ip(&self, ip: &str, duration_secs: Option<u64>) {
        let duration = duration_secs.unwrap_or(self.config.block_duration_secs);
        let mut st = self.lock_state();
        self.block_locked(&mut st, ip, now_secs(), duration);
    }

    /// True while a block is active. An expired block is removed on the way
    /// out (lazy expiry) and reported as not blocked.
    pub fn is_blocked(&self, ip: &str) -> bool {
        let now = now_secs();
        let mut st = self.lock_state();
        match st.blocked.get(ip) {
            Some(&until) if until > now => true,
            Some(_) => {
                st.blocked.remove(ip);
                false
            }
            None => false,
        }
    }

    /// Snapshot of limiter occupancy. Does not trigger cleanup.
    pub fn stats(&self) -> RateLimiterStats {
        let st = self.lock_state();
        RateLimiterStats {
            active_ips: st.requests.len(),
            blocked_ips: st.blocked.len(),
            global_rpm: count_recent(&st.global_requests, now_secs(), 60.0),
        }
    }

    fn block_locked(&self, st: &mut LimiterState, ip: &str, now: f64, duration_secs: u64) {
        if self.config.whitelist_ips.contains(ip) {
            return;
        }
        st.blocked.insert(ip.to_string(), now + duration_secs as f64);
        warn!(ip, duration_secs, "IP blocked");
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LimiterState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
