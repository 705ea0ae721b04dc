//! Login throttling
//! Mission: Slow down password guessing per client IP and per targeted account
//!
//! Every attempt counts against two fixed windows: one for the client IP and one for
//! the (IP, submitted email) pair. The IP window tolerates a short burst above its
//! limit; the account window does not.

use crate::api::ApiError;
use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Login bodies are tiny; anything larger is rejected before parsing
const MAX_ATTEMPT_BODY: usize = 16 * 1024;

const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Attempts per window from one IP
    pub max_requests: u32,
    pub window: Duration,
    /// Extra IP attempts tolerated (and logged) before rejecting
    pub burst: u32,
    /// Attempts per window from one IP against one email
    pub per_account: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window: Duration::from_secs(60),
            burst: 5,
            per_account: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LimitKey {
    Ip(IpAddr),
    Account(IpAddr, String),
}

struct Window {
    count: u32,
    started: Instant,
}

#[derive(Debug, PartialEq, Eq)]
enum Decision {
    Allowed { remaining: u32 },
    /// Over the IP limit but inside the burst allowance
    Burst,
    Exceeded { retry_after: Duration },
}

impl Decision {
    fn stricter(self, other: Decision) -> Decision {
        use Decision::*;
        match (self, other) {
            (Exceeded { retry_after: a }, Exceeded { retry_after: b }) => Exceeded {
                retry_after: a.max(b),
            },
            (e @ Exceeded { .. }, _) | (_, e @ Exceeded { .. }) => e,
            (Burst, _) | (_, Burst) => Burst,
            (Allowed { remaining: a }, Allowed { remaining: b }) => Allowed {
                remaining: a.min(b),
            },
        }
    }
}

/// Shared limiter state; clones share the same windows.
#[derive(Clone)]
pub struct RateLimitLayer {
    config: RateLimitConfig,
    windows: Arc<Mutex<HashMap<LimitKey, Window>>>,
}

impl RateLimitLayer {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn check(&self, ip: IpAddr, email: Option<&str>) -> Decision {
        let mut windows = self.windows.lock();
        let now = Instant::now();

        let by_ip = self.hit(
            &mut windows,
            LimitKey::Ip(ip),
            self.config.max_requests,
            self.config.burst,
            now,
        );

        match email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty()) {
            Some(email) => {
                let by_account = self.hit(
                    &mut windows,
                    LimitKey::Account(ip, email),
                    self.config.per_account,
                    0,
                    now,
                );
                by_ip.stricter(by_account)
            }
            None => by_ip,
        }
    }

    fn hit(
        &self,
        windows: &mut HashMap<LimitKey, Window>,
        key: LimitKey,
        limit: u32,
        burst: u32,
        now: Instant,
    ) -> Decision {
        let window = windows.entry(key).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.duration_since(window.started) >= self.config.window {
            window.count = 0;
            window.started = now;
        }
        window.count = window.count.saturating_add(1);

        if window.count > limit.saturating_add(burst) {
            Decision::Exceeded {
                retry_after: (window.started + self.config.window).saturating_duration_since(now),
            }
        } else if window.count > limit {
            Decision::Burst
        } else {
            Decision::Allowed {
                remaining: limit - window.count,
            }
        }
    }

    /// Drop windows that ended at least one window ago (call from a background task)
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window = self.config.window;
        self.windows
            .lock()
            .retain(|_, w| now.duration_since(w.started) < window * 2);
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.windows.lock().len()
    }
}

#[derive(Deserialize)]
struct AttemptedLogin {
    email: Option<String>,
}

/// Throttle login and registration attempts.
///
/// The body is buffered to read the submitted email and handed on unchanged.
/// Requests without connection info share one IP bucket.
pub async fn rate_limit_middleware(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    State(limiter): State<RateLimitLayer>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_ATTEMPT_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(ip = %ip, error = %e, "Unreadable login body");
            return ApiError::InvalidBody.into_response();
        }
    };
    let email = serde_json::from_slice::<AttemptedLogin>(&bytes)
        .ok()
        .and_then(|attempt| attempt.email);

    let decision = limiter.check(ip, email.as_deref());
    let request = Request::from_parts(parts, Body::from(bytes));

    let remaining = match decision {
        Decision::Exceeded { retry_after } => {
            warn!(
                ip = %ip,
                account_scoped = email.is_some(),
                retry_after_secs = retry_after.as_secs(),
                "Login rate limit exceeded"
            );
            return too_many_requests(retry_after);
        }
        Decision::Burst => {
            warn!(ip = %ip, "Login burst allowance in use");
            0
        }
        Decision::Allowed { remaining } => remaining,
    };

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(REMAINING_HEADER, HeaderValue::from(remaining));
    response
}

fn too_many_requests(retry_after: Duration) -> Response {
    // Round up so clients never retry inside the window
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    let body = serde_json::json!({
        "code": 429,
        "message": "Too many login attempts. Please try again later.",
        "retryAfterSeconds": secs,
    });

    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            ("retry-after", secs.to_string()),
            ("x-ratelimit-remaining", "0".to_string()),
        ],
        Json(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, burst: u32, per_account: u32) -> RateLimitLayer {
        RateLimitLayer::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(60),
            burst,
            per_account,
        })
    }

    #[test]
    fn test_ip_limit_counts_down_then_bursts_then_rejects() {
        let limiter = limiter(3, 2, 100);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        assert_eq!(limiter.check(ip, None), Decision::Allowed { remaining: 2 });
        assert_eq!(limiter.check(ip, None), Decision::Allowed { remaining: 1 });
        assert_eq!(limiter.check(ip, None), Decision::Allowed { remaining: 0 });
        assert_eq!(limiter.check(ip, None), Decision::Burst);
        assert_eq!(limiter.check(ip, None), Decision::Burst);
        assert!(matches!(limiter.check(ip, None), Decision::Exceeded { .. }));

        let other: IpAddr = "10.0.0.2".parse().unwrap();
        assert_eq!(limiter.check(other, None), Decision::Allowed { remaining: 2 });
    }

    #[test]
    fn test_account_limit_is_per_email() {
        let limiter = limiter(100, 0, 2);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        assert_eq!(
            limiter.check(ip, Some("victim@example.com")),
            Decision::Allowed { remaining: 1 }
        );
        assert_eq!(
            limiter.check(ip, Some("Victim@Example.com ")),
            Decision::Allowed { remaining: 0 }
        );
        assert!(matches!(
            limiter.check(ip, Some("victim@example.com")),
            Decision::Exceeded { .. }
        ));

        // Another account from the same IP still has its own budget
        assert_eq!(
            limiter.check(ip, Some("other@example.com")),
            Decision::Allowed { remaining: 1 }
        );
    }

    #[test]
    fn test_stricter_decision_wins() {
        let allowed = Decision::Allowed { remaining: 4 };
        assert_eq!(
            allowed.stricter(Decision::Allowed { remaining: 1 }),
            Decision::Allowed { remaining: 1 }
        );
        assert_eq!(
            Decision::Burst.stricter(Decision::Allowed { remaining: 3 }),
            Decision::Burst
        );
        assert!(matches!(
            Decision::Burst.stricter(Decision::Exceeded {
                retry_after: Duration::from_secs(5)
            }),
            Decision::Exceeded { .. }
        ));
    }

    #[test]
    fn test_window_resets_and_cleanup() {
        let limiter = RateLimitLayer::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_millis(0),
            burst: 0,
            per_account: 1,
        });
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        // A zero-length window resets on every attempt
        assert_eq!(
            limiter.check(ip, Some("a@example.com")),
            Decision::Allowed { remaining: 0 }
        );
        assert_eq!(
            limiter.check(ip, Some("a@example.com")),
            Decision::Allowed { remaining: 0 }
        );

        assert_eq!(limiter.tracked(), 2);
        limiter.cleanup();
        assert_eq!(limiter.tracked(), 0);
    }
}
