//! Request logging
//! Mission: One span per request tagged with the audience it serves
//!
//! Rejections on the token endpoints log at WARN; other 4xx stay at INFO.

use crate::server::API_PREFIX;
use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};

/// Which side of the platform a path belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteScope {
    AdminAuth,
    Admin,
    ClientAuth,
    Client,
    Public,
}

impl RouteScope {
    pub fn of(path: &str) -> Self {
        let Some(rest) = path.strip_prefix(API_PREFIX) else {
            return RouteScope::Public;
        };
        if rest.starts_with("/admin/auth/") {
            RouteScope::AdminAuth
        } else if rest.starts_with("/admin/") || rest == "/admin" {
            RouteScope::Admin
        } else if rest.starts_with("/auth/") {
            RouteScope::ClientAuth
        } else if rest.starts_with("/accounts/") {
            RouteScope::Client
        } else {
            RouteScope::Public
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteScope::AdminAuth => "admin-auth",
            RouteScope::Admin => "admin",
            RouteScope::ClientAuth => "client-auth",
            RouteScope::Client => "client",
            RouteScope::Public => "public",
        }
    }

    fn is_auth(&self) -> bool {
        matches!(self, RouteScope::AdminAuth | RouteScope::ClientAuth)
    }
}

/// Health checks are skipped.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if path == "/health" {
        return next.run(request).await;
    }

    let scope = RouteScope::of(&path);
    let span = info_span!(
        "http_request",
        method = %request.method(),
        path = %path,
        scope = scope.as_str(),
    );

    async move {
        let start = Instant::now();
        let response = next.run(request).await;
        let latency_ms = start.elapsed().as_millis() as u64;
        let status = response.status().as_u16();

        if status >= 500 {
            warn!(status, latency_ms, "Request failed (5xx)");
        } else if scope.is_auth() && matches!(status, 400 | 401 | 403 | 429) {
            warn!(status, latency_ms, "Authentication rejected");
        } else {
            info!(status, latency_ms, "Request completed");
        }

        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_scope_classification() {
        assert_eq!(RouteScope::of("/api/v1/admin/auth/login"), RouteScope::AdminAuth);
        assert_eq!(RouteScope::of("/api/v1/admin/roles/permissions"), RouteScope::Admin);
        assert_eq!(RouteScope::of("/api/v1/auth/refresh"), RouteScope::ClientAuth);
        assert_eq!(RouteScope::of("/api/v1/accounts/detail/local"), RouteScope::Client);
        assert_eq!(RouteScope::of("/api/v1/unknown"), RouteScope::Public);
        assert_eq!(RouteScope::of("/admin/auth/login"), RouteScope::Public);
    }
}
