//! Authentication Middleware
//! Mission: Protect API endpoints with access token validation

use crate::{api::ApiError, auth::service::AuthService};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::debug;

/// Read the access token from the `Authorization` header.
///
/// The header carries the raw token; a `Bearer ` prefix is tolerated.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = match raw.strip_prefix("Bearer") {
        Some(rest) if rest.is_empty() || rest.starts_with(' ') => rest.trim(),
        _ => raw,
    };
    (!token.is_empty()).then(|| token.to_string())
}

/// Auth middleware that decodes the access token and stores its claims on the request
pub async fn auth_middleware(
    State(auth): State<AuthService>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = token_from_headers(req.headers()).ok_or(ApiError::Unauthorized)?;

    let Some(claims) = auth.decode_access_token(&token) else {
        debug!(path = %req.uri().path(), "Rejected undecodable access token");
        return Err(ApiError::Unauthorized);
    };

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(token_from_headers(&headers).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("abc.def.ghi"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(token_from_headers(&headers).is_none());
    }
}
