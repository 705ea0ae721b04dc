//! Authentication API Endpoints
//! Mission: Login, refresh and client registration for both account kinds

use crate::{
    api::{ApiError, ApiJson},
    auth::{
        middleware::token_from_headers,
        models::{
            AccountKind, AccountResponse, AccountStatus, LoginRequest, LoginResponse, NewAccount,
            RefreshRequest, RefreshResponse,
        },
    },
    server::AppState,
};
use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Admin login - POST /admin/auth/login
pub async fn admin_login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    login(&state, AccountKind::Admin, payload)
}

/// Client login - POST /auth/login
pub async fn client_login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    login(&state, AccountKind::Client, payload)
}

fn login(
    state: &AppState,
    kind: AccountKind,
    payload: LoginRequest,
) -> Result<Json<LoginResponse>, ApiError> {
    let pair = state
        .auth
        .login(kind, &payload.email, &payload.password)?;

    Ok(Json(LoginResponse {
        code: 200,
        message: "Success".to_string(),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

/// Admin refresh - POST /admin/auth/refresh
pub async fn admin_refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<ApiJson<RefreshRequest>>,
) -> Result<Json<RefreshResponse>, ApiError> {
    refresh(&state, AccountKind::Admin, &headers, payload)
}

/// Client refresh - POST /auth/refresh
pub async fn client_refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<ApiJson<RefreshRequest>>,
) -> Result<Json<RefreshResponse>, ApiError> {
    refresh(&state, AccountKind::Client, &headers, payload)
}

fn refresh(
    state: &AppState,
    kind: AccountKind,
    headers: &HeaderMap,
    payload: Option<ApiJson<RefreshRequest>>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let access_token = token_from_headers(headers).ok_or(ApiError::MissingAccessToken)?;
    // An absent or unreadable body carries no refresh token
    let refresh_token = payload
        .and_then(|ApiJson(body)| body.refresh_token)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::MissingRefreshToken)?;

    let access_token = state.auth.refresh(kind, &access_token, &refresh_token)?;

    Ok(Json(RefreshResponse {
        code: 200,
        message: "Success".to_string(),
        access_token,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

/// Client self-registration - POST /auth/register
pub async fn client_register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<Json<Value>, ApiError> {
    validate_credentials(&payload.email, &payload.password)?;

    let account = state.accounts.create_account(&NewAccount {
        kind: AccountKind::Client,
        full_name: payload.full_name,
        email: payload.email,
        password: payload.password,
        phone: payload.phone,
        avatar: None,
        role_id: None,
        status: AccountStatus::Active,
    })?;

    info!(account_id = %account.id, "Client registered");

    Ok(Json(json!({
        "code": 200,
        "message": "Account registered successfully",
        "account": AccountResponse::from_account(&account),
    })))
}

pub fn validate_credentials(email: &str, password: &str) -> Result<(), ApiError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::BadRequest("Invalid email address"));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest("Password must be at least 8 characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_credentials() {
        assert!(validate_credentials("a@b.c", "longenough").is_ok());
        assert!(matches!(
            validate_credentials("not-an-email", "longenough"),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            validate_credentials("a@b.c", "short"),
            Err(ApiError::BadRequest(_))
        ));
    }
}
