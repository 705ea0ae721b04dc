//! Client account endpoints
//! Mission: Profile lookups and favourite-post toggling for signed-in clients

use crate::{
    accounts::admin_api::parse_account_id,
    api::{ApiError, ApiJson},
    auth::models::{AccountKind, AccountResponse, Claims},
    server::AppState,
};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Signed-in client's own profile - GET /accounts/detail/local
pub async fn local_detail(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, ApiError> {
    let client = state.current_client(&claims)?;

    Ok(Json(json!({
        "code": 200,
        "message": "Success",
        "user": AccountResponse::from_account(&client),
    })))
}

/// Public profile of any account - GET /accounts/detail/:accountType/:id
pub async fn detail(
    State(state): State<AppState>,
    Path((account_type, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let kind = AccountKind::parse(&account_type)
        .ok_or(ApiError::BadRequest("No account type requested"))?;
    let id = parse_account_id(&id)?;

    let account = state
        .accounts
        .get_by_id(&id)?
        .filter(|a| a.kind == kind)
        .ok_or(ApiError::NotFound("Account not found"))?;

    let mut response = AccountResponse::from_account(&account);
    if kind == AccountKind::Admin {
        let role = account
            .role_id
            .map(|role_id| state.roles.get(&role_id))
            .transpose()?
            .flatten()
            .ok_or(ApiError::NotFound("Account role not found"))?;
        response = response.with_role_title(Some(role.title));
    }

    Ok(Json(json!({
        "code": 200,
        "message": "Success",
        "account": response,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRequest {
    pub post_id: Option<String>,
}

/// Toggle a favourite post - PATCH /accounts/favorite-posts
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<FavoriteRequest>,
) -> Result<Json<Value>, ApiError> {
    let client = state.current_client(&claims)?;
    let post_id = payload
        .post_id
        .filter(|p| !p.trim().is_empty())
        .ok_or(ApiError::BadRequest("Cannot get post id"))?;

    let is_add_task = state
        .accounts
        .toggle_favorite(&client.id, &post_id)?
        .ok_or(ApiError::NotFound("Account not found"))?;

    Ok(Json(json!({
        "code": 200,
        "message": "Success",
        "isAddTask": is_add_task,
    })))
}
