//! Role API Endpoints
//! Mission: Expose the caller's permission set and role management

use crate::{
    api::{ApiError, ApiJson},
    auth::models::Claims,
    roles::permissions::{PermissionSet, ROLES_CREATE, ROLES_PERMISSIONS, ROLES_VIEW},
    server::AppState,
};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct PermissionsResponse {
    pub code: u16,
    pub permissions: PermissionSet,
}

/// Current admin's permissions - GET /admin/roles/permissions
pub async fn my_permissions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<PermissionsResponse>, ApiError> {
    let admin = state.current_admin(&claims)?;
    let permissions = state.roles.permissions_for(admin.role_id.as_ref())?;

    Ok(Json(PermissionsResponse {
        code: 200,
        permissions,
    }))
}

/// List roles - GET /admin/roles
pub async fn list_roles(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, ApiError> {
    state.require_permission(&claims, ROLES_VIEW)?;
    let roles = state.roles.list()?;

    Ok(Json(json!({
        "code": 200,
        "message": "Success",
        "roles": roles,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Create role - POST /admin/roles/create
pub async fn create_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<CreateRoleRequest>,
) -> Result<Json<Value>, ApiError> {
    let admin = state.require_permission(&claims, ROLES_CREATE)?;

    let title = payload.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Role title is required"));
    }

    let role = state
        .roles
        .create_role(title, payload.description.as_deref(), &payload.permissions)?;
    info!(role_id = %role.id, by = %admin.id, "Role created");

    Ok(Json(json!({
        "code": 200,
        "message": "New role created successfully",
        "role": role,
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePermissionsRequest {
    pub permissions: Vec<String>,
}

/// Replace a role's grants - PATCH /admin/roles/permissions/:roleId
pub async fn update_permissions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(role_id): Path<String>,
    ApiJson(payload): ApiJson<UpdatePermissionsRequest>,
) -> Result<Json<Value>, ApiError> {
    let admin = state.require_permission(&claims, ROLES_PERMISSIONS)?;
    let role_id = Uuid::parse_str(&role_id).map_err(|_| ApiError::BadRequest("Invalid role ID"))?;

    if !state.roles.set_permissions(&role_id, &payload.permissions)? {
        return Err(ApiError::NotFound("Role not found"));
    }
    info!(role_id = %role_id, by = %admin.id, "Role permissions updated");

    Ok(Json(json!({
        "code": 200,
        "message": "Permissions updated successfully",
    })))
}
