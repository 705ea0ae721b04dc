//! Administrator account endpoints
//! Mission: Permission-gated CRUD over admin accounts

use crate::{
    api::{ApiError, ApiJson, MessageResponse},
    auth::{
        account_store::{AvatarChange, ProfileUpdate},
        api::validate_credentials,
        models::{Account, AccountKind, AccountResponse, AccountStatus, Claims, NewAccount},
    },
    roles::permissions::{
        ADMIN_ACCOUNTS_CREATE, ADMIN_ACCOUNTS_DELETE, ADMIN_ACCOUNTS_EDIT, ADMIN_ACCOUNTS_VIEW,
    },
    server::AppState,
};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

pub(crate) fn parse_account_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid account ID"))
}

fn load_admin(state: &AppState, id: &Uuid) -> Result<Account, ApiError> {
    state
        .accounts
        .get_by_id(id)?
        .filter(|a| a.kind == AccountKind::Admin)
        .ok_or(ApiError::NotFound("Account not found"))
}

fn role_title(state: &AppState, account: &Account) -> Result<Option<String>, ApiError> {
    let Some(role_id) = account.role_id else {
        return Ok(None);
    };
    Ok(state.roles.get(&role_id)?.map(|r| r.title))
}

/// List admin accounts - GET /admin/accounts
pub async fn index(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, ApiError> {
    state.require_permission(&claims, ADMIN_ACCOUNTS_VIEW)?;

    let accounts = state
        .accounts
        .list(AccountKind::Admin)?
        .iter()
        .map(|account| {
            let title = role_title(&state, account)?.unwrap_or_else(|| "unknown".to_string());
            Ok(AccountResponse::from_account(account).with_role_title(Some(title)))
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    Ok(Json(json!({
        "code": 200,
        "message": "Success",
        "accounts": accounts,
    })))
}

/// Admin account detail - GET /admin/accounts/detail/:accountId
pub async fn detail(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(account_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.require_permission(&claims, ADMIN_ACCOUNTS_VIEW)?;
    let account = load_admin(&state, &parse_account_id(&account_id)?)?;
    let title = role_title(&state, &account)?;

    Ok(Json(json!({
        "code": 200,
        "message": "Success",
        "account": AccountResponse::from_account(&account).with_role_title(title),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdminRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub role_id: String,
    pub status: Option<AccountStatus>,
}

/// Create admin account - POST /admin/accounts/create
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<CreateAdminRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let creator = state.require_permission(&claims, ADMIN_ACCOUNTS_CREATE)?;
    validate_credentials(&payload.email, &payload.password)?;

    let role_id =
        Uuid::parse_str(&payload.role_id).map_err(|_| ApiError::BadRequest("Invalid role ID"))?;
    if state.roles.get(&role_id)?.is_none() {
        return Err(ApiError::BadRequest("Role does not exist"));
    }

    let account = state.accounts.create_account(&NewAccount {
        kind: AccountKind::Admin,
        full_name: payload.full_name,
        email: payload.email,
        password: payload.password,
        phone: payload.phone,
        avatar: payload.avatar,
        role_id: Some(role_id),
        status: payload.status.unwrap_or(AccountStatus::Active),
    })?;

    info!(account_id = %account.id, by = %creator.id, "Administrator account created");
    Ok(MessageResponse::ok(
        "New administrator account created successfully",
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditAccountRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    #[serde(default)]
    pub avatar_remove: bool,
}

impl EditAccountRequest {
    /// Removal wins over a new avatar
    pub fn into_update(self) -> ProfileUpdate {
        let avatar = if self.avatar_remove {
            AvatarChange::Unset
        } else if let Some(url) = self.avatar.filter(|u| !u.is_empty()) {
            AvatarChange::Set(url)
        } else {
            AvatarChange::Keep
        };

        ProfileUpdate {
            full_name: self.full_name,
            phone: self.phone,
            avatar,
        }
    }
}

/// Edit admin account - PATCH /admin/accounts/edit/:accountId
pub async fn edit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(account_id): Path<String>,
    ApiJson(payload): ApiJson<EditAccountRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.require_permission(&claims, ADMIN_ACCOUNTS_EDIT)?;
    let target = load_admin(&state, &parse_account_id(&account_id)?)?;

    if !state
        .accounts
        .update_profile(&target.id, &payload.into_update())?
    {
        return Err(ApiError::NotFound("Account not found"));
    }

    Ok(MessageResponse::ok("Account has been updated successfully"))
}

/// Block or unblock - PATCH /admin/accounts/change-status/:status/:accountId
pub async fn change_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((status, account_id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, ApiError> {
    let actor = state.require_permission(&claims, ADMIN_ACCOUNTS_EDIT)?;
    let status = AccountStatus::parse(&status).ok_or(ApiError::BadRequest("Invalid status"))?;
    let target = load_admin(&state, &parse_account_id(&account_id)?)?;

    if target.id == actor.id && status == AccountStatus::Inactive {
        return Err(ApiError::BadRequest("Cannot block your own account"));
    }

    state.accounts.set_status(&target.id, status)?;
    Ok(MessageResponse::ok("Account status has been updated"))
}

/// Soft delete - DELETE /admin/accounts/delete/:accountId
pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(account_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let actor = state.require_permission(&claims, ADMIN_ACCOUNTS_DELETE)?;
    let target = load_admin(&state, &parse_account_id(&account_id)?)?;

    if target.id == actor.id {
        return Err(ApiError::BadRequest("Cannot delete your own account"));
    }

    state.accounts.soft_delete(&target.id)?;
    info!(account_id = %target.id, by = %actor.id, "Administrator account deleted");
    Ok(MessageResponse::ok("Account has been deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_request_avatar_precedence() {
        let remove = EditAccountRequest {
            full_name: None,
            phone: None,
            avatar: Some("https://cdn/a.png".to_string()),
            avatar_remove: true,
        };
        assert_eq!(remove.into_update().avatar, AvatarChange::Unset);

        let set = EditAccountRequest {
            full_name: None,
            phone: None,
            avatar: Some("https://cdn/a.png".to_string()),
            avatar_remove: false,
        };
        assert_eq!(
            set.into_update().avatar,
            AvatarChange::Set("https://cdn/a.png".to_string())
        );

        let keep: EditAccountRequest = serde_json::from_str(r#"{"fullName":"X"}"#).unwrap();
        let update = keep.into_update();
        assert_eq!(update.avatar, AvatarChange::Keep);
        assert_eq!(update.full_name.as_deref(), Some("X"));
    }

    #[test]
    fn test_parse_account_id() {
        assert!(parse_account_id("nope").is_err());
        assert!(parse_account_id(&Uuid::new_v4().to_string()).is_ok());
    }
}
