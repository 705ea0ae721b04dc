//! Authentication Models
//! Mission: Define account, credential and token data structures shared by server and client

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of the platform an account belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Admin,
    Client,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Admin => "admin",
            AccountKind::Client => "client",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(AccountKind::Admin),
            "client" => Some(AccountKind::Client),
            _ => None,
        }
    }

    /// Path prefix of the auth routes for this kind, relative to the API root.
    pub fn auth_prefix(&self) -> &'static str {
        match self {
            AccountKind::Admin => "/admin/auth",
            AccountKind::Client => "/auth",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(AccountStatus::Active),
            "inactive" => Some(AccountStatus::Inactive),
            _ => None,
        }
    }
}

/// Stored account, admin or client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub kind: AccountKind,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub role_id: Option<Uuid>,
    pub status: AccountStatus,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub favorite_posts: Vec<String>,
    pub deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Input for creating an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub kind: AccountKind,
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub role_id: Option<Uuid>,
    pub status: AccountStatus,
}

/// JWT Claims payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String, // account id
    pub kind: AccountKind,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn account_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

/// Login request body
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Issued session credential pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub code: u16,
    pub message: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// Refresh request body; the expired access token travels in the header
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub code: u16,
    pub message: String,
    pub access_token: String,
}

/// Account response (sanitized)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub id: String,
    pub kind: AccountKind,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_title: Option<String>,
    pub status: AccountStatus,
    #[serde(default)]
    pub favorite_posts: Vec<String>,
    pub created_at: String,
}

impl AccountResponse {
    pub fn from_account(account: &Account) -> Self {
        Self {
            id: account.id.to_string(),
            kind: account.kind,
            full_name: account.full_name.clone(),
            email: account.email.clone(),
            phone: account.phone.clone(),
            avatar: account.avatar.clone(),
            role_id: account.role_id.map(|id| id.to_string()),
            role_title: None,
            status: account.status,
            favorite_posts: account.favorite_posts.clone(),
            created_at: account.created_at.clone(),
        }
    }

    pub fn with_role_title(mut self, title: Option<String>) -> Self {
        self.role_title = title;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_account() -> Account {
        Account {
            id: Uuid::new_v4(),
            kind: AccountKind::Admin,
            full_name: "Linh Tran".to_string(),
            email: "linh@realty.local".to_string(),
            phone: None,
            avatar: None,
            password_hash: "hash".to_string(),
            role_id: Some(Uuid::new_v4()),
            status: AccountStatus::Active,
            refresh_token: Some("refresh".to_string()),
            favorite_posts: Vec::new(),
            deleted: false,
            created_at: "2025-01-01T00:00:00Z".to_string(),
            updated_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_kind_and_status_serialization() {
        assert_eq!(serde_json::to_string(&AccountKind::Admin).unwrap(), r#""admin""#);
        let status: AccountStatus = serde_json::from_str(r#""inactive""#).unwrap();
        assert_eq!(status, AccountStatus::Inactive);

        assert_eq!(AccountKind::parse("CLIENT"), Some(AccountKind::Client));
        assert_eq!(AccountStatus::parse("blocked"), None);
    }

    #[test]
    fn test_account_never_serializes_secrets() {
        let json = serde_json::to_value(sample_account()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("refresh_token").is_none());
        assert_eq!(json["email"], "linh@realty.local");
    }

    #[test]
    fn test_login_response_uses_camel_case() {
        let response = LoginResponse {
            code: 200,
            message: "Success".to_string(),
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["accessToken"], "a");
        assert_eq!(json["refreshToken"], "r");
    }

    #[test]
    fn test_account_response_from_account() {
        let account = sample_account();
        let response =
            AccountResponse::from_account(&account).with_role_title(Some("Editor".to_string()));
        assert_eq!(response.id, account.id.to_string());
        assert_eq!(response.role_title.as_deref(), Some("Editor"));
        assert_eq!(response.role_id, account.role_id.map(|id| id.to_string()));
    }
}
