//! Auth Token Manager (client side)
//! Mission: Attach credentials to outbound requests and recover from one expired access token
//!
//! A `401` triggers exactly one refresh followed by exactly one replay. Refreshes are
//! single-flighted: callers that queued behind an in-flight refresh reuse its result.

use crate::{
    auth::models::{LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, TokenPair},
    client::session::SessionHandle,
    config::ClientConfig,
    roles::{api::PermissionsResponse, PermissionSet},
};
use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Method, Response, StatusCode};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ClientError {
    /// Terminal: no usable credentials, or the server still refused after one refresh
    #[error("unauthorized")]
    Unauthorized,
    #[error("request failed with status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Source of the signed-in admin's permission set
#[async_trait]
pub trait PermissionSource: Send + Sync {
    async fn fetch_permissions(&self) -> Result<PermissionSet, ClientError>;
}

pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    session: SessionHandle,
    refresh_lock: Mutex<()>,
    refresh_calls: AtomicU64,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: SessionHandle) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            config,
            session,
            refresh_lock: Mutex::new(()),
            refresh_calls: AtomicU64::new(0),
        })
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Number of refresh calls this client has sent
    pub fn refresh_count(&self) -> u64 {
        self.refresh_calls.load(Ordering::Relaxed)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn auth_url(&self, action: &str) -> String {
        self.url(&format!("{}/{}", self.config.scope.auth_prefix(), action))
    }

    /// Log in and store the issued credentials in the session
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, ClientError> {
        let response = self
            .http
            .post(self.auth_url("login"))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: LoginResponse = response.json().await?;
        let pair = TokenPair {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
        };
        self.session.set_credentials(pair.clone());
        info!(scope = self.config.scope.as_str(), "Logged in");
        Ok(pair)
    }

    pub fn logout(&self) {
        self.session.clear();
    }

    pub async fn get(&self, path: &str) -> Result<Value, ClientError> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        self.send(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ClientError> {
        self.send(Method::DELETE, path, None).await
    }

    /// Send an authenticated request, refreshing and replaying once on `401`
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        let token = self.session.access_token().ok_or(ClientError::Unauthorized)?;

        let response = self.dispatch(method.clone(), path, body, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return read_body(response).await;
        }

        debug!(path, "Access token rejected, refreshing");
        let fresh = self.refresh_access_token(&token).await?;

        let retried = self.dispatch(method, path, body, &fresh).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!(path, "Request still unauthorized after refresh");
            self.session.clear();
            return Err(ClientError::Unauthorized);
        }
        read_body(retried).await
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: &str,
    ) -> Result<Response, ClientError> {
        let mut request = self
            .http
            .request(method, self.url(path))
            .header(AUTHORIZATION, token);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Single-flight refresh of `stale`.
    ///
    /// Holding the lock, a caller whose stale token was already replaced reuses the
    /// replacement; a caller that finds the session cleared gives up.
    async fn refresh_access_token(&self, stale: &str) -> Result<String, ClientError> {
        let _guard = self.refresh_lock.lock().await;

        match self.session.access_token() {
            Some(current) if current != stale => {
                debug!("Reusing access token refreshed by a concurrent request");
                return Ok(current);
            }
            None => return Err(ClientError::Unauthorized),
            Some(_) => {}
        }

        let Some(refresh_token) = self.session.refresh_token() else {
            self.session.fail_refresh();
            return Err(ClientError::Unauthorized);
        };

        self.session.begin_refresh();
        self.refresh_calls.fetch_add(1, Ordering::Relaxed);

        let result = self
            .http
            .post(self.auth_url("refresh"))
            .header(AUTHORIZATION, stale)
            .json(&RefreshRequest {
                refresh_token: Some(refresh_token),
            })
            .send()
            .await;

        let response = match result {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(status = response.status().as_u16(), "Refresh rejected");
                self.session.fail_refresh();
                return Err(ClientError::Unauthorized);
            }
            Err(e) => {
                warn!(error = %e, "Refresh request failed");
                self.session.fail_refresh();
                return Err(ClientError::Unauthorized);
            }
        };

        match response.json::<RefreshResponse>().await {
            Ok(body) => {
                self.session.finish_refresh(body.access_token.clone());
                debug!("Access token refreshed");
                Ok(body.access_token)
            }
            Err(e) => {
                warn!(error = %e, "Refresh response unreadable");
                self.session.fail_refresh();
                Err(ClientError::Unauthorized)
            }
        }
    }
}

#[async_trait]
impl PermissionSource for ApiClient {
    async fn fetch_permissions(&self) -> Result<PermissionSet, ClientError> {
        let value = self.get("/admin/roles/permissions").await?;
        let response: PermissionsResponse =
            serde_json::from_value(value).map_err(|e| ClientError::Api {
                status: 200,
                message: format!("malformed permissions response: {e}"),
            })?;

        if response.code != 200 {
            return Err(ClientError::Api {
                status: response.code,
                message: "permissions not granted".to_string(),
            });
        }
        Ok(response.permissions)
    }
}

async fn read_body(response: Response) -> Result<Value, ClientError> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Api {
        status: 200,
        message: format!("response is not JSON: {e}"),
    })
}

async fn api_error(response: Response) -> ClientError {
    let status = response.status().as_u16();
    let message = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| "request failed".to_string());
    ClientError::Api { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::AccountKind;

    fn client(scope: AccountKind) -> ApiClient {
        ApiClient::new(
            ClientConfig::new("http://127.0.0.1:9/api/v1", scope),
            SessionHandle::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_auth_urls_follow_scope() {
        let admin = client(AccountKind::Admin);
        assert_eq!(
            admin.auth_url("refresh"),
            "http://127.0.0.1:9/api/v1/admin/auth/refresh"
        );

        let customer = client(AccountKind::Client);
        assert_eq!(
            customer.auth_url("login"),
            "http://127.0.0.1:9/api/v1/auth/login"
        );
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized_without_network() {
        let admin = client(AccountKind::Admin);
        let result = admin.get("/admin/accounts").await;
        assert!(matches!(result, Err(ClientError::Unauthorized)));
        assert_eq!(admin.refresh_count(), 0);
    }
}
