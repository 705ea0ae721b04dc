//! Auth Token Manager (server side)
//! Mission: Issue, validate and renew session credentials

use crate::auth::{
    account_store::AccountStore,
    jwt::JwtHandler,
    models::{Account, AccountKind, Claims, TokenPair},
};
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const REFRESH_TOKEN_LEN: usize = 30;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("incorrect email or password")]
    InvalidCredentials,
    #[error("account has been blocked")]
    AccountBlocked,
    #[error("access token could not be decoded")]
    TokenDecodeFailure,
    #[error("refresh token does not match")]
    RefreshTokenMismatch,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Mint a random opaque refresh token
pub fn generate_refresh_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<AccountStore>,
    jwt: Arc<JwtHandler>,
}

impl AuthService {
    pub fn new(accounts: Arc<AccountStore>, jwt: Arc<JwtHandler>) -> Self {
        Self { accounts, jwt }
    }

    pub fn accounts(&self) -> &Arc<AccountStore> {
        &self.accounts
    }

    /// Authenticate by email and password.
    ///
    /// Blocked accounts are rejected before the password is checked. The stored
    /// refresh token is reused when present; otherwise a new one is persisted.
    pub fn login(
        &self,
        kind: AccountKind,
        email: &str,
        password: &str,
    ) -> Result<TokenPair, AuthError> {
        let Some(account) = self.accounts.find_by_email(kind, email)? else {
            warn!(kind = kind.as_str(), "Login failed: unknown account");
            return Err(AuthError::InvalidCredentials);
        };

        if !account.is_active() {
            warn!(account_id = %account.id, "Login refused: account blocked");
            return Err(AuthError::AccountBlocked);
        }

        if !self.accounts.verify_password(&account, password)? {
            warn!(account_id = %account.id, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let access_token = self.jwt.generate_token(&account)?;
        let refresh_token = self.stable_refresh_token(&account)?;

        info!(
            account_id = %account.id,
            kind = kind.as_str(),
            "Login successful"
        );

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    fn stable_refresh_token(&self, account: &Account) -> Result<String, AuthError> {
        if let Some(existing) = account.refresh_token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(existing.clone());
        }

        let token = generate_refresh_token();
        self.accounts.set_refresh_token(&account.id, &token)?;
        debug!(account_id = %account.id, "Issued new refresh token");
        Ok(token)
    }

    /// Verify signature and expiry; `None` means unauthenticated.
    pub fn decode_access_token(&self, token: &str) -> Option<Claims> {
        self.jwt.decode_access_token(token)
    }

    /// Mint a new access token from a possibly-expired one plus the stored refresh token.
    /// The refresh token itself is not rotated.
    pub fn refresh(
        &self,
        kind: AccountKind,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<String, AuthError> {
        let claims = self
            .jwt
            .decode_ignoring_expiry(access_token)
            .filter(|c| c.kind == kind)
            .ok_or(AuthError::TokenDecodeFailure)?;
        let account_id = claims.account_id().ok_or(AuthError::TokenDecodeFailure)?;

        let account = self
            .accounts
            .get_by_id(&account_id)?
            .filter(|a| a.kind == kind)
            .ok_or(AuthError::InvalidCredentials)?;

        if !tokens_match(account.refresh_token.as_deref(), refresh_token) {
            warn!(account_id = %account.id, "Refresh refused: token mismatch");
            return Err(AuthError::RefreshTokenMismatch);
        }

        if !account.is_active() {
            warn!(account_id = %account.id, "Refresh refused: account blocked");
            return Err(AuthError::AccountBlocked);
        }

        let access_token = self.jwt.generate_token(&account)?;
        debug!(account_id = %account.id, "Access token refreshed");
        Ok(access_token)
    }
}

/// Byte comparison without an early exit; only the length is observable
fn tokens_match(stored: Option<&str>, presented: &str) -> bool {
    let Some(stored) = stored else {
        return false;
    };
    if stored.len() != presented.len() {
        return false;
    }
    stored
        .bytes()
        .zip(presented.bytes())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}
