//! Client session state
//! Mission: Hold the cached credentials and permission set as an explicit, shareable handle

use crate::auth::models::TokenPair;
use crate::roles::PermissionSet;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Client-side credential lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialPhase {
    #[default]
    Unauthenticated,
    Authenticated,
    Refreshing,
}

#[derive(Debug, Default)]
struct SessionState {
    credentials: Option<TokenPair>,
    phase: CredentialPhase,
    permissions: Option<PermissionSet>,
}

/// Cheaply cloneable handle; every clone sees the same session.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<SessionState>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session that starts out authenticated with the given credentials
    pub fn with_credentials(pair: TokenPair) -> Self {
        let handle = Self::new();
        handle.set_credentials(pair);
        handle
    }

    pub fn phase(&self) -> CredentialPhase {
        self.inner.read().phase
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .read()
            .credentials
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner
            .read()
            .credentials
            .as_ref()
            .map(|c| c.refresh_token.clone())
    }

    pub fn credentials(&self) -> Option<TokenPair> {
        self.inner.read().credentials.clone()
    }

    /// Store freshly issued credentials. Permissions cached for a previous login are dropped.
    pub fn set_credentials(&self, pair: TokenPair) {
        let mut state = self.inner.write();
        state.credentials = Some(pair);
        state.phase = CredentialPhase::Authenticated;
        state.permissions = None;
    }

    pub(crate) fn begin_refresh(&self) {
        let mut state = self.inner.write();
        if state.credentials.is_some() {
            state.phase = CredentialPhase::Refreshing;
        }
    }

    pub(crate) fn finish_refresh(&self, access_token: String) {
        let mut state = self.inner.write();
        if let Some(credentials) = state.credentials.as_mut() {
            credentials.access_token = access_token;
            state.phase = CredentialPhase::Authenticated;
        }
    }

    pub(crate) fn fail_refresh(&self) {
        debug!("Refresh failed, session dropped");
        self.clear();
    }

    /// Logout: forget credentials and permissions
    pub fn clear(&self) {
        let mut state = self.inner.write();
        *state = SessionState::default();
    }

    pub fn permissions(&self) -> Option<PermissionSet> {
        self.inner.read().permissions.clone()
    }

    pub fn set_permissions(&self, permissions: PermissionSet) {
        self.inner.write().permissions = Some(permissions);
    }

    /// Persist the credentials as JSON (the client's durable storage)
    pub fn save(&self, path: &Path) -> Result<()> {
        let credentials = self.credentials();
        let json =
            serde_json::to_string_pretty(&credentials).context("Failed to encode session")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write session to {}", path.display()))?;
        Ok(())
    }

    /// Restore a session saved by [`SessionHandle::save`]; a missing file yields an empty session
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session from {}", path.display()))?;
        let credentials: Option<TokenPair> =
            serde_json::from_str(&raw).context("Failed to decode session")?;

        Ok(match credentials {
            Some(pair) => Self::with_credentials(pair),
            None => Self::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn pair() -> TokenPair {
        TokenPair {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        let session = SessionHandle::new();
        assert_eq!(session.phase(), CredentialPhase::Unauthenticated);
        assert!(session.access_token().is_none());

        session.set_credentials(pair());
        assert_eq!(session.phase(), CredentialPhase::Authenticated);

        session.begin_refresh();
        assert_eq!(session.phase(), CredentialPhase::Refreshing);

        session.finish_refresh("access-2".to_string());
        assert_eq!(session.phase(), CredentialPhase::Authenticated);
        assert_eq!(session.access_token().as_deref(), Some("access-2"));
        assert_eq!(session.refresh_token().as_deref(), Some("refresh-1"));

        session.begin_refresh();
        session.fail_refresh();
        assert_eq!(session.phase(), CredentialPhase::Unauthenticated);
        assert!(session.credentials().is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let session = SessionHandle::new();
        let other = session.clone();

        other.set_credentials(pair());
        other.set_permissions(PermissionSet::deny_all());

        assert!(session.access_token().is_some());
        assert!(session.permissions().is_some());

        session.clear();
        assert!(other.permissions().is_none());
        assert!(other.access_token().is_none());
    }

    #[test]
    fn test_new_login_drops_cached_permissions() {
        let session = SessionHandle::with_credentials(pair());
        session.set_permissions(PermissionSet::deny_all());
        session.set_credentials(pair());
        assert!(session.permissions().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let temp = NamedTempFile::new().unwrap();
        let session = SessionHandle::with_credentials(pair());
        session.save(temp.path()).unwrap();

        let restored = SessionHandle::load(temp.path()).unwrap();
        assert_eq!(restored.credentials(), Some(pair()));
        assert_eq!(restored.phase(), CredentialPhase::Authenticated);
        // Permissions are never persisted
        assert!(restored.permissions().is_none());

        SessionHandle::new().save(temp.path()).unwrap();
        let empty = SessionHandle::load(temp.path()).unwrap();
        assert_eq!(empty.phase(), CredentialPhase::Unauthenticated);
    }
}
