//! Permission Gate
//! Mission: Decide whether a protected admin view may render before any mutating action is offered

use crate::{
    client::{
        api_client::{ClientError, PermissionSource},
        session::SessionHandle,
    },
    roles::PermissionSet,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// What `check_access` answers before the first permission fetch resolves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderPolicy {
    /// Render nothing protected until the set is known
    #[default]
    DefaultDeny,
    /// Render first and verify afterwards
    Optimistic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Allowed,
    /// `navigate_back` is set when the permission set could not be fetched at all
    NoPermission { navigate_back: bool },
}

impl ViewState {
    pub fn offers_mutations(&self) -> bool {
        matches!(self, ViewState::Allowed)
    }
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("failed to fetch permissions: {0}")]
    PermissionFetchFailure(#[source] ClientError),
}

pub struct PermissionGate {
    source: Arc<dyn PermissionSource>,
    session: SessionHandle,
    policy: RenderPolicy,
    fetch_failed: AtomicBool,
}

impl PermissionGate {
    pub fn new(source: Arc<dyn PermissionSource>, session: SessionHandle) -> Self {
        Self::with_policy(source, session, RenderPolicy::default())
    }

    pub fn with_policy(
        source: Arc<dyn PermissionSource>,
        session: SessionHandle,
        policy: RenderPolicy,
    ) -> Self {
        Self {
            source,
            session,
            policy,
            fetch_failed: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> RenderPolicy {
        self.policy
    }

    /// Return a permission set for `key`, fetching only when the cache does not grant it.
    ///
    /// A fetched set is cached even when it denies `key`. Failures are not retried.
    pub async fn ensure_permissions(&self, key: &str) -> Result<PermissionSet, GateError> {
        if let Some(cached) = self.session.permissions() {
            if cached.allows(key) {
                return Ok(cached);
            }
        }

        match self.source.fetch_permissions().await {
            Ok(permissions) => {
                debug!(key, granted = permissions.allows(key), "Permissions fetched");
                self.fetch_failed.store(false, Ordering::Relaxed);
                self.session.set_permissions(permissions.clone());
                Ok(permissions)
            }
            Err(e) => {
                warn!(key, error = %e, "Permission fetch failed, denying view");
                self.fetch_failed.store(true, Ordering::Relaxed);
                Err(GateError::PermissionFetchFailure(e))
            }
        }
    }

    /// Cached lookup with no network access
    pub fn check_access(&self, key: &str) -> bool {
        if self.fetch_failed.load(Ordering::Relaxed) {
            return false;
        }
        match self.session.permissions() {
            Some(permissions) => permissions.allows(key),
            None => self.policy == RenderPolicy::Optimistic,
        }
    }

    /// Resolve the final view state for a protected view
    pub async fn resolve_view(&self, key: &str) -> ViewState {
        match self.ensure_permissions(key).await {
            Ok(permissions) if permissions.allows(key) => ViewState::Allowed,
            Ok(_) => ViewState::NoPermission {
                navigate_back: false,
            },
            Err(_) => ViewState::NoPermission {
                navigate_back: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::permissions::{ADMIN_ACCOUNTS_VIEW, ROLES_CREATE, ROLES_VIEW};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct StubSource {
        granted: Option<Vec<&'static str>>,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn granting(keys: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                granted: Some(keys),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                granted: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PermissionSource for StubSource {
        async fn fetch_permissions(&self) -> Result<PermissionSet, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.granted {
                Some(keys) => Ok(PermissionSet::from_granted(keys)),
                None => Err(ClientError::Unauthorized),
            }
        }
    }

    #[tokio::test]
    async fn test_cached_grant_skips_network() {
        let source = StubSource::granting(vec![ROLES_VIEW]);
        let gate = PermissionGate::new(source.clone(), SessionHandle::new());

        assert_eq!(gate.resolve_view(ROLES_VIEW).await, ViewState::Allowed);
        assert_eq!(gate.resolve_view(ROLES_VIEW).await, ViewState::Allowed);
        assert_eq!(source.calls(), 1);
        assert!(gate.check_access(ROLES_VIEW));
    }

    #[tokio::test]
    async fn test_denied_key_refetches_and_stays_denied() {
        let source = StubSource::granting(vec![ROLES_VIEW]);
        let gate = PermissionGate::new(source.clone(), SessionHandle::new());

        let view = gate.resolve_view(ROLES_CREATE).await;
        assert_eq!(view, ViewState::NoPermission { navigate_back: false });
        assert!(!view.offers_mutations());
        assert!(!gate.check_access(ROLES_CREATE));

        gate.resolve_view(ROLES_CREATE).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_denies_and_navigates_back() {
        let source = StubSource::failing();
        let gate = PermissionGate::with_policy(
            source.clone(),
            SessionHandle::new(),
            RenderPolicy::Optimistic,
        );

        // Optimistic policy renders before the first fetch
        assert!(gate.check_access(ADMIN_ACCOUNTS_VIEW));

        let result = gate.ensure_permissions(ADMIN_ACCOUNTS_VIEW).await;
        assert!(matches!(result, Err(GateError::PermissionFetchFailure(_))));
        assert!(!gate.check_access(ADMIN_ACCOUNTS_VIEW));

        let view = gate.resolve_view(ADMIN_ACCOUNTS_VIEW).await;
        assert_eq!(view, ViewState::NoPermission { navigate_back: true });
        assert!(!view.offers_mutations());
    }

    #[test]
    fn test_default_policy_denies_before_fetch() {
        let gate = PermissionGate::new(StubSource::granting(vec![]), SessionHandle::new());
        assert_eq!(gate.policy(), RenderPolicy::DefaultDeny);
        assert!(!gate.check_access(ROLES_VIEW));
    }

    #[tokio::test]
    async fn test_cache_shared_through_session() {
        let session = SessionHandle::new();
        session.set_permissions(PermissionSet::from_granted(&[ROLES_VIEW]));

        let source = StubSource::failing();
        let gate = PermissionGate::new(source.clone(), session.clone());

        assert_eq!(gate.resolve_view(ROLES_VIEW).await, ViewState::Allowed);
        assert_eq!(source.calls(), 0);

        session.clear();
        assert!(!gate.check_access(ROLES_VIEW));
    }
}
