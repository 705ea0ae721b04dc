//! Permission catalogue and derived permission sets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PROPERTIES_VIEW: &str = "propertiesView";
pub const PROPERTIES_CREATE: &str = "propertiesCreate";
pub const PROPERTIES_EDIT: &str = "propertiesEdit";
pub const PROPERTIES_DELETE: &str = "propertiesDelete";
pub const PROPERTY_CATEGORIES_VIEW: &str = "propertyCategoriesView";
pub const PROPERTY_CATEGORIES_CREATE: &str = "propertyCategoriesCreate";
pub const PROPERTY_CATEGORIES_EDIT: &str = "propertyCategoriesEdit";
pub const PROPERTY_CATEGORIES_DELETE: &str = "propertyCategoriesDelete";
pub const ROLES_VIEW: &str = "rolesView";
pub const ROLES_CREATE: &str = "rolesCreate";
pub const ROLES_EDIT: &str = "rolesEdit";
pub const ROLES_DELETE: &str = "rolesDelete";
pub const ROLES_PERMISSIONS: &str = "rolesPermissions";
pub const ADMIN_ACCOUNTS_VIEW: &str = "administratorAccountsView";
pub const ADMIN_ACCOUNTS_CREATE: &str = "administratorAccountsCreate";
pub const ADMIN_ACCOUNTS_EDIT: &str = "administratorAccountsEdit";
pub const ADMIN_ACCOUNTS_DELETE: &str = "administratorAccountsDelete";
pub const CLIENT_ACCOUNTS_VIEW: &str = "clientAccountsView";
pub const CLIENT_ACCOUNTS_EDIT: &str = "clientAccountsEdit";
pub const CLIENT_ACCOUNTS_DELETE: &str = "clientAccountsDelete";

/// Every permission key a role can grant.
pub const PERMISSION_KEYS: &[&str] = &[
    PROPERTIES_VIEW,
    PROPERTIES_CREATE,
    PROPERTIES_EDIT,
    PROPERTIES_DELETE,
    PROPERTY_CATEGORIES_VIEW,
    PROPERTY_CATEGORIES_CREATE,
    PROPERTY_CATEGORIES_EDIT,
    PROPERTY_CATEGORIES_DELETE,
    ROLES_VIEW,
    ROLES_CREATE,
    ROLES_EDIT,
    ROLES_DELETE,
    ROLES_PERMISSIONS,
    ADMIN_ACCOUNTS_VIEW,
    ADMIN_ACCOUNTS_CREATE,
    ADMIN_ACCOUNTS_EDIT,
    ADMIN_ACCOUNTS_DELETE,
    CLIENT_ACCOUNTS_VIEW,
    CLIENT_ACCOUNTS_EDIT,
    CLIENT_ACCOUNTS_DELETE,
];

pub fn is_known_key(key: &str) -> bool {
    PERMISSION_KEYS.contains(&key)
}

/// Mapping from permission key to allowed/denied.
///
/// Serialized as a flat JSON object, e.g. `{"propertiesEdit": true}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeMap<String, bool>);

impl PermissionSet {
    /// Derive the full catalogue mapping from the keys a role grants.
    /// Unknown granted keys are ignored.
    pub fn from_granted<S: AsRef<str>>(granted: &[S]) -> Self {
        let map = PERMISSION_KEYS
            .iter()
            .map(|key| {
                let allowed = granted.iter().any(|g| g.as_ref() == *key);
                (key.to_string(), allowed)
            })
            .collect();
        Self(map)
    }

    /// Set with every catalogued key denied.
    pub fn deny_all() -> Self {
        Self::from_granted::<&str>(&[])
    }

    pub fn allows(&self, key: &str) -> bool {
        self.0.get(key).copied().unwrap_or(false)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn granted(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, allowed)| **allowed)
            .map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, bool)> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = (String, bool)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
