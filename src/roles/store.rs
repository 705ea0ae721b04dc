//! Role Storage
//! Mission: Persist roles and derive permission sets from them

use crate::roles::permissions::{is_known_key, PermissionSet, PERMISSION_KEYS};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

pub const SUPER_ADMIN_TITLE: &str = "Super Admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    #[serde(skip_serializing)]
    pub deleted: bool,
    pub created_at: String,
}

impl Role {
    pub fn permission_set(&self) -> PermissionSet {
        PermissionSet::from_granted(&self.permissions)
    }
}

/// Role storage sharing the account database file
pub struct RoleStore {
    db_path: String,
}

impl RoleStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open role database at {}", self.db_path))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;
        Ok(conn)
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS roles (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                permissions TEXT NOT NULL DEFAULT '[]',
                deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Insert a role. Unknown permission keys are dropped.
    pub fn create_role(
        &self,
        title: &str,
        description: Option<&str>,
        permissions: &[String],
    ) -> Result<Role> {
        let role = Role {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: description.map(str::to_string),
            permissions: sanitize(permissions),
            deleted: false,
            created_at: Utc::now().to_rfc3339(),
        };

        let encoded =
            serde_json::to_string(&role.permissions).context("Failed to encode permissions")?;
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO roles (id, title, description, permissions, deleted, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![
                role.id.to_string(),
                role.title,
                role.description,
                encoded,
                role.created_at,
            ],
        )
        .context("Failed to insert role")?;

        info!(role_id = %role.id, title = %role.title, "Created role");
        Ok(role)
    }

    pub fn get(&self, id: &Uuid) -> Result<Option<Role>> {
        let conn = self.connect()?;
        let role = conn
            .query_row(
                "SELECT id, title, description, permissions, deleted, created_at
                 FROM roles WHERE id = ?1 AND deleted = 0",
                params![id.to_string()],
                row_to_role,
            )
            .optional()?;
        Ok(role)
    }

    pub fn list(&self) -> Result<Vec<Role>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, description, permissions, deleted, created_at
             FROM roles WHERE deleted = 0 ORDER BY created_at",
        )?;
        let roles = stmt
            .query_map([], row_to_role)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(roles)
    }

    /// Replace the granted permissions. Returns false when the role does not exist.
    pub fn set_permissions(&self, id: &Uuid, permissions: &[String]) -> Result<bool> {
        let encoded =
            serde_json::to_string(&sanitize(permissions)).context("Failed to encode permissions")?;
        let conn = self.connect()?;
        let rows = conn.execute(
            "UPDATE roles SET permissions = ?1 WHERE id = ?2 AND deleted = 0",
            params![encoded, id.to_string()],
        )?;
        Ok(rows > 0)
    }

    /// Permission set for an optional role reference; a missing role grants nothing.
    pub fn permissions_for(&self, role_id: Option<&Uuid>) -> Result<PermissionSet> {
        let Some(role_id) = role_id else {
            return Ok(PermissionSet::deny_all());
        };
        Ok(self
            .get(role_id)?
            .map(|role| role.permission_set())
            .unwrap_or_else(PermissionSet::deny_all))
    }

    /// Return the "Super Admin" role, creating it with every catalogued key if missing.
    pub fn ensure_super_admin(&self) -> Result<Role> {
        if let Some(existing) = self
            .list()?
            .into_iter()
            .find(|r| r.title == SUPER_ADMIN_TITLE)
        {
            return Ok(existing);
        }

        let all: Vec<String> = PERMISSION_KEYS.iter().map(|k| k.to_string()).collect();
        self.create_role(SUPER_ADMIN_TITLE, Some("Full access"), &all)
    }
}

fn sanitize(permissions: &[String]) -> Vec<String> {
    let mut out: Vec<String> = permissions
        .iter()
        .filter(|p| is_known_key(p))
        .cloned()
        .collect();
    out.sort();
    out.dedup();
    out
}

fn row_to_role(row: &Row<'_>) -> rusqlite::Result<Role> {
    let id: String = row.get(0)?;
    let permissions: String = row.get(3)?;
    let deleted: i64 = row.get(4)?;

    Ok(Role {
        id: Uuid::parse_str(&id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        title: row.get(1)?,
        description: row.get(2)?,
        permissions: serde_json::from_str(&permissions).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        deleted: deleted != 0,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::permissions::{PROPERTIES_EDIT, ROLES_VIEW};
    use tempfile::NamedTempFile;

    fn create_test_store() -> (RoleStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let store = RoleStore::new(temp_file.path().to_str().unwrap()).unwrap();
        (store, temp_file)
    }

    #[test]
    fn test_create_role_drops_unknown_keys() {
        let (store, _temp) = create_test_store();
        let role = store
            .create_role(
                "Editor",
                None,
                &[PROPERTIES_EDIT.to_string(), "launchRockets".to_string()],
            )
            .unwrap();

        assert_eq!(role.permissions, vec![PROPERTIES_EDIT.to_string()]);
        let loaded = store.get(&role.id).unwrap().unwrap();
        assert!(loaded.permission_set().allows(PROPERTIES_EDIT));
        assert!(!loaded.permission_set().allows(ROLES_VIEW));
    }

    #[test]
    fn test_permissions_for_missing_role_denies_everything() {
        let (store, _temp) = create_test_store();
        let set = store.permissions_for(None).unwrap();
        assert!(set.granted().next().is_none());

        let set = store.permissions_for(Some(&Uuid::new_v4())).unwrap();
        assert!(set.granted().next().is_none());
    }

    #[test]
    fn test_set_permissions_replaces_grants() {
        let (store, _temp) = create_test_store();
        let role = store
            .create_role("Editor", None, &[PROPERTIES_EDIT.to_string()])
            .unwrap();

        assert!(store
            .set_permissions(&role.id, &[ROLES_VIEW.to_string()])
            .unwrap());
        let set = store.permissions_for(Some(&role.id)).unwrap();
        assert!(set.allows(ROLES_VIEW));
        assert!(!set.allows(PROPERTIES_EDIT));

        assert!(!store.set_permissions(&Uuid::new_v4(), &[]).unwrap());
    }

    #[test]
    fn test_ensure_super_admin_is_idempotent() {
        let (store, _temp) = create_test_store();
        let first = store.ensure_super_admin().unwrap();
        let second = store.ensure_super_admin().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(first.permissions.len(), PERMISSION_KEYS.len());
    }
}
