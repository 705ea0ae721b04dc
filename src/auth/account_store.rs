//! Account Storage
//! Mission: Store admin and client accounts in SQLite with soft-delete semantics

use crate::auth::models::{Account, AccountKind, AccountStatus, NewAccount};
use anyhow::{Context, Result};
use bcrypt::{hash, verify};
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str = "id, kind, full_name, email, phone, avatar, password_hash, role_id, \
     status, refresh_token, favorite_posts, deleted, created_at, updated_at";

/// Requested change to an account's avatar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvatarChange {
    Keep,
    Set(String),
    Unset,
}

/// Partial profile update; `None` fields are left untouched
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub avatar: AvatarChange,
}

/// Writers wait this long for a competing write lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum CreateAccountError {
    /// A live account of the same kind already uses the email
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Account storage with SQLite backend. Deleted rows are invisible to every lookup.
pub struct AccountStore {
    db_path: String,
    bcrypt_cost: u32,
}

impl AccountStore {
    /// Create a new account store and initialize database
    pub fn new(db_path: &str, bcrypt_cost: u32) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
            bcrypt_cost,
        };
        store.init_db()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open account database at {}", self.db_path))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set busy timeout")?;
        Ok(conn)
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.connect()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                full_name TEXT NOT NULL,
                email TEXT NOT NULL,
                phone TEXT,
                avatar TEXT,
                password_hash TEXT NOT NULL,
                role_id TEXT,
                status TEXT NOT NULL,
                refresh_token TEXT,
                favorite_posts TEXT NOT NULL DEFAULT '[]',
                deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // One live account per (kind, email); soft-deleted rows free the email again
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_live_kind_email
             ON accounts (kind, email) WHERE deleted = 0",
            [],
        )?;

        Ok(())
    }

    /// Hash the password and insert a new account.
    ///
    /// The unique index decides races between concurrent registrations of one email.
    pub fn create_account(&self, new: &NewAccount) -> Result<Account, CreateAccountError> {
        let password_hash =
            hash(&new.password, self.bcrypt_cost).context("Failed to hash password")?;
        let now = Utc::now().to_rfc3339();

        let account = Account {
            id: Uuid::new_v4(),
            kind: new.kind,
            full_name: new.full_name.clone(),
            email: new.email.trim().to_lowercase(),
            phone: new.phone.clone(),
            avatar: new.avatar.clone(),
            password_hash,
            role_id: if new.kind == AccountKind::Admin {
                new.role_id
            } else {
                None
            },
            status: new.status,
            refresh_token: None,
            favorite_posts: Vec::new(),
            deleted: false,
            created_at: now.clone(),
            updated_at: now,
        };

        let conn = self.connect()?;
        let inserted = conn.execute(
            "INSERT INTO accounts (id, kind, full_name, email, phone, avatar, password_hash,
                role_id, status, refresh_token, favorite_posts, deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, '[]', 0, ?10, ?11)",
            params![
                account.id.to_string(),
                account.kind.as_str(),
                account.full_name,
                account.email,
                account.phone,
                account.avatar,
                account.password_hash,
                account.role_id.map(|id| id.to_string()),
                account.status.as_str(),
                account.created_at,
                account.updated_at,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(CreateAccountError::DuplicateEmail);
            }
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to insert account").into()),
        }

        info!(
            account_id = %account.id,
            kind = account.kind.as_str(),
            "Created account"
        );

        Ok(account)
    }

    /// Look up a live account by email within one account kind
    pub fn find_by_email(&self, kind: AccountKind, email: &str) -> Result<Option<Account>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             WHERE kind = ?1 AND email = ?2 AND deleted = 0"
        );
        let account = conn
            .query_row(
                &sql,
                params![kind.as_str(), email.trim().to_lowercase()],
                row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    /// Look up a live account by id
    pub fn get_by_id(&self, id: &Uuid) -> Result<Option<Account>> {
        let conn = self.connect()?;
        load_live(&conn, id)
    }

    /// List live accounts of one kind, newest first
    pub fn list(&self, kind: AccountKind) -> Result<Vec<Account>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             WHERE kind = ?1 AND deleted = 0 ORDER BY created_at DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let accounts = stmt
            .query_map(params![kind.as_str()], row_to_account)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    pub fn verify_password(&self, account: &Account, password: &str) -> Result<bool> {
        verify(password, &account.password_hash).context("Failed to verify password")
    }

    pub fn set_refresh_token(&self, id: &Uuid, token: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE accounts SET refresh_token = ?1, updated_at = ?2 WHERE id = ?3 AND deleted = 0",
            params![token, Utc::now().to_rfc3339(), id.to_string()],
        )
        .context("Failed to store refresh token")?;
        Ok(())
    }

    /// Returns false when no live account matched
    pub fn set_status(&self, id: &Uuid, status: AccountStatus) -> Result<bool> {
        let conn = self.connect()?;
        let rows = conn.execute(
            "UPDATE accounts SET status = ?1, updated_at = ?2 WHERE id = ?3 AND deleted = 0",
            params![status.as_str(), Utc::now().to_rfc3339(), id.to_string()],
        )?;

        if rows > 0 {
            info!(account_id = %id, status = status.as_str(), "Account status changed");
        }
        Ok(rows > 0)
    }

    /// Flag the account as deleted; the row is kept. Returns false when nothing matched.
    pub fn soft_delete(&self, id: &Uuid) -> Result<bool> {
        let conn = self.connect()?;
        let rows = conn.execute(
            "UPDATE accounts SET deleted = 1, updated_at = ?1 WHERE id = ?2 AND deleted = 0",
            params![Utc::now().to_rfc3339(), id.to_string()],
        )?;

        if rows > 0 {
            info!(account_id = %id, "Account soft-deleted");
        }
        Ok(rows > 0)
    }

    /// Returns false when no live account matched
    pub fn update_profile(&self, id: &Uuid, update: &ProfileUpdate) -> Result<bool> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(mut account) = load_live(&tx, id)? else {
            return Ok(false);
        };

        if let Some(full_name) = &update.full_name {
            account.full_name = full_name.clone();
        }
        if let Some(phone) = &update.phone {
            account.phone = Some(phone.clone());
        }
        match &update.avatar {
            AvatarChange::Keep => {}
            AvatarChange::Set(url) => account.avatar = Some(url.clone()),
            AvatarChange::Unset => account.avatar = None,
        }

        let rows = tx.execute(
            "UPDATE accounts SET full_name = ?1, phone = ?2, avatar = ?3, updated_at = ?4
             WHERE id = ?5 AND deleted = 0",
            params![
                account.full_name,
                account.phone,
                account.avatar,
                Utc::now().to_rfc3339(),
                id.to_string(),
            ],
        )?;
        tx.commit().context("Failed to commit profile update")?;
        Ok(rows > 0)
    }

    /// Add the post to the favourites, or remove it when already present.
    /// Returns `Some(true)` when added, `Some(false)` when removed, `None` for no account.
    pub fn toggle_favorite(&self, id: &Uuid, post_id: &str) -> Result<Option<bool>> {
        let mut conn = self.connect()?;
        // Immediate: the write lock is taken before the list is read
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(mut account) = load_live(&tx, id)? else {
            return Ok(None);
        };

        let added = if let Some(pos) = account.favorite_posts.iter().position(|p| p == post_id) {
            account.favorite_posts.remove(pos);
            false
        } else {
            account.favorite_posts.push(post_id.to_string());
            true
        };

        let encoded = serde_json::to_string(&account.favorite_posts)
            .context("Failed to encode favourite posts")?;
        tx.execute(
            "UPDATE accounts SET favorite_posts = ?1, updated_at = ?2 WHERE id = ?3",
            params![encoded, Utc::now().to_rfc3339(), id.to_string()],
        )?;
        tx.commit().context("Failed to commit favourite toggle")?;

        Ok(Some(added))
    }

    pub fn count(&self, kind: AccountKind) -> Result<i64> {
        let conn = self.connect()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM accounts WHERE kind = ?1 AND deleted = 0",
            params![kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn load_live(conn: &Connection, id: &Uuid) -> Result<Option<Account>> {
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1 AND deleted = 0");
    let account = conn
        .query_row(&sql, params![id.to_string()], row_to_account)
        .optional()?;
    Ok(account)
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn row_to_account(row: &Row<'_>) -> rusqlite::Result<Account> {
    let id: String = row.get(0)?;
    let kind: String = row.get(1)?;
    let role_id: Option<String> = row.get(7)?;
    let status: String = row.get(8)?;
    let favorite_posts: String = row.get(10)?;
    let deleted: i64 = row.get(11)?;

    Ok(Account {
        id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
        kind: AccountKind::parse(&kind).unwrap_or(AccountKind::Client),
        full_name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        avatar: row.get(5)?,
        password_hash: row.get(6)?,
        role_id: role_id
            .map(|r| Uuid::parse_str(&r))
            .transpose()
            .map_err(|e| conversion_error(7, e))?,
        status: AccountStatus::parse(&status).unwrap_or(AccountStatus::Inactive),
        refresh_token: row.get(9)?,
        favorite_posts: serde_json::from_str(&favorite_posts)
            .map_err(|e| conversion_error(10, e))?,
        deleted: deleted != 0,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (AccountStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let store = AccountStore::new(db_path, 4).unwrap();
        (store, temp_file)
    }

    fn new_client(email: &str) -> NewAccount {
        NewAccount {
            kind: AccountKind::Client,
            full_name: "Client".to_string(),
            email: email.to_string(),
            password: "password123".to_string(),
            phone: None,
            avatar: None,
            role_id: Some(Uuid::new_v4()),
            status: AccountStatus::Active,
        }
    }

    #[test]
    fn test_create_and_find_by_email() {
        let (store, _temp) = create_test_store();
        let created = store.create_account(&new_client("Buyer@Example.com")).unwrap();

        // Clients never carry a role
        assert!(created.role_id.is_none());

        let found = store
            .find_by_email(AccountKind::Client, "buyer@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert!(store.verify_password(&found, "password123").unwrap());
        assert!(!store.verify_password(&found, "wrong").unwrap());

        // Kinds are separate namespaces
        assert!(store
            .find_by_email(AccountKind::Admin, "buyer@example.com")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_soft_deleted_accounts_are_invisible() {
        let (store, _temp) = create_test_store();
        let account = store.create_account(&new_client("gone@example.com")).unwrap();

        assert!(store.soft_delete(&account.id).unwrap());
        assert!(store.get_by_id(&account.id).unwrap().is_none());
        assert!(store
            .find_by_email(AccountKind::Client, "gone@example.com")
            .unwrap()
            .is_none());
        assert!(store.list(AccountKind::Client).unwrap().is_empty());

        // Second delete and status change find nothing
        assert!(!store.soft_delete(&account.id).unwrap());
        assert!(!store.set_status(&account.id, AccountStatus::Active).unwrap());
    }

    #[test]
    fn test_refresh_token_and_status_updates() {
        let (store, _temp) = create_test_store();
        let account = store.create_account(&new_client("a@example.com")).unwrap();
        assert!(account.refresh_token.is_none());

        store.set_refresh_token(&account.id, "stable-token").unwrap();
        assert!(store.set_status(&account.id, AccountStatus::Inactive).unwrap());

        let reloaded = store.get_by_id(&account.id).unwrap().unwrap();
        assert_eq!(reloaded.refresh_token.as_deref(), Some("stable-token"));
        assert_eq!(reloaded.status, AccountStatus::Inactive);
    }

    #[test]
    fn test_update_profile_sets_and_unsets_avatar() {
        let (store, _temp) = create_test_store();
        let account = store.create_account(&new_client("p@example.com")).unwrap();

        let set = ProfileUpdate {
            full_name: Some("New Name".to_string()),
            phone: None,
            avatar: AvatarChange::Set("https://cdn.example.com/a.png".to_string()),
        };
        assert!(store.update_profile(&account.id, &set).unwrap());
        let reloaded = store.get_by_id(&account.id).unwrap().unwrap();
        assert_eq!(reloaded.full_name, "New Name");
        assert_eq!(reloaded.avatar.as_deref(), Some("https://cdn.example.com/a.png"));

        let unset = ProfileUpdate {
            full_name: None,
            phone: Some("0900".to_string()),
            avatar: AvatarChange::Unset,
        };
        assert!(store.update_profile(&account.id, &unset).unwrap());
        let reloaded = store.get_by_id(&account.id).unwrap().unwrap();
        assert_eq!(reloaded.full_name, "New Name");
        assert_eq!(reloaded.phone.as_deref(), Some("0900"));
        assert!(reloaded.avatar.is_none());

        assert!(!store.update_profile(&Uuid::new_v4(), &unset).unwrap());
    }

    #[test]
    fn test_toggle_favorite() {
        let (store, _temp) = create_test_store();
        let account = store.create_account(&new_client("f@example.com")).unwrap();

        assert_eq!(store.toggle_favorite(&account.id, "post-1").unwrap(), Some(true));
        assert_eq!(store.toggle_favorite(&account.id, "post-2").unwrap(), Some(true));
        assert_eq!(store.toggle_favorite(&account.id, "post-1").unwrap(), Some(false));

        let reloaded = store.get_by_id(&account.id).unwrap().unwrap();
        assert_eq!(reloaded.favorite_posts, vec!["post-2".to_string()]);

        assert_eq!(store.toggle_favorite(&Uuid::new_v4(), "post-1").unwrap(), None);
    }

    #[test]
    fn test_duplicate_email_rejected_until_deleted() {
        let (store, _temp) = create_test_store();
        let first = store.create_account(&new_client("dup@example.com")).unwrap();

        let again = store.create_account(&new_client("DUP@example.com"));
        assert!(matches!(again, Err(CreateAccountError::DuplicateEmail)));

        // Same email under the other kind is a separate account
        let mut admin = new_client("dup@example.com");
        admin.kind = AccountKind::Admin;
        assert!(store.create_account(&admin).is_ok());

        assert!(store.soft_delete(&first.id).unwrap());
        assert!(store.create_account(&new_client("dup@example.com")).is_ok());
    }

    #[test]
    fn test_concurrent_creates_leave_one_account() {
        let (store, _temp) = create_test_store();
        let store = std::sync::Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.create_account(&new_client("race@example.com")))
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => created += 1,
                Err(CreateAccountError::DuplicateEmail) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.count(AccountKind::Client).unwrap(), 1);
    }

    #[test]
    fn test_concurrent_toggles_keep_every_post() {
        let (store, _temp) = create_test_store();
        let account = store.create_account(&new_client("fav@example.com")).unwrap();
        let store = std::sync::Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let id = account.id;
                std::thread::spawn(move || store.toggle_favorite(&id, &format!("post-{i}")))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), Some(true));
        }

        let mut favorites = store.get_by_id(&account.id).unwrap().unwrap().favorite_posts;
        favorites.sort();
        let mut expected: Vec<String> = (0..8).map(|i| format!("post-{i}")).collect();
        expected.sort();
        assert_eq!(favorites, expected);
    }
}
