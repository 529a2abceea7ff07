//! User directory: accounts, roles and per-user meta.
//!
//! Only what the access gate and the reports need is kept here. Removing a
//! user's download history is the job of
//! [`FileLibrary::delete_user`](crate::FileLibrary::delete_user).

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{Result, StoreError};
use crate::helpers::sanitize_key;

/// User id recorded for anonymous visitors.
pub const GUEST_USER_ID: i64 = 0;

/// Role that sees admin-only errors and may export reports.
pub const ADMIN_ROLE: &str = "administrator";

/// Roles allowed to bulk edit file requirements.
const EDITOR_ROLES: [&str; 2] = [ADMIN_ROLE, "editor"];

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    id: i64,
    login: String,
    email: String,
    display_name: String,
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<String>,
}

impl User {
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Input for [`Users::create`].
#[derive(Debug, Clone, Default)]
pub struct NewUser<'a> {
    pub login: &'a str,
    pub email: &'a str,
    pub display_name: &'a str,
    pub roles: &'a [String],
}

/// Who is making a request: a user id (0 for guests), their roles and address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requester {
    pub user_id: i64,
    pub roles: Vec<String>,
    pub ip: Option<String>,
}

impl Requester {
    /// Anonymous visitor.
    #[must_use]
    pub fn guest(ip: Option<String>) -> Self {
        Self {
            user_id: GUEST_USER_ID,
            roles: Vec::new(),
            ip,
        }
    }

    /// Logged-in user.
    #[must_use]
    pub fn for_user(user: &User, ip: Option<String>) -> Self {
        Self {
            user_id: user.id,
            roles: user.roles.clone(),
            ip,
        }
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.user_id != GUEST_USER_ID
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == ADMIN_ROLE)
    }

    #[must_use]
    pub fn can_edit_files(&self) -> bool {
        self.roles.iter().any(|r| EDITOR_ROLES.contains(&r.as_str()))
    }
}

/// User store.
#[derive(Debug, Clone)]
pub struct Users {
    db: Database,
}

impl Users {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Registers a user and its roles.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for a blank login or email, or
    /// [`StoreError::Database`] (constraint violation) for duplicates.
    #[instrument(skip(self, user), fields(login = %user.login))]
    pub async fn create(&self, user: &NewUser<'_>) -> Result<i64> {
        let login = user.login.trim();
        let email = user.email.trim();
        if login.is_empty() {
            return Err(StoreError::invalid("login", login, "must not be empty"));
        }
        if !email.contains('@') {
            return Err(StoreError::invalid("email", email, "must be an email address"));
        }
        let display_name = if user.display_name.trim().is_empty() {
            login
        } else {
            user.display_name.trim()
        };

        let mut tx = self.db.pool().begin().await?;
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO users (login, email, display_name) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(login)
        .bind(email)
        .bind(display_name)
        .fetch_one(&mut *tx)
        .await?;

        for role in user.roles {
            let role = sanitize_key(role);
            if role.is_empty() {
                continue;
            }
            sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role) VALUES (?, ?)")
                .bind(id)
                .bind(&role)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(id, "user created");
        Ok(id)
    }

    /// Fetches a user with roles.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn get(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, login, email, display_name FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;
        self.attach_roles(row).await
    }

    /// Looks a user up by email address (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, login, email, display_name FROM users WHERE lower(email) = lower(?)",
        )
        .bind(email.trim())
        .fetch_optional(self.db.pool())
        .await?;
        self.attach_roles(row).await
    }

    /// Looks a user up by login name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn find_by_login(&self, login: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, login, email, display_name FROM users WHERE login = ?",
        )
        .bind(login.trim())
        .fetch_optional(self.db.pool())
        .await?;
        self.attach_roles(row).await
    }

    async fn attach_roles(&self, row: Option<UserRow>) -> Result<Option<User>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let roles = self.roles(row.id).await?;
        Ok(Some(User {
            id: row.id,
            login: row.login,
            email: row.email,
            display_name: row.display_name,
            roles,
        }))
    }

    /// Roles held by a user, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn roles(&self, id: i64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT role FROM user_roles WHERE user_id = ? ORDER BY role")
                .bind(id)
                .fetch_all(self.db.pool())
                .await?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    /// Sets a meta value for a user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserNotFound`] if the user does not exist.
    #[instrument(skip(self, value))]
    pub async fn set_meta(&self, id: i64, key: &str, value: &str) -> Result<()> {
        if self.get(id).await?.is_none() {
            return Err(StoreError::UserNotFound(id));
        }
        sqlx::query(
            r"INSERT INTO user_meta (user_id, meta_key, meta_value) VALUES (?, ?, ?)
              ON CONFLICT(user_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
        )
        .bind(id)
        .bind(key.trim())
        .bind(value)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Reads a meta value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn get_meta(&self, id: i64, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT meta_value FROM user_meta WHERE user_id = ? AND meta_key = ?",
        )
        .bind(id)
        .bind(key.trim())
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(|r| r.0))
    }

    /// Builds the requester for a user id; unknown or zero ids are guests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn requester(&self, user_id: i64, ip: Option<String>) -> Result<Requester> {
        if user_id == GUEST_USER_ID {
            return Ok(Requester::guest(ip));
        }
        Ok(match self.get(user_id).await? {
            Some(user) => Requester::for_user(&user, ip),
            None => Requester::guest(ip),
        })
    }

    /// Removes a user, its roles and meta.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserNotFound`] when nothing was deleted.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM user_meta WHERE user_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::UserNotFound(id));
        }
        tx.commit().await?;
        Ok(())
    }
}
