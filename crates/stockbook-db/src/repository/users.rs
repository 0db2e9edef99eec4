//! # User Directory
//!
//! Username / password / role lookup. Passwords are stored as argon2 PHC
//! strings; the plain password never reaches the database.

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use stockbook_core::Role;

/// A user as seen by callers. The password hash stays inside this module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    role: String,
}

impl UserRow {
    fn into_user(self) -> DbResult<User> {
        let role = self
            .role
            .parse()
            .map_err(|e| DbError::Internal(format!("user '{}': {}", self.username, e)))?;
        Ok(User {
            id: self.id,
            username: self.username,
            role,
        })
    }
}

fn hash_password(password: &str) -> DbResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| DbError::Internal(format!("Failed to hash password: {}", e)))?;

    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Repository for user accounts.
#[derive(Debug, Clone)]
pub struct UserDirectory {
    pool: SqlitePool,
}

impl UserDirectory {
    /// Creates a new UserDirectory.
    pub fn new(pool: SqlitePool) -> Self {
        UserDirectory { pool }
    }

    /// Creates a user.
    ///
    /// ## Returns
    /// * `Ok(User)` - The stored user
    /// * `Err(DbError::InvalidInput)` - Blank username or password
    /// * `Err(DbError::Constraint { kind: Unique, .. })` - Username taken
    pub async fn create_user(&self, username: &str, password: &str, role: Role) -> DbResult<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(DbError::InvalidInput("username must not be blank".to_string()));
        }
        if password.is_empty() {
            return Err(DbError::InvalidInput("password must not be blank".to_string()));
        }

        let password_hash = hash_password(password)?;

        let id = sqlx::query("INSERT INTO users (username, password_hash, role) VALUES (?1, ?2, ?3)")
            .bind(username)
            .bind(&password_hash)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        info!(username = %username, role = %role, "User created");

        Ok(User {
            id,
            username: username.to_string(),
            role,
        })
    }

    /// Checks a username / password pair.
    ///
    /// ## Returns
    /// * `Ok(Some(User))` - Credentials match
    /// * `Ok(None)` - Unknown user or wrong password (indistinguishable)
    pub async fn authenticate(&self, username: &str, password: &str) -> DbResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, password_hash, role FROM users WHERE username = ?1",
        )
        .bind(username.trim())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) if verify_password(password, &row.password_hash) => {
                debug!(username = %row.username, "Authenticated");
                row.into_user().map(Some)
            }
            _ => {
                warn!(username = %username, "Authentication failed");
                Ok(None)
            }
        }
    }

    /// Lists all users, ordered by username.
    pub async fn list_users(&self) -> DbResult<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, username, password_hash, role FROM users ORDER BY username",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserRow::into_user).collect()
    }

    /// Deletes a user by username.
    pub async fn delete_user(&self, username: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE username = ?1")
            .bind(username.trim())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", username));
        }

        info!(username = %username, "User deleted");
        Ok(())
    }
}
