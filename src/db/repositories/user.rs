//! User repository
//!
//! Database operations for registered users.

use crate::db::{Backend, DynDatabasePool};
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get users by ID, ordered by ID. Unknown IDs are skipped.
    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// List all users ordered by email
    async fn list(&self) -> Result<Vec<User>>;

    /// Replace the password hash of a user
    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()>;
}

/// SQLx-based user repository for SQLite and MySQL
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a shared repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

const USER_COLUMNS: &str =
    "id, email, full_name, password_hash, is_active, created_at, updated_at";

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let query = r#"
            INSERT INTO users (email, full_name, password_hash, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
        "#;
        let now = Utc::now();

        let id = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(query)
                .bind(&user.email)
                .bind(&user.full_name)
                .bind(&user.password_hash)
                .bind(user.is_active)
                .bind(now)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_rowid()),
            Backend::Mysql(p) => sqlx::query(query)
                .bind(&user.email)
                .bind(&user.full_name)
                .bind(&user.password_hash)
                .bind(user.is_active)
                .bind(now)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create user")?;

        Ok(User {
            id,
            created_at: now,
            updated_at: now,
            ..user.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, User>(&query).bind(id).fetch_optional(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, User>(&query).bind(id).fetch_optional(p).await,
        }
        .context("Failed to get user by ID")
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let query = format!(
            "SELECT {} FROM users WHERE id IN ({}) ORDER BY id",
            USER_COLUMNS, placeholders
        );

        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let mut q = sqlx::query_as::<_, User>(&query);
                for id in ids {
                    q = q.bind(*id);
                }
                q.fetch_all(p).await
            }
            Backend::Mysql(p) => {
                let mut q = sqlx::query_as::<_, User>(&query);
                for id in ids {
                    q = q.bind(*id);
                }
                q.fetch_all(p).await
            }
        }
        .context("Failed to get users by ID")
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_as::<_, User>(&query).bind(email).fetch_optional(p).await
            }
            Backend::Mysql(p) => {
                sqlx::query_as::<_, User>(&query).bind(email).fetch_optional(p).await
            }
        }
        .context("Failed to get user by email")
    }

    async fn list(&self) -> Result<Vec<User>> {
        let query = format!("SELECT {} FROM users ORDER BY email", USER_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, User>(&query).fetch_all(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, User>(&query).fetch_all(p).await,
        }
        .context("Failed to list users")
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        let query = "UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(query)
                .bind(password_hash)
                .bind(now)
                .bind(id)
                .execute(p)
                .await
                .map(|_| ()),
            Backend::Mysql(p) => sqlx::query(query)
                .bind(password_hash)
                .bind(now)
                .bind(id)
                .execute(p)
                .await
                .map(|_| ()),
        }
        .context("Failed to update user password")
    }
}
