//! Category repository

use crate::db::{Backend, DynDatabasePool};
use crate::models::Category;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Create a new category
    async fn create(&self, name: &str) -> Result<Category>;

    /// Get category by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    /// List all categories ordered by name
    async fn list(&self) -> Result<Vec<Category>>;
}

/// SQLx-based category repository for SQLite and MySQL
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a shared repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, name: &str) -> Result<Category> {
        let query = "INSERT INTO categories (name, created_at) VALUES (?, ?)";
        let now = Utc::now();

        let id = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(query)
                .bind(name)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_rowid()),
            Backend::Mysql(p) => sqlx::query(query)
                .bind(name)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .with_context(|| format!("Failed to create category: {}", name))?;

        Ok(Category {
            id,
            name: name.to_string(),
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let query = "SELECT id, name, created_at FROM categories WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_as::<_, Category>(query).bind(id).fetch_optional(p).await
            }
            Backend::Mysql(p) => {
                sqlx::query_as::<_, Category>(query).bind(id).fetch_optional(p).await
            }
        }
        .context("Failed to get category by ID")
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let query = "SELECT id, name, created_at FROM categories ORDER BY name";
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, Category>(query).fetch_all(p).await,
            Backend::Mysql(p) => sqlx::query_as::<_, Category>(query).fetch_all(p).await,
        }
        .context("Failed to list categories")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxCategoryRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxCategoryRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = setup_test_repo().await;

        let created = repo.create("Rust").await.unwrap();
        let found = repo.get_by_id(created.id).await.unwrap().unwrap();

        assert_eq!(found.name, "Rust");
        assert!(repo.get_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_includes_seeded_category() {
        let repo = setup_test_repo().await;
        repo.create("Announcements").await.unwrap();

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Announcements".to_string(), "General".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_name_fails() {
        let repo = setup_test_repo().await;
        assert!(repo.create("General").await.is_err());
    }
}
