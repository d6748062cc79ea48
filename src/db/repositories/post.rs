//! Blog post repository
//!
//! Posts, their author links and their cover images. Rows in `blog_posts`
//! are never removed; [`PostRepository::mark_deleted`] flips the soft-delete
//! flag and [`PostRepository::list_visible`] filters on it.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{BlogPost, BlogPostCover, CreatePostInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Blog post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert a new post
    async fn create(&self, input: &CreatePostInput) -> Result<BlogPost>;

    /// Get a post by ID, including soft-deleted ones
    async fn get_by_id(&self, id: i64) -> Result<Option<BlogPost>>;

    /// All posts that are not soft-deleted, newest ID first
    async fn list_visible(&self) -> Result<Vec<BlogPost>>;

    /// Persist the editable columns of a post
    async fn update(&self, post: &BlogPost) -> Result<BlogPost>;

    /// Set the soft-delete flag. Returns whether a row with this ID exists.
    async fn mark_deleted(&self, id: i64) -> Result<bool>;

    /// Replace the author set of a post
    async fn set_authors(&self, post_id: i64, user_ids: &[i64]) -> Result<()>;

    /// Author IDs of a post in ascending order
    async fn get_author_ids(&self, post_id: i64) -> Result<Vec<i64>>;

    /// Attach a cover image to a post
    async fn add_cover(&self, post_id: i64, image: &str) -> Result<BlogPostCover>;

    /// Covers of a post, oldest first
    async fn list_covers(&self, post_id: i64) -> Result<Vec<BlogPostCover>>;
}

/// SQLx-based post repository for SQLite and MySQL
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a shared repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

const POST_COLUMNS: &str = "id, title, text, is_active, document, category_id, deleted, \
                            created_by, created_at, updated_at";

const INSERT_POST: &str = r#"
    INSERT INTO blog_posts
        (title, text, is_active, document, category_id, deleted, created_by, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_POST: &str = r#"
    UPDATE blog_posts
    SET title = ?, text = ?, is_active = ?, document = ?, category_id = ?, updated_at = ?
    WHERE id = ?
"#;

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, input: &CreatePostInput) -> Result<BlogPost> {
        let now = Utc::now();

        let id = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(INSERT_POST)
                .bind(&input.title)
                .bind(&input.text)
                .bind(input.is_active)
                .bind(&input.document)
                .bind(input.category_id)
                .bind(false)
                .bind(input.created_by)
                .bind(now)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_rowid()),
            Backend::Mysql(p) => sqlx::query(INSERT_POST)
                .bind(&input.title)
                .bind(&input.text)
                .bind(input.is_active)
                .bind(&input.document)
                .bind(input.category_id)
                .bind(false)
                .bind(input.created_by)
                .bind(now)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create blog post")?;

        Ok(BlogPost {
            id,
            title: input.title.clone(),
            text: input.text.clone(),
            is_active: input.is_active,
            document: input.document.clone(),
            category_id: input.category_id,
            deleted: false,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<BlogPost>> {
        let query = format!("SELECT {} FROM blog_posts WHERE id = ?", POST_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_as::<_, BlogPost>(&query).bind(id).fetch_optional(p).await
            }
            Backend::Mysql(p) => {
                sqlx::query_as::<_, BlogPost>(&query).bind(id).fetch_optional(p).await
            }
        }
        .context("Failed to get blog post by ID")
    }

    async fn list_visible(&self) -> Result<Vec<BlogPost>> {
        let query = format!(
            "SELECT {} FROM blog_posts WHERE deleted = ? ORDER BY id DESC",
            POST_COLUMNS
        );
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_as::<_, BlogPost>(&query).bind(false).fetch_all(p).await
            }
            Backend::Mysql(p) => {
                sqlx::query_as::<_, BlogPost>(&query).bind(false).fetch_all(p).await
            }
        }
        .context("Failed to list blog posts")
    }

    async fn update(&self, post: &BlogPost) -> Result<BlogPost> {
        let now = Utc::now();
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(UPDATE_POST)
                .bind(&post.title)
                .bind(&post.text)
                .bind(post.is_active)
                .bind(&post.document)
                .bind(post.category_id)
                .bind(now)
                .bind(post.id)
                .execute(p)
                .await
                .map(|_| ()),
            Backend::Mysql(p) => sqlx::query(UPDATE_POST)
                .bind(&post.title)
                .bind(&post.text)
                .bind(post.is_active)
                .bind(&post.document)
                .bind(post.category_id)
                .bind(now)
                .bind(post.id)
                .execute(p)
                .await
                .map(|_| ()),
        }
        .with_context(|| format!("Failed to update blog post {}", post.id))?;

        Ok(BlogPost {
            updated_at: now,
            ..post.clone()
        })
    }

    async fn mark_deleted(&self, id: i64) -> Result<bool> {
        // Updating with the unchanged value still counts as a match on SQLite
        // but not on MySQL, so existence is checked separately there.
        let query = "UPDATE blog_posts SET deleted = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let result = sqlx::query(query)
                    .bind(true)
                    .bind(id)
                    .execute(p)
                    .await
                    .context("Failed to mark blog post deleted")?;
                Ok(result.rows_affected() > 0)
            }
            Backend::Mysql(p) => {
                sqlx::query(query)
                    .bind(true)
                    .bind(id)
                    .execute(p)
                    .await
                    .context("Failed to mark blog post deleted")?;
                let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM blog_posts WHERE id = ?")
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to check blog post")?;
                Ok(exists.is_some())
            }
        }
    }

    async fn set_authors(&self, post_id: i64, user_ids: &[i64]) -> Result<()> {
        let delete = "DELETE FROM blog_post_authors WHERE blog_post_id = ?";
        let insert = "INSERT INTO blog_post_authors (blog_post_id, user_id) VALUES (?, ?)";

        let mut ids = user_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let mut tx = p.begin().await.context("Failed to begin transaction")?;
                sqlx::query(delete).bind(post_id).execute(&mut *tx).await?;
                for user_id in &ids {
                    sqlx::query(insert)
                        .bind(post_id)
                        .bind(*user_id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to link author")?;
                }
                tx.commit().await.context("Failed to commit authors")?;
            }
            Backend::Mysql(p) => {
                let mut tx = p.begin().await.context("Failed to begin transaction")?;
                sqlx::query(delete).bind(post_id).execute(&mut *tx).await?;
                for user_id in &ids {
                    sqlx::query(insert)
                        .bind(post_id)
                        .bind(*user_id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to link author")?;
                }
                tx.commit().await.context("Failed to commit authors")?;
            }
        }
        Ok(())
    }

    async fn get_author_ids(&self, post_id: i64) -> Result<Vec<i64>> {
        let query = "SELECT user_id FROM blog_post_authors WHERE blog_post_id = ? ORDER BY user_id";
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_scalar::<_, i64>(query).bind(post_id).fetch_all(p).await,
            Backend::Mysql(p) => sqlx::query_scalar::<_, i64>(query).bind(post_id).fetch_all(p).await,
        }
        .context("Failed to get post authors")
    }

    async fn add_cover(&self, post_id: i64, image: &str) -> Result<BlogPostCover> {
        let query = "INSERT INTO blog_post_covers (blog_post_id, image, created_at) VALUES (?, ?, ?)";
        let now = Utc::now();

        let id = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(query)
                .bind(post_id)
                .bind(image)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_rowid()),
            Backend::Mysql(p) => sqlx::query(query)
                .bind(post_id)
                .bind(image)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to add blog post cover")?;

        Ok(BlogPostCover {
            id,
            blog_post_id: post_id,
            image: image.to_string(),
            created_at: now,
        })
    }

    async fn list_covers(&self, post_id: i64) -> Result<Vec<BlogPostCover>> {
        let query = "SELECT id, blog_post_id, image, created_at FROM blog_post_covers \
                     WHERE blog_post_id = ? ORDER BY id";
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_as::<_, BlogPostCover>(query).bind(post_id).fetch_all(p).await
            }
            Backend::Mysql(p) => {
                sqlx::query_as::<_, BlogPostCover>(query).bind(post_id).fetch_all(p).await
            }
        }
        .context("Failed to list blog post covers")
    }
}
