//! Blog post service
//!
//! Sits between the post handlers and the repositories. Posts are soft
//! deleted: [`PostService::delete`] only sets the flag, and every read that
//! serves a page ignores flagged rows except the delete confirmation.

use crate::db::repositories::{CategoryRepository, PostRepository, UserRepository};
use crate::models::{BlogPost, Category, CreatePostInput, PostDetail, UpdatePostInput, User};
use crate::services::storage::{FileStorage, StorageError, UploadedFile, COVERS_FOLDER, DOCUMENTS_FOLDER};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Validated values for a new post
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub title: String,
    pub text: String,
    pub is_active: bool,
    pub category_id: Option<i64>,
    pub author_ids: Vec<i64>,
    pub document: Option<UploadedFile>,
    pub cover: Option<UploadedFile>,
    pub created_by: Option<i64>,
}

/// Validated changes to a post. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub text: Option<String>,
    pub is_active: Option<bool>,
    pub category_id: Option<Option<i64>>,
    pub document: Option<UploadedFile>,
}

/// IDs a post form may reference
#[derive(Debug, Clone, Default, Serialize)]
pub struct PostChoices {
    pub categories: Vec<Category>,
    pub authors: Vec<User>,
}

impl PostChoices {
    pub fn has_category(&self, id: i64) -> bool {
        self.categories.iter().any(|c| c.id == id)
    }

    pub fn has_author(&self, id: i64) -> bool {
        self.authors.iter().any(|u| u.id == id)
    }
}

pub struct PostService {
    posts: Arc<dyn PostRepository>,
    categories: Arc<dyn CategoryRepository>,
    users: Arc<dyn UserRepository>,
    storage: Arc<FileStorage>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        categories: Arc<dyn CategoryRepository>,
        users: Arc<dyn UserRepository>,
        storage: Arc<FileStorage>,
    ) -> Self {
        Self {
            posts,
            categories,
            users,
            storage,
        }
    }

    /// Posts that are not deleted, newest first
    pub async fn list(&self) -> Result<Vec<BlogPost>, PostServiceError> {
        Ok(self.posts.list_visible().await?)
    }

    /// A post that is not deleted
    pub async fn get(&self, id: i64) -> Result<Option<BlogPost>, PostServiceError> {
        Ok(self.posts.get_by_id(id).await?.filter(|p| !p.deleted))
    }

    /// A post whether or not it is deleted
    pub async fn get_any(&self, id: i64) -> Result<Option<BlogPost>, PostServiceError> {
        Ok(self.posts.get_by_id(id).await?)
    }

    /// A post with its category, authors and covers
    pub async fn get_detail(&self, id: i64) -> Result<Option<PostDetail>, PostServiceError> {
        let Some(post) = self.get(id).await? else {
            return Ok(None);
        };

        let category = match post.category_id {
            Some(category_id) => self.categories.get_by_id(category_id).await?,
            None => None,
        };
        let author_ids = self.posts.get_author_ids(post.id).await?;
        let authors = self.users.get_by_ids(&author_ids).await?;
        let covers = self.posts.list_covers(post.id).await?;

        Ok(Some(PostDetail {
            post,
            category,
            authors,
            covers,
        }))
    }

    /// Categories and users a post form can pick from
    pub async fn choices(&self) -> Result<PostChoices, PostServiceError> {
        Ok(PostChoices {
            categories: self.categories.list().await?,
            authors: self.users.list().await?,
        })
    }

    /// Create a post, its author links and, when an image was uploaded, its
    /// cover.
    ///
    /// The post row and the cover row are separate writes; a failure while
    /// storing the cover leaves the post in place without one.
    pub async fn create(&self, new: NewPost) -> Result<BlogPost, PostServiceError> {
        let document = match &new.document {
            Some(file) => Some(self.storage.save(DOCUMENTS_FOLDER, file).await?),
            None => None,
        };

        let created = self
            .posts
            .create(&CreatePostInput {
                title: new.title,
                text: new.text,
                is_active: new.is_active,
                document: document.clone(),
                category_id: new.category_id,
                created_by: new.created_by,
            })
            .await;
        let post = match created {
            Ok(post) => post,
            Err(e) => {
                // Nothing references the stored document
                if let Some(reference) = &document {
                    if let Err(cleanup) = self.storage.delete(reference).await {
                        tracing::warn!("Failed to remove orphaned upload {}: {}", reference, cleanup);
                    }
                }
                return Err(e.context("Failed to create post").into());
            }
        };

        if !new.author_ids.is_empty() {
            self.posts.set_authors(post.id, &new.author_ids).await?;
        }

        if let Some(cover) = &new.cover {
            let image = self.storage.save(COVERS_FOLDER, cover).await?;
            self.posts.add_cover(post.id, &image).await?;
        }

        tracing::info!(post_id = post.id, title = %post.title, "Post created");
        Ok(post)
    }

    /// Apply changes to a post that is not deleted.
    ///
    /// Returns `None` when there is no such post.
    pub async fn update(
        &self,
        id: i64,
        changes: PostChanges,
    ) -> Result<Option<BlogPost>, PostServiceError> {
        let Some(mut post) = self.get(id).await? else {
            return Ok(None);
        };

        let document = match &changes.document {
            Some(file) => Some(Some(self.storage.save(DOCUMENTS_FOLDER, file).await?)),
            None => None,
        };

        let update = UpdatePostInput {
            title: changes.title,
            text: changes.text,
            is_active: changes.is_active,
            document,
            category_id: changes.category_id,
        };
        if update.is_empty() {
            return Ok(Some(post));
        }
        update.apply_to(&mut post);

        let updated = self.posts.update(&post).await?;
        tracing::info!(post_id = updated.id, "Post updated");
        Ok(Some(updated))
    }

    /// Soft-delete a post.
    ///
    /// Deleting an already deleted post succeeds without changing anything.
    /// Returns `false` when no post has this ID.
    pub async fn delete(&self, id: i64) -> Result<bool, PostServiceError> {
        let found = self.posts.mark_deleted(id).await?;
        if found {
            tracing::info!(post_id = id, "Post soft-deleted");
        }
        Ok(found)
    }
}
