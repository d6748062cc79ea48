//! Blog post models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Category, User};

/// A blog post row.
///
/// Posts are never physically removed; deleting one sets `deleted`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlogPost {
    pub id: i64,
    pub title: String,
    pub text: String,
    /// Publish flag
    pub is_active: bool,
    /// Stored file reference, relative to the upload directory
    pub document: Option<String>,
    pub category_id: Option<i64>,
    /// Soft-delete flag
    pub deleted: bool,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cover (banner) image attached to a post
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlogPostCover {
    pub id: i64,
    pub blog_post_id: i64,
    /// Stored file reference, relative to the upload directory
    pub image: String,
    pub created_at: DateTime<Utc>,
}

/// Values for a new post row
#[derive(Debug, Clone, Default)]
pub struct CreatePostInput {
    pub title: String,
    pub text: String,
    pub is_active: bool,
    pub document: Option<String>,
    pub category_id: Option<i64>,
    pub created_by: Option<i64>,
}

/// Partial update of a post. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub text: Option<String>,
    pub is_active: Option<bool>,
    /// `Some(None)` clears the document
    pub document: Option<Option<String>>,
    /// `Some(None)` clears the category
    pub category_id: Option<Option<i64>>,
}

impl UpdatePostInput {
    /// Apply the provided fields to a post
    pub fn apply_to(self, post: &mut BlogPost) {
        if let Some(title) = self.title {
            post.title = title;
        }
        if let Some(text) = self.text {
            post.text = text;
        }
        if let Some(is_active) = self.is_active {
            post.is_active = is_active;
        }
        if let Some(document) = self.document {
            post.document = document;
        }
        if let Some(category_id) = self.category_id {
            post.category_id = category_id;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.text.is_none()
            && self.is_active.is_none()
            && self.document.is_none()
            && self.category_id.is_none()
    }
}

/// A post with its related rows loaded, ready for the detail page
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub post: BlogPost,
    pub category: Option<Category>,
    pub authors: Vec<User>,
    pub covers: Vec<BlogPostCover>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_post() -> BlogPost {
        let now = Utc::now();
        BlogPost {
            id: 1,
            title: "Hello".into(),
            text: "World".into(),
            is_active: true,
            document: Some("documents/a.pdf".into()),
            category_id: Some(1),
            deleted: false,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_apply_partial_update_keeps_other_fields() {
        let mut post = sample_post();
        UpdatePostInput {
            title: Some("New".into()),
            ..Default::default()
        }
        .apply_to(&mut post);

        assert_eq!(post.title, "New");
        assert_eq!(post.text, "World");
        assert!(post.is_active);
        assert_eq!(post.document.as_deref(), Some("documents/a.pdf"));
        assert_eq!(post.category_id, Some(1));
    }

    #[test]
    fn test_apply_can_clear_optional_fields() {
        let mut post = sample_post();
        UpdatePostInput {
            category_id: Some(None),
            document: Some(None),
            ..Default::default()
        }
        .apply_to(&mut post);

        assert!(post.category_id.is_none());
        assert!(post.document.is_none());
    }

    #[test]
    fn test_is_empty() {
        assert!(UpdatePostInput::default().is_empty());
        assert!(!UpdatePostInput {
            is_active: Some(false),
            ..Default::default()
        }
        .is_empty());
    }
}
