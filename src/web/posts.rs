//! Blog post pages
//!
//! One set of handlers serves both post route sets. Each set is described
//! by a static [`PostViews`] attached to its routes as an extension; the
//! descriptor picks the URLs, templates and redirect targets.

use axum::{
    extract::{Path, State},
    response::Response,
    routing::get,
    Extension, Router,
};
use serde::Serialize;
use std::collections::HashMap;

use super::flash::Flash;
use super::middleware::{AppError, AppState, CurrentUser};
use super::responses::{not_found, redirect, Page};
use crate::forms::{checkbox_value, CreatePostForm, FormData, FormErrors, UpdatePostForm};
use crate::models::BlogPost;
use crate::services::PostChoices;

/// Route set descriptor
#[derive(Debug, Serialize)]
pub struct PostViews {
    /// Path segment before `_list`, `_detail`, ...
    pub prefix: &'static str,
    /// Prepended to every template name
    pub template_prefix: &'static str,
    /// Whether the update form offers the `is_active` checkbox
    pub update_has_is_active: bool,
}

pub static FUNCTION_VIEWS: PostViews = PostViews {
    prefix: "blog_post",
    template_prefix: "",
    update_has_is_active: false,
};

pub static CLASS_VIEWS: PostViews = PostViews {
    prefix: "class_blog_post",
    template_prefix: "class_",
    update_has_is_active: true,
};

type Views = Extension<&'static PostViews>;

impl PostViews {
    pub fn list_url(&self) -> String {
        format!("/blog/{}_list/", self.prefix)
    }

    pub fn detail_url(&self, id: i64) -> String {
        format!("/blog/{}_detail/{}/", self.prefix, id)
    }

    pub fn create_url(&self) -> String {
        format!("/blog/{}_create/", self.prefix)
    }

    pub fn update_url(&self, id: i64) -> String {
        format!("/blog/{}_update/{}/", self.prefix, id)
    }

    pub fn delete_url(&self, id: i64) -> String {
        format!("/blog/{}_delete/{}/", self.prefix, id)
    }

    /// e.g. `class_blog_detail.html` for `"detail"`
    pub fn template(&self, page: &str) -> String {
        format!("{}blog_{}.html", self.template_prefix, page)
    }

    /// Routes relative to `/blog`
    pub fn router(&'static self) -> Router<AppState> {
        Router::new()
            .route(&format!("/{}_list/", self.prefix), get(list))
            .route(&format!("/{}_detail/{{id}}/", self.prefix), get(detail))
            .route(
                &format!("/{}_create/", self.prefix),
                get(create_form).post(create),
            )
            .route(
                &format!("/{}_update/{{id}}/", self.prefix),
                get(update_form).post(update),
            )
            .route(
                &format!("/{}_delete/{{id}}/", self.prefix),
                get(confirm_delete).post(delete),
            )
            .layer(Extension(self))
    }
}

/// What a create/update template needs to draw the form
#[derive(Serialize)]
struct PostForm<'a> {
    values: HashMap<String, String>,
    selected_authors: Vec<String>,
    errors: FormErrors,
    choices: &'a PostChoices,
}

impl<'a> PostForm<'a> {
    fn blank(choices: &'a PostChoices) -> Self {
        Self {
            values: HashMap::new(),
            selected_authors: Vec::new(),
            errors: FormErrors::new(),
            choices,
        }
    }

    fn rejected(data: &FormData, errors: FormErrors, choices: &'a PostChoices) -> Self {
        let mut values = data.values();
        if !checkbox_value(data.get("is_active")) {
            values.remove("is_active");
        }
        Self {
            values,
            selected_authors: data.get_all("authors").into_iter().map(String::from).collect(),
            errors,
            choices,
        }
    }
}

/// Form values for an existing post
fn post_values(post: &BlogPost) -> HashMap<String, String> {
    let mut values = HashMap::new();
    values.insert("title".to_string(), post.title.clone());
    values.insert("text".to_string(), post.text.clone());
    if post.is_active {
        values.insert("is_active".to_string(), "on".to_string());
    }
    if let Some(category_id) = post.category_id {
        values.insert("category".to_string(), category_id.to_string());
    }
    values
}

/// GET list of posts that are not deleted
async fn list(
    State(state): State<AppState>,
    Extension(views): Views,
    user: CurrentUser,
    flash: Flash,
) -> Result<Response, AppError> {
    let blogs = state.post_service.list().await?;

    Page::new(views.template("list"))
        .with("views", views)
        .with("blogs", &blogs)
        .render(&state, &user, &flash)
}

async fn detail(
    State(state): State<AppState>,
    Extension(views): Views,
    Path(id): Path<i64>,
    user: CurrentUser,
    flash: Flash,
) -> Result<Response, AppError> {
    let Some(blog) = state.post_service.get_detail(id).await? else {
        return Ok(not_found());
    };

    Page::new(views.template("detail"))
        .with("views", views)
        .with("blog", &blog)
        .render(&state, &user, &flash)
}

async fn create_form(
    State(state): State<AppState>,
    Extension(views): Views,
    user: CurrentUser,
    flash: Flash,
) -> Result<Response, AppError> {
    let choices = state.post_service.choices().await?;

    Page::new(views.template("create"))
        .with("views", views)
        .with("form", &PostForm::blank(&choices))
        .render(&state, &user, &flash)
}

async fn create(
    State(state): State<AppState>,
    Extension(views): Views,
    user: CurrentUser,
    flash: Flash,
    data: FormData,
) -> Result<Response, AppError> {
    let choices = state.post_service.choices().await?;

    match CreatePostForm::validate(&data, &choices, &state.upload_config) {
        Ok(mut post) => {
            post.created_by = user.id();
            state.post_service.create(post).await?;
            Ok(redirect(&views.list_url()))
        }
        Err(errors) => Page::new(views.template("create"))
            .with("views", views)
            .with("form", &PostForm::rejected(&data, errors, &choices))
            .render(&state, &user, &flash),
    }
}

async fn update_form(
    State(state): State<AppState>,
    Extension(views): Views,
    Path(id): Path<i64>,
    user: CurrentUser,
    flash: Flash,
) -> Result<Response, AppError> {
    let Some(blog) = state.post_service.get(id).await? else {
        return Ok(not_found());
    };
    let choices = state.post_service.choices().await?;
    let form = PostForm {
        values: post_values(&blog),
        ..PostForm::blank(&choices)
    };

    Page::new(views.template("update"))
        .with("views", views)
        .with("blog", &blog)
        .with("form", &form)
        .render(&state, &user, &flash)
}

async fn update(
    State(state): State<AppState>,
    Extension(views): Views,
    Path(id): Path<i64>,
    user: CurrentUser,
    flash: Flash,
    data: FormData,
) -> Result<Response, AppError> {
    let Some(blog) = state.post_service.get(id).await? else {
        return Ok(not_found());
    };
    let choices = state.post_service.choices().await?;

    match UpdatePostForm::validate(&data, &choices, &state.upload_config, views.update_has_is_active)
    {
        Ok(changes) => match state.post_service.update(id, changes).await? {
            Some(_) => Ok(redirect(&views.detail_url(id))),
            None => Ok(not_found()),
        },
        Err(errors) => {
            let mut form = PostForm::rejected(&data, errors, &choices);
            for (key, value) in post_values(&blog) {
                if !data.contains(&key) {
                    form.values.insert(key, value);
                }
            }
            Page::new(views.template("update"))
                .with("views", views)
                .with("blog", &blog)
                .with("form", &form)
                .render(&state, &user, &flash)
        }
    }
}

/// GET delete confirmation. Already deleted posts still get the page, so
/// a repeated delete behaves like the first one.
async fn confirm_delete(
    State(state): State<AppState>,
    Extension(views): Views,
    Path(id): Path<i64>,
    user: CurrentUser,
    flash: Flash,
) -> Result<Response, AppError> {
    let Some(blog) = state.post_service.get_any(id).await? else {
        return Ok(not_found());
    };

    Page::new(views.template("confirm_delete"))
        .with("views", views)
        .with("blog", &blog)
        .render(&state, &user, &flash)
}

async fn delete(
    State(state): State<AppState>,
    Extension(views): Views,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    if state.post_service.delete(id).await? {
        Ok(redirect(&views.list_url()))
    } else {
        Ok(not_found())
    }
}

/// GET the generic not-found page
pub async fn not_found_page(
    State(state): State<AppState>,
    user: CurrentUser,
    flash: Flash,
) -> Result<Response, AppError> {
    let mut response = Page::new("404.html").render(&state, &user, &flash)?;
    *response.status_mut() = axum::http::StatusCode::NOT_FOUND;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_and_templates() {
        assert_eq!(FUNCTION_VIEWS.list_url(), "/blog/blog_post_list/");
        assert_eq!(FUNCTION_VIEWS.detail_url(3), "/blog/blog_post_detail/3/");
        assert_eq!(FUNCTION_VIEWS.template("list"), "blog_list.html");

        assert_eq!(CLASS_VIEWS.list_url(), "/blog/class_blog_post_list/");
        assert_eq!(CLASS_VIEWS.update_url(3), "/blog/class_blog_post_update/3/");
        assert_eq!(CLASS_VIEWS.delete_url(3), "/blog/class_blog_post_delete/3/");
        assert_eq!(CLASS_VIEWS.create_url(), "/blog/class_blog_post_create/");
        assert_eq!(CLASS_VIEWS.template("confirm_delete"), "class_blog_confirm_delete.html");
    }

    #[test]
    fn test_only_class_update_has_is_active() {
        assert!(!FUNCTION_VIEWS.update_has_is_active);
        assert!(CLASS_VIEWS.update_has_is_active);
    }
}
