//! Shared state, request extensions and middleware
//!
//! - `load_session`: resolves the session cookie to a [`CurrentUser`]
//! - `error_pages`: renders `500.html` for [`AppError`] responses
//! - `media_headers`: keeps served uploads from running in the page origin

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use std::convert::Infallible;
use std::sync::Arc;
use tera::Context;

use crate::config::{Config, SessionConfig, UploadConfig};
use crate::db::repositories::{
    SqlxCategoryRepository, SqlxPostRepository, SqlxSessionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{Session, User};
use crate::services::storage::DOCUMENTS_FOLDER;
use crate::services::{
    FileStorage, Mailer, PasswordResetError, PasswordResetService, PostService, PostServiceError,
    UserService, UserServiceError,
};
use crate::templates::{simple_error_page, TemplateEngine, TemplateError};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub post_service: Arc<PostService>,
    pub user_service: Arc<UserService>,
    pub password_reset: Arc<PasswordResetService>,
    pub templates: Arc<TemplateEngine>,
    pub upload_config: Arc<UploadConfig>,
    pub session_config: Arc<SessionConfig>,
    /// Tell visitors when a reset is requested for an unknown email
    pub reveal_unknown_reset_email: bool,
}

impl AppState {
    /// Wire repositories, services and templates over an open pool
    pub fn new(
        config: &Config,
        pool: DynDatabasePool,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone());
        let post_repo = SqlxPostRepository::boxed(pool.clone());

        let user_service = Arc::new(UserService::with_session_expiration(
            user_repo.clone(),
            session_repo,
            config.session.expiration_days,
        ));
        let storage = Arc::new(FileStorage::new(config.upload.clone()));
        let post_service = Arc::new(PostService::new(
            post_repo,
            category_repo,
            user_repo,
            storage,
        ));

        let secret = match &config.auth.secret_key {
            Some(key) if !key.is_empty() => key.as_bytes().to_vec(),
            _ => {
                tracing::warn!(
                    "auth.secret_key is not set; password reset links will not survive a restart"
                );
                PasswordResetService::random_secret()
            }
        };
        let password_reset = Arc::new(PasswordResetService::new(
            user_service.clone(),
            mailer,
            secret,
            config.auth.reset_timeout_seconds,
            config.server.public_url.clone(),
        ));

        let templates = Arc::new(TemplateEngine::new(config.templates.path.as_deref())?);

        Ok(Self {
            pool,
            post_service,
            user_service,
            password_reset,
            templates,
            upload_config: Arc::new(config.upload.clone()),
            session_config: Arc::new(config.session.clone()),
            reveal_unknown_reset_email: config.auth.reveal_unknown_reset_email,
        })
    }
}

/// The visitor, as resolved from the session cookie.
///
/// Anonymous when there is no cookie or its session is unknown or expired.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser {
    pub user: Option<User>,
    pub session_id: Option<String>,
}

impl CurrentUser {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Error for failures a handler cannot recover from.
///
/// Missing posts, invalid forms and bad credentials are normal responses,
/// never an `AppError`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Marks a response produced by an [`AppError`] so `error_pages` can
/// replace its body
#[derive(Debug, Clone, Copy)]
struct ServerErrorPage;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(message) => {
                tracing::warn!("Bad request: {}", message);
                (
                    StatusCode::BAD_REQUEST,
                    Html("<h1>Bad Request (400)</h1>".to_string()),
                )
                    .into_response()
            }
            AppError::Internal(e) => {
                tracing::error!("Request failed: {:#}", e);
                let mut response =
                    (StatusCode::INTERNAL_SERVER_ERROR, Html(simple_error_page())).into_response();
                response.extensions_mut().insert(ServerErrorPage);
                response
            }
        }
    }
}

impl From<PostServiceError> for AppError {
    fn from(e: PostServiceError) -> Self {
        AppError::Internal(e.into())
    }
}

impl From<UserServiceError> for AppError {
    fn from(e: UserServiceError) -> Self {
        AppError::Internal(e.into())
    }
}

impl From<PasswordResetError> for AppError {
    fn from(e: PasswordResetError) -> Self {
        AppError::Internal(e.into())
    }
}

impl From<TemplateError> for AppError {
    fn from(e: TemplateError) -> Self {
        AppError::Internal(e.into())
    }
}

/// Value of a cookie from the request headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value opening a session
pub fn session_cookie(config: &SessionConfig, session: &Session) -> HeaderValue {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.cookie_name,
        session.id,
        config.expiration_days * 24 * 60 * 60
    );
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| clear_session_cookie(config))
}

/// `Set-Cookie` value removing the session cookie
pub fn clear_session_cookie(config: &SessionConfig) -> HeaderValue {
    let cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        config.cookie_name
    );
    HeaderValue::from_str(&cookie).unwrap_or(HeaderValue::from_static(""))
}

/// Resolve the session cookie and attach a [`CurrentUser`] to the request.
///
/// A lookup failure is logged and the visitor treated as anonymous.
pub async fn load_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut current = CurrentUser::default();

    if let Some(token) = cookie_value(request.headers(), &state.session_config.cookie_name) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                current = CurrentUser {
                    user: Some(user),
                    session_id: Some(token),
                };
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Session validation failed: {}", e),
        }
    }

    request.extensions_mut().insert(current);
    next.run(request).await
}

/// Replace the body of internal-error responses with the `500.html` page
pub async fn error_pages(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.extensions().get::<ServerErrorPage>().is_none() {
        return response;
    }

    let mut context = Context::new();
    context.insert("messages", &Vec::<String>::new());
    let html = state.templates.render_error_page(&context);
    (StatusCode::INTERNAL_SERVER_ERROR, Html(html)).into_response()
}

/// Stored uploads are never content-sniffed, and documents are always
/// downloaded rather than displayed
pub async fn media_headers(request: Request, next: Next) -> Response {
    let is_document = request
        .uri()
        .path()
        .trim_start_matches('/')
        .starts_with(&format!("{}/", DOCUMENTS_FOLDER));

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    if is_document {
        headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment"),
        );
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc123; flash=x"),
        );

        assert_eq!(cookie_value(&headers, "session").as_deref(), Some("abc123"));
        assert_eq!(cookie_value(&headers, "flash").as_deref(), Some("x"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let config = SessionConfig::default();
        let session = Session {
            id: "token".into(),
            user_id: 1,
            expires_at: chrono::Utc::now(),
            created_at: chrono::Utc::now(),
        };

        let cookie = session_cookie(&config, &session);
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("session=token;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=1209600"));

        let cleared = clear_session_cookie(&config);
        assert!(cleared.to_str().unwrap().contains("Max-Age=0"));
    }
}
