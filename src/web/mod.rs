//! Web layer - HTML handlers and routing
//!
//! - Post pages, served twice under `/blog` (see [`posts::PostViews`])
//! - Account pages: registration, login, logout, password reset
//! - Uploaded files under `/media/`

pub mod auth;
pub mod flash;
mod form;
pub mod middleware;
pub mod posts;
pub mod responses;


use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};

pub use middleware::{AppError, AppState, CurrentUser};
pub use posts::{PostViews, CLASS_VIEWS, FUNCTION_VIEWS};

/// Room for the non-file fields of a multipart request
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the `/blog` router
pub fn build_blog_router() -> Router<AppState> {
    Router::new()
        .merge(FUNCTION_VIEWS.router())
        .merge(CLASS_VIEWS.router())
        .route("/not_found/", get(posts::not_found_page))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    // A post form may carry a document and a cover
    let body_limit = (state.upload_config.max_file_size as usize)
        .saturating_mul(2)
        .saturating_add(FORM_OVERHEAD_BYTES);
    let media = ServiceBuilder::new()
        .layer(axum_middleware::from_fn(middleware::media_headers))
        .service(ServeDir::new(&state.upload_config.path));
    let home = CLASS_VIEWS.list_url();

    Router::new()
        .route("/", get(move || async move { responses::redirect(&home) }))
        .nest("/blog", build_blog_router())
        .merge(auth::router())
        .nest_service("/media", media)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::load_session,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::error_pages,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
