//! Page rendering and redirects shared by the handlers

use axum::{
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Serialize;
use tera::Context;

use super::flash::{self, Flash, Message};
use super::middleware::{AppError, AppState, CurrentUser};

pub const NOT_FOUND_URL: &str = "/blog/not_found/";

/// A template plus its context, rendered with the per-request values every
/// page expects: `current_user` and `messages`
pub struct Page {
    template: String,
    context: Context,
    messages: Vec<Message>,
}

impl Page {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            context: Context::new(),
            messages: Vec::new(),
        }
    }

    pub fn with<T: Serialize + ?Sized>(mut self, key: &str, value: &T) -> Self {
        self.context.insert(key, value);
        self
    }

    /// Show a message on this page only
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Render to a 200 response. Pending flash messages are shown and
    /// their cookie cleared.
    pub fn render(
        self,
        state: &AppState,
        user: &CurrentUser,
        flash: &Flash,
    ) -> Result<Response, AppError> {
        let mut context = self.context;
        let mut messages = flash.messages().to_vec();
        messages.extend(self.messages);

        context.insert("current_user", &user.user);
        context.insert("messages", &messages);

        let html = state.templates.render(&self.template, &context)?;
        let mut response = Html(html).into_response();
        if !flash.is_empty() {
            response
                .headers_mut()
                .append(header::SET_COOKIE, flash::clear_cookie());
        }
        Ok(response)
    }
}

pub fn redirect(to: &str) -> Response {
    Redirect::to(to).into_response()
}

pub fn not_found() -> Response {
    redirect(NOT_FOUND_URL)
}
