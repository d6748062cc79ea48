//! Account pages: registration, login, logout and password reset

use axum::{
    extract::{Path, State},
    http::header,
    response::Response,
    routing::get,
    Router,
};
use serde::Serialize;
use std::collections::HashMap;

use super::flash::{redirect_with, Flash, Message};
use super::middleware::{clear_session_cookie, session_cookie, AppError, AppState, CurrentUser};
use super::posts::CLASS_VIEWS;
use super::responses::{redirect, Page};
use crate::forms::user::{EMAIL_TAKEN, UNKNOWN_EMAIL};
use crate::forms::{
    FormData, FormErrors, LoginForm, PasswordResetRequestForm, RegistrationForm,
    SetNewPasswordForm,
};
use crate::services::user::INVALID_CREDENTIALS;
use crate::services::{PasswordResetError, UserServiceError};

pub const LOGIN_URL: &str = "/login/";
pub const RESET_DONE_URL: &str = "/password-reset/done/";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register/", get(register_form).post(register))
        .route("/login/", get(login_form).post(login))
        .route("/logout/", get(logout).post(logout))
        .route("/password-reset/", get(reset_request_form).post(reset_request))
        .route("/password-reset/done/", get(reset_done))
        .route(
            "/reset/{uid}/{token}/",
            get(reset_confirm_form).post(reset_confirm),
        )
}

#[derive(Serialize, Default)]
struct AccountForm {
    values: HashMap<String, String>,
    errors: FormErrors,
}

impl AccountForm {
    fn rejected(data: &FormData, errors: FormErrors) -> Self {
        Self {
            values: data.values(),
            errors,
        }
    }
}

async fn register_form(
    State(state): State<AppState>,
    user: CurrentUser,
    flash: Flash,
) -> Result<Response, AppError> {
    if user.is_authenticated() {
        return Ok(redirect(LOGIN_URL));
    }

    Page::new("user_register.html")
        .with("form", &AccountForm::default())
        .render(&state, &user, &flash)
}

async fn register(
    State(state): State<AppState>,
    user: CurrentUser,
    flash: Flash,
    data: FormData,
) -> Result<Response, AppError> {
    if user.is_authenticated() {
        return Ok(redirect(LOGIN_URL));
    }

    let errors = match RegistrationForm::validate(&data) {
        Ok(input) => {
            let email = input.email.clone();
            let taken = state.user_service.email_taken(&email).await?;
            let result = if taken {
                Err(UserServiceError::UserExists(email))
            } else {
                state.user_service.register(input).await
            };
            match result {
                Ok(_) => return Ok(redirect(LOGIN_URL)),
                Err(UserServiceError::UserExists(_)) => {
                    let mut errors = FormErrors::new();
                    errors.add("email", EMAIL_TAKEN);
                    errors
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(errors) => errors,
    };

    Page::new("user_register.html")
        .with("form", &AccountForm::rejected(&data, errors))
        .render(&state, &user, &flash)
}

async fn login_form(
    State(state): State<AppState>,
    user: CurrentUser,
    flash: Flash,
) -> Result<Response, AppError> {
    Page::new("login.html")
        .with("form", &AccountForm::default())
        .render(&state, &user, &flash)
}

/// POST login. Every failure shows the same message.
async fn login(
    State(state): State<AppState>,
    user: CurrentUser,
    flash: Flash,
    data: FormData,
) -> Result<Response, AppError> {
    let errors = match LoginForm::validate(&data) {
        Ok(input) => match state.user_service.login(input).await {
            Ok(session) => {
                if let Some(previous) = &user.session_id {
                    state.user_service.logout(previous).await?;
                }
                let mut response = redirect_with(
                    &CLASS_VIEWS.list_url(),
                    Message::success("You are now logged in."),
                );
                response.headers_mut().append(
                    header::SET_COOKIE,
                    session_cookie(&state.session_config, &session),
                );
                return Ok(response);
            }
            Err(UserServiceError::AuthenticationError(_)) => FormErrors::new(),
            Err(e) => return Err(e.into()),
        },
        Err(errors) => errors,
    };

    Page::new("login.html")
        .with("form", &AccountForm::rejected(&data, errors))
        .message(Message::error(INVALID_CREDENTIALS))
        .render(&state, &user, &flash)
}

async fn logout(State(state): State<AppState>, user: CurrentUser) -> Result<Response, AppError> {
    if let Some(session_id) = &user.session_id {
        state.user_service.logout(session_id).await?;
    }

    let mut response = redirect_with(LOGIN_URL, Message::success("You have been logged out."));
    response
        .headers_mut()
        .append(header::SET_COOKIE, clear_session_cookie(&state.session_config));
    Ok(response)
}

async fn reset_request_form(
    State(state): State<AppState>,
    user: CurrentUser,
    flash: Flash,
) -> Result<Response, AppError> {
    Page::new("password_reset.html")
        .with("form", &AccountForm::default())
        .render(&state, &user, &flash)
}

async fn reset_request(
    State(state): State<AppState>,
    user: CurrentUser,
    flash: Flash,
    data: FormData,
) -> Result<Response, AppError> {
    let errors = match PasswordResetRequestForm::validate(&data) {
        Ok(email) => {
            let sent = state.password_reset.request_reset(&email).await?;
            if sent || !state.reveal_unknown_reset_email {
                return Ok(redirect(RESET_DONE_URL));
            }
            let mut errors = FormErrors::new();
            errors.add("email", UNKNOWN_EMAIL);
            errors
        }
        Err(errors) => errors,
    };

    Page::new("password_reset.html")
        .with("form", &AccountForm::rejected(&data, errors))
        .render(&state, &user, &flash)
}

async fn reset_done(
    State(state): State<AppState>,
    user: CurrentUser,
    flash: Flash,
) -> Result<Response, AppError> {
    Page::new("password_reset_done.html").render(&state, &user, &flash)
}

/// Whether the link is usable; `Err` only for failures unrelated to the link
async fn link_is_valid(state: &AppState, uid: &str, token: &str) -> Result<bool, AppError> {
    match state.password_reset.check_link(uid, token).await {
        Ok(_) => Ok(true),
        Err(PasswordResetError::InvalidLink) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn reset_confirm_form(
    State(state): State<AppState>,
    Path((uid, token)): Path<(String, String)>,
    user: CurrentUser,
    flash: Flash,
) -> Result<Response, AppError> {
    let validlink = link_is_valid(&state, &uid, &token).await?;

    Page::new("password_reset_confirm.html")
        .with("validlink", &validlink)
        .with("form", &AccountForm::default())
        .render(&state, &user, &flash)
}

async fn reset_confirm(
    State(state): State<AppState>,
    Path((uid, token)): Path<(String, String)>,
    user: CurrentUser,
    flash: Flash,
    data: FormData,
) -> Result<Response, AppError> {
    if !link_is_valid(&state, &uid, &token).await? {
        return Page::new("password_reset_confirm.html")
            .with("validlink", &false)
            .with("form", &AccountForm::default())
            .render(&state, &user, &flash);
    }

    let errors = match SetNewPasswordForm::validate(&data) {
        Ok(password) => match state.password_reset.confirm(&uid, &token, &password).await {
            Ok(_) => {
                return Ok(redirect_with(
                    LOGIN_URL,
                    Message::success("Your password has been set. You may go ahead and log in now."),
                ))
            }
            Err(PasswordResetError::InvalidLink) => {
                let mut errors = FormErrors::new();
                errors.add_non_field("The password reset link was invalid.");
                errors
            }
            Err(e) => return Err(e.into()),
        },
        Err(errors) => errors,
    };

    Page::new("password_reset_confirm.html")
        .with("validlink", &true)
        .with("form", &AccountForm::rejected(&data, errors))
        .render(&state, &user, &flash)
}
