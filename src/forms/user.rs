//! Account forms: registration, login and password reset

use super::{
    check_max_length, required_email, required_raw, required_text, FormData, FormErrors,
};
use crate::services::password::{validate_password, MIN_PASSWORD_LENGTH};
use crate::services::user::{LoginInput, RegisterInput};

pub const PASSWORD_MISMATCH: &str = "The two password fields didn't match.";
pub const EMAIL_TAKEN: &str = "Custom user with this Email already exists.";
pub const UNKNOWN_EMAIL: &str = "No user with this email.";
pub const NEW_PASSWORD_MISMATCH: &str = "Passwords do not match.";

const FULL_NAME_MAX_LENGTH: usize = 150;

/// Sign-up form. Email uniqueness needs the database and is checked by the
/// handler, which reports it with [`EMAIL_TAKEN`].
pub struct RegistrationForm;

impl RegistrationForm {
    pub fn validate(data: &FormData) -> Result<RegisterInput, FormErrors> {
        let mut errors = FormErrors::new();

        let email = required_email(data, "email", &mut errors);
        let full_name = required_text(data, "full_name", &mut errors);
        check_max_length("full_name", &full_name, FULL_NAME_MAX_LENGTH, &mut errors);
        let password1 = required_raw(data, "password1", &mut errors);
        let password2 = required_raw(data, "password2", &mut errors);

        if !password1.is_empty() && !password2.is_empty() {
            if password1 != password2 {
                errors.add("password2", PASSWORD_MISMATCH);
            } else if password2.chars().count() < MIN_PASSWORD_LENGTH {
                errors.add(
                    "password2",
                    format!(
                        "This password is too short. It must contain at least {} characters.",
                        MIN_PASSWORD_LENGTH
                    ),
                );
            }
        }

        errors.finish(|| RegisterInput::new(email, full_name, password1))
    }
}

/// Login form. The `username` field carries the email.
pub struct LoginForm;

impl LoginForm {
    pub fn validate(data: &FormData) -> Result<LoginInput, FormErrors> {
        let mut errors = FormErrors::new();
        let username = required_text(data, "username", &mut errors);
        let password = required_raw(data, "password", &mut errors);
        errors.finish(|| LoginInput::new(username, password))
    }
}

pub struct PasswordResetRequestForm;

impl PasswordResetRequestForm {
    /// The cleaned email address
    pub fn validate(data: &FormData) -> Result<String, FormErrors> {
        let mut errors = FormErrors::new();
        let email = required_email(data, "email", &mut errors);
        errors.finish(|| email)
    }
}

/// New password entered through a reset link. Its errors are not tied to
/// a field.
pub struct SetNewPasswordForm;

impl SetNewPasswordForm {
    pub fn validate(data: &FormData) -> Result<String, FormErrors> {
        let mut errors = FormErrors::new();
        let password1 = data.get("new_password1").unwrap_or_default();
        let password2 = data.get("new_password2").unwrap_or_default();

        if password1 != password2 {
            errors.add_non_field(NEW_PASSWORD_MISMATCH);
        } else if let Err(message) = validate_password(password1) {
            errors.add_non_field(message);
        }

        errors.finish(|| password1.to_string())
    }
}
