//! Form validation
//!
//! Submitted fields arrive as [`FormData`], whether the browser sent
//! `multipart/form-data` or `application/x-www-form-urlencoded`. Each form
//! turns it into typed values or a [`FormErrors`] map that the page renders
//! next to the fields.

pub mod post;
pub mod user;

use crate::services::storage::UploadedFile;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub use post::{CreatePostForm, UpdatePostForm};
pub use user::{
    LoginForm, PasswordResetRequestForm, RegistrationForm, SetNewPasswordForm,
};

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";
pub const EMPTY_FILE: &str = "The submitted file is empty.";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@((?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}|localhost)$",
    )
    .expect("email pattern is valid")
});

/// Raw submitted form fields and files
#[derive(Debug, Clone, Default)]
pub struct FormData {
    fields: Vec<(String, String)>,
    files: Vec<(String, UploadedFile)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            files: Vec::new(),
        }
    }

    pub fn push_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Add an uploaded file. A file input left empty by the browser (no
    /// file name) is treated as absent.
    pub fn push_file(&mut self, name: impl Into<String>, file: UploadedFile) {
        if !file.file_name.is_empty() {
            self.files.push((name.into(), file));
        }
    }

    /// Whether the field was submitted at all
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == name) || self.files.iter().any(|(k, _)| k == name)
    }

    /// Last submitted value of a field
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every submitted value of a multi-valued field, in order
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.iter().rev().find(|(k, _)| k == name).map(|(_, f)| f)
    }

    /// Last value of each text field, for re-displaying a rejected form.
    /// Password fields are left out.
    pub fn values(&self) -> HashMap<String, String> {
        self.fields
            .iter()
            .filter(|(k, _)| !k.contains("password"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Validation errors keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormErrors {
    pub fields: BTreeMap<String, Vec<String>>,
    pub non_field: Vec<String>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.non_field.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.non_field.is_empty()
    }

    /// Messages for one field
    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `Ok(value)` when no error was recorded
    pub fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, FormErrors> {
        if self.is_empty() {
            Ok(value())
        } else {
            Err(self)
        }
    }
}

/// Stripped value of a required text field
pub(crate) fn required_text(data: &FormData, name: &str, errors: &mut FormErrors) -> String {
    match data.get(name).map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => {
            errors.add(name, REQUIRED);
            String::new()
        }
    }
}

/// Required field whose value is kept exactly as typed (passwords)
pub(crate) fn required_raw(data: &FormData, name: &str, errors: &mut FormErrors) -> String {
    match data.get(name) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => {
            errors.add(name, REQUIRED);
            String::new()
        }
    }
}

pub(crate) fn check_max_length(name: &str, value: &str, max: usize, errors: &mut FormErrors) {
    let length = value.chars().count();
    if length > max {
        errors.add(
            name,
            format!(
                "Ensure this value has at most {} characters (it has {}).",
                max, length
            ),
        );
    }
}

/// Required, well-formed email address
pub(crate) fn required_email(data: &FormData, name: &str, errors: &mut FormErrors) -> String {
    let email = required_text(data, name, errors);
    if !email.is_empty() {
        check_max_length(name, &email, 254, errors);
        if !is_valid_email(&email) {
            errors.add(name, INVALID_EMAIL);
        }
    }
    email
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Checkbox semantics: absent, empty or "false" is off, anything else on
pub(crate) fn checkbox_value(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(v) => !(v.is_empty() || v.eq_ignore_ascii_case("false") || v == "0"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_get_returns_last_value() {
        let data = FormData::from_fields([("is_active", "false"), ("is_active", "on")]);
        assert_eq!(data.get("is_active"), Some("on"));
        assert_eq!(data.get_all("is_active"), vec!["false", "on"]);
        assert!(data.contains("is_active"));
        assert!(!data.contains("title"));
    }

    #[test]
    fn test_empty_file_input_is_absent() {
        let mut data = FormData::new();
        data.push_file(
            "cover",
            UploadedFile {
                file_name: String::new(),
                content_type: "application/octet-stream".into(),
                data: Vec::new(),
            },
        );
        assert!(data.file("cover").is_none());
        assert!(!data.contains("cover"));
    }

    #[test]
    fn test_values_skip_passwords() {
        let data = FormData::from_fields([("email", "a@example.com"), ("password1", "secret")]);
        let values = data.values();
        assert_eq!(values.get("email").map(String::as_str), Some("a@example.com"));
        assert!(!values.contains_key("password1"));
    }

    #[test]
    fn test_checkbox_value() {
        assert!(!checkbox_value(None));
        assert!(!checkbox_value(Some("")));
        assert!(!checkbox_value(Some("false")));
        assert!(!checkbox_value(Some("False")));
        assert!(checkbox_value(Some("on")));
        assert!(checkbox_value(Some("true")));
    }

    #[test]
    fn test_max_length_message() {
        let mut errors = FormErrors::new();
        check_max_length("title", &"x".repeat(256), 255, &mut errors);
        assert_eq!(
            errors.get("title"),
            ["Ensure this value has at most 255 characters (it has 256).".to_string()]
        );
    }

    #[test]
    fn test_email_validation() {
        for ok in ["a@example.com", "first.last+tag@sub.example.org", "root@localhost"] {
            assert!(is_valid_email(ok), "{}", ok);
        }
        for bad in ["", "plain", "a@", "@example.com", "a b@example.com", "a@example", "a..b@example.com"] {
            assert!(!is_valid_email(bad), "{}", bad);
        }
    }

    #[test]
    fn test_finish() {
        assert_eq!(FormErrors::new().finish(|| 5), Ok(5));

        let mut errors = FormErrors::new();
        errors.add_non_field("nope");
        assert!(errors.finish(|| 5).is_err());
    }

    proptest! {
        #[test]
        fn prop_required_text_rejects_blank(blank in "[ \\t]{0,5}") {
            let data = FormData::from_fields([("title", blank)]);
            let mut errors = FormErrors::new();
            required_text(&data, "title", &mut errors);
            prop_assert_eq!(errors.get("title"), [REQUIRED.to_string()]);
        }
    }
}
