//! Blog post forms

use super::{
    check_max_length, checkbox_value, required_text, FormData, FormErrors, EMPTY_FILE,
    INVALID_CHOICE,
};
use crate::config::UploadConfig;
use crate::services::post::{NewPost, PostChanges, PostChoices};
use crate::services::storage::UploadedFile;

pub const TITLE_MAX_LENGTH: usize = 255;

pub const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

/// Form for creating a post.
///
/// Fields: `title`, `text`, `is_active`, `document`, `category`, `authors`
/// (repeatable) and `cover`.
pub struct CreatePostForm;

impl CreatePostForm {
    pub fn validate(
        data: &FormData,
        choices: &PostChoices,
        upload: &UploadConfig,
    ) -> Result<NewPost, FormErrors> {
        let mut errors = FormErrors::new();

        let title = required_text(data, "title", &mut errors);
        check_max_length("title", &title, TITLE_MAX_LENGTH, &mut errors);
        let text = required_text(data, "text", &mut errors);
        let is_active = checkbox_value(data.get("is_active"));
        let category_id = clean_category(data, choices, &mut errors);
        let author_ids = clean_authors(data, choices, &mut errors);
        let document = clean_file(data, "document", upload, &mut errors);
        let cover = clean_image(data, "cover", upload, &mut errors);

        errors.finish(|| NewPost {
            title,
            text,
            is_active,
            category_id: category_id.flatten(),
            author_ids,
            document,
            cover,
            created_by: None,
        })
    }
}

/// Form for editing a post.
///
/// Declares `title`, `text`, `document`, `category`, and `is_active` when
/// `with_is_active` is set. A declared field missing from the submission
/// keeps its stored value; anything undeclared is ignored.
pub struct UpdatePostForm;

impl UpdatePostForm {
    pub fn validate(
        data: &FormData,
        choices: &PostChoices,
        upload: &UploadConfig,
        with_is_active: bool,
    ) -> Result<PostChanges, FormErrors> {
        let mut errors = FormErrors::new();

        let title = data.contains("title").then(|| {
            let title = required_text(data, "title", &mut errors);
            check_max_length("title", &title, TITLE_MAX_LENGTH, &mut errors);
            title
        });
        let text = data
            .contains("text")
            .then(|| required_text(data, "text", &mut errors));
        let is_active = (with_is_active && data.contains("is_active"))
            .then(|| checkbox_value(data.get("is_active")));
        let category_id = clean_category(data, choices, &mut errors);
        let document = clean_file(data, "document", upload, &mut errors);

        errors.finish(|| PostChanges {
            title,
            text,
            is_active,
            category_id,
            document,
        })
    }
}

/// `None` when the field is absent, `Some(None)` when left blank
fn clean_category(
    data: &FormData,
    choices: &PostChoices,
    errors: &mut FormErrors,
) -> Option<Option<i64>> {
    let value = data.get("category")?.trim();
    if value.is_empty() {
        return Some(None);
    }
    match value.parse::<i64>() {
        Ok(id) if choices.has_category(id) => Some(Some(id)),
        _ => {
            errors.add("category", INVALID_CHOICE);
            None
        }
    }
}

fn clean_authors(data: &FormData, choices: &PostChoices, errors: &mut FormErrors) -> Vec<i64> {
    let mut ids = Vec::new();
    for value in data.get_all("authors") {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match value.parse::<i64>() {
            Ok(id) if choices.has_author(id) => ids.push(id),
            _ => errors.add(
                "authors",
                format!(
                    "Select a valid choice. {} is not one of the available choices.",
                    value
                ),
            ),
        }
    }
    ids
}

fn clean_file(
    data: &FormData,
    name: &str,
    upload: &UploadConfig,
    errors: &mut FormErrors,
) -> Option<UploadedFile> {
    let file = data.file(name)?;
    if file.data.is_empty() {
        errors.add(name, EMPTY_FILE);
        return None;
    }
    if file.size() > upload.max_file_size {
        errors.add(
            name,
            format!(
                "Ensure this file is at most {} bytes (it has {}).",
                upload.max_file_size,
                file.size()
            ),
        );
        return None;
    }
    Some(file.clone())
}

/// Like [`clean_file`], but the content must be an allowed image type.
/// The type is taken from the file's leading bytes, not from the client.
fn clean_image(
    data: &FormData,
    name: &str,
    upload: &UploadConfig,
    errors: &mut FormErrors,
) -> Option<UploadedFile> {
    let mut file = clean_file(data, name, upload, errors)?;
    match sniff_image_type(&file.data) {
        Some(mime) if upload.is_image_type_allowed(mime) => {
            file.content_type = mime.to_string();
            Some(file)
        }
        _ => {
            errors.add(name, INVALID_IMAGE);
            None
        }
    }
}

/// Detect an image format from its magic bytes
pub fn sniff_image_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}
