//! Page templates
//!
//! Tera templates compiled into the binary from `templates/`. A configured
//! override directory may replace any of them by file name; `.html` files
//! found there are loaded after the built-in set.

use rust_embed::RustEmbed;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fs;
use std::path::Path;
use tera::{Context, Tera, Value};

use crate::services::storage::media_url;

mod error;

pub use error::TemplateError;

#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct BuiltinTemplates;

/// Renders the application's pages
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Load the built-in templates, then the overrides from `override_dir`
    pub fn new(override_dir: Option<&Path>) -> Result<Self, TemplateError> {
        let mut templates: Vec<(String, String)> = Vec::new();

        for name in BuiltinTemplates::iter() {
            if let Some(file) = BuiltinTemplates::get(&name) {
                let content = String::from_utf8_lossy(&file.data).into_owned();
                templates.push((name.to_string(), content));
            }
        }

        if let Some(dir) = override_dir {
            let overrides = collect_templates(dir, dir)?;
            tracing::info!(
                "Loaded {} template override(s) from {:?}",
                overrides.len(),
                dir
            );
            for (name, content) in overrides {
                templates.retain(|(existing, _)| *existing != name);
                templates.push((name, content));
            }
        }

        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| TemplateError::Render(describe(&e)))?;
        tera.register_filter("media", media_filter);

        Ok(Self { tera })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    pub fn render(&self, template: &str, context: &Context) -> Result<String, TemplateError> {
        if !self.has_template(template) {
            return Err(TemplateError::NotFound(template.to_string()));
        }
        self.tera.render(template, context).map_err(|e| {
            TemplateError::Render(format!("Failed to render '{}': {}", template, describe(&e)))
        })
    }

    /// The `500.html` page, or a bare HTML page when that fails to render
    pub fn render_error_page(&self, context: &Context) -> String {
        match self.render("500.html", context) {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("Failed to render error page: {}", e);
                simple_error_page().to_string()
            }
        }
    }
}

/// `{{ reference | media }}`: public URL of a stored upload
fn media_filter(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    let reference = tera::try_get_value!("media", "value", String, value);
    Ok(Value::String(media_url(&reference)))
}

/// Error message with its whole source chain
fn describe(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    message
}

fn collect_templates(base: &Path, dir: &Path) -> Result<Vec<(String, String)>, TemplateError> {
    let mut templates = Vec::new();
    if !dir.exists() {
        tracing::warn!("Template directory {:?} does not exist", dir);
        return Ok(templates);
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            templates.extend(collect_templates(base, &path)?);
        } else if path.extension().is_some_and(|ext| ext == "html") {
            let Ok(relative) = path.strip_prefix(base) else {
                continue;
            };
            let name = relative.to_string_lossy().replace('\\', "/");
            templates.push((name, fs::read_to_string(&path)?));
        }
    }
    Ok(templates)
}

pub fn simple_error_page() -> &'static str {
    r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>Server Error (500)</title></head>
<body><h1>Server Error (500)</h1></body>
</html>"#
}
