//! Template engine error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    /// No template registered under this name
    #[error("Template not found: {0}")]
    NotFound(String),

    /// Parse or render failure
    #[error("Template error: {0}")]
    Render(String),

    /// Reading the override directory failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
