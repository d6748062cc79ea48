//! Blogpost - a small server-rendered blog
//!
//! Posts with soft deletion, document and cover image uploads, and
//! session-based accounts with password reset by mail.

pub mod config;
pub mod db;
pub mod forms;
pub mod models;
pub mod services;
pub mod templates;
pub mod web;
