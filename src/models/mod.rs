//! Data models
//!
//! Database entities and the input types used to create or change them.

mod category;
mod post;
mod session;
mod user;

pub use category::Category;
pub use post::{BlogPost, BlogPostCover, CreatePostInput, PostDetail, UpdatePostInput};
pub use session::Session;
pub use user::User;
