//! Database repositories
//!
//! One repository per entity. Each exposes a trait and a `Sqlx*`
//! implementation that runs on either backend.

pub mod category;
pub mod post;
pub mod session;
pub mod user;

pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
