//! Services layer
//!
//! Business rules between the web handlers and the repositories.

pub mod mailer;
pub mod password;
pub mod password_reset;
pub mod post;
pub mod storage;
pub mod user;

pub use mailer::{build_mailer, LogMailer, Mailer, OutgoingMail, SmtpMailer};
pub use password::{hash_password, validate_password, verify_password};
pub use password_reset::{PasswordResetError, PasswordResetService};
pub use post::{NewPost, PostChanges, PostChoices, PostService, PostServiceError};
pub use storage::{FileStorage, StorageError, UploadedFile};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
