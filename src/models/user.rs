//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user. The email doubles as the login name.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Email address (unique)
    pub email: String,
    /// Display name
    pub full_name: String,
    /// Password hash (argon2 PHC string)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Inactive users cannot log in or reset their password
    pub is_active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User. The password must already be hashed.
    pub fn new(email: String, full_name: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            email,
            full_name,
            password_hash,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
