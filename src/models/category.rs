//! Category model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category a post can be filed under
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
