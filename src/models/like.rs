//! Like rows for reviews and comments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A row of `review_likes`; unique per `(review_id, user_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReviewLike {
    #[serde(default)]
    pub id: Option<String>,
    pub review_id: String,
    pub user_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A row of `comment_likes`; unique per `(comment_id, user_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CommentLike {
    #[serde(default)]
    pub id: Option<String>,
    pub comment_id: String,
    pub user_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of a like toggle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LikeState {
    pub liked: bool,
    pub count: i64,
}
