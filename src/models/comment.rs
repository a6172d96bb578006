//! Comment rows and the threaded view served to readers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A row of the `comments` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Comment {
    pub id: String,
    pub review_id: String,
    pub user_id: String,
    /// Set on replies; always points at a top-level comment
    #[serde(default)]
    pub parent_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub likes_count: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Who wrote a comment, as shown next to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentAuthor {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
}

impl CommentAuthor {
    pub const ANONYMOUS: &'static str = "Anonymous";
}

/// A comment ready for display, with its replies nested one level deep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentView {
    pub id: String,
    pub author: CommentAuthor,
    pub content: String,
    pub date: Option<DateTime<Utc>>,
    pub likes: i64,
    pub user_liked: bool,
    pub replies: Vec<CommentView>,
}

impl CommentView {
    /// Number of comments in this thread, including the root.
    pub fn thread_len(&self) -> usize {
        1 + self.replies.len()
    }
}

/// Payload for creating a comment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewComment {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}
