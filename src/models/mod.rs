// src/models/mod.rs

//! Domain models for the review site.
//!
//! Row types mirror the hosted tables (snake_case columns, nullable fields as
//! `Option`). View types are what the services hand to callers after joining
//! and normalizing rows.

mod category;
mod comment;
mod config;
mod like;
mod page;
mod profile;
mod review;
mod user;

// Re-export all public types
pub use category::{Category, CategoryRef, CategoryWithCount, UNCATEGORIZED_NAME, UNCATEGORIZED_SLUG};
pub use comment::{Comment, CommentAuthor, CommentView, NewComment};
pub use config::{
    BackendConfig, CacheConfig, CommentsConfig, Config, LoggingConfig, MigrationConfig,
    ServerConfig, SiteConfig,
};
pub use like::{CommentLike, LikeState, ReviewLike};
pub use page::{MAX_PER_PAGE, Page, PageRequest};
pub use profile::{Profile, ProfileUpdate};
pub use review::{Review, ReviewDetail, ReviewSort, ReviewSummary};
pub use user::AuthUser;

/// Table names in the hosted schema.
pub mod tables {
    pub const REVIEWS: &str = "reviews";
    pub const CATEGORIES: &str = "categories";
    pub const COMMENTS: &str = "comments";
    pub const REVIEW_LIKES: &str = "review_likes";
    pub const COMMENT_LIKES: &str = "comment_likes";
    pub const PROFILES: &str = "profiles";
}
