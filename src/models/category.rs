// src/models/category.rs

//! Category rows and the shapes derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display name used when a review has no resolvable category.
pub const UNCATEGORIZED_NAME: &str = "Uncategorized";
/// Slug used when a review has no resolvable category.
pub const UNCATEGORIZED_SLUG: &str = "uncategorized";

/// A row of the `categories` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Category {
    pub fn path_for(slug: &str) -> String {
        format!("/category/{slug}")
    }
}

/// The `{name, slug}` pair embedded in review views.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryRef {
    pub name: String,
    pub slug: String,
}

impl Default for CategoryRef {
    fn default() -> Self {
        Self {
            name: UNCATEGORIZED_NAME.to_string(),
            slug: UNCATEGORIZED_SLUG.to_string(),
        }
    }
}

impl From<&Category> for CategoryRef {
    fn from(category: &Category) -> Self {
        Self {
            name: category.name.clone(),
            slug: category.slug.clone(),
        }
    }
}

/// A category together with how many reviews reference it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: Category,
    pub review_count: usize,
}
