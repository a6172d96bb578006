//! Review rows and the views built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{Category, CategoryRef};

/// A row of the `reviews` table.
///
/// Only `id`, `title` and `slug` are guaranteed; every other column may be
/// null or absent when a narrower projection was selected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Review {
    pub id: String,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub og_image: Option<String>,
    #[serde(default)]
    pub pros: Option<Vec<String>>,
    #[serde(default)]
    pub cons: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub specs: Option<Map<String, Value>>,
    #[serde(default)]
    pub product: Option<Value>,
    #[serde(default)]
    pub purchase_links: Option<Vec<Value>>,
    #[serde(default)]
    pub featured: Option<bool>,
    #[serde(default)]
    pub likes_count: Option<i64>,
    #[serde(default)]
    pub comments_count: Option<i64>,
    #[serde(default)]
    pub view_count: Option<i64>,
    #[serde(default)]
    pub read_time: Option<i64>,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub canonical_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Review {
    /// Canonical site path for a review slug.
    pub fn path_for(slug: &str) -> String {
        format!("/review/{slug}")
    }
}

/// Card-sized projection used by listings, carousels and search results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewSummary {
    pub id: String,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub likes_count: Option<i64>,
    #[serde(default)]
    pub comments_count: Option<i64>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub featured: Option<bool>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Resolved from `category_id` against the category list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryRef>,
}

impl ReviewSummary {
    /// Columns selected for summary listings.
    pub const COLUMNS: &'static str = "id,title,slug,description,image_url,rating,category_id,likes_count,comments_count,tags,featured,created_at";
}

impl From<&Review> for ReviewSummary {
    fn from(review: &Review) -> Self {
        Self {
            id: review.id.clone(),
            title: review.title.clone(),
            slug: review.slug.clone(),
            description: review.description.clone(),
            image_url: review.image_url.clone(),
            rating: review.rating,
            category_id: review.category_id,
            likes_count: review.likes_count,
            comments_count: review.comments_count,
            tags: review.tags.clone(),
            featured: review.featured,
            created_at: review.created_at,
            category: None,
        }
    }
}

/// A review with every optional field resolved to a displayable value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewDetail {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub description: Option<String>,
    pub rating: f64,
    pub category: CategoryRef,
    pub image_url: Option<String>,
    pub og_image: Option<String>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub tags: Vec<String>,
    pub keywords: Vec<String>,
    pub specs: Map<String, Value>,
    pub product: Value,
    pub purchase_links: Vec<Value>,
    pub featured: bool,
    pub likes_count: i64,
    pub comments_count: i64,
    pub view_count: i64,
    /// Estimated minutes to read
    pub read_time: i64,
    pub meta_title: String,
    pub meta_description: Option<String>,
    pub canonical_url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ReviewDetail {
    /// Resolve a raw row against its (optional) category.
    pub fn from_review(review: Review, category: Option<&Category>) -> Self {
        let content = review.content.unwrap_or_default();
        let read_time = review
            .read_time
            .filter(|minutes| *minutes > 0)
            .unwrap_or_else(|| estimate_read_time(&content));
        let product = review
            .product
            .filter(|p| !p.is_null())
            .unwrap_or_else(|| Value::Object(Map::new()));
        let specs = review
            .specs
            .unwrap_or_else(|| specs_from_product(&product));

        Self {
            meta_title: review
                .meta_title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| review.title.clone()),
            meta_description: review
                .meta_description
                .filter(|d| !d.trim().is_empty())
                .or_else(|| review.description.clone()),
            canonical_url: review
                .canonical_url
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| Review::path_for(&review.slug)),
            category: category.map(CategoryRef::from).unwrap_or_default(),
            id: review.id,
            title: review.title,
            slug: review.slug,
            content,
            description: review.description,
            rating: review.rating.unwrap_or(0.0),
            image_url: review.image_url,
            og_image: review.og_image,
            pros: review.pros.unwrap_or_default(),
            cons: review.cons.unwrap_or_default(),
            tags: review.tags.unwrap_or_default(),
            keywords: review.keywords.unwrap_or_default(),
            specs,
            product,
            purchase_links: review.purchase_links.unwrap_or_default(),
            featured: review.featured.unwrap_or(false),
            likes_count: review.likes_count.unwrap_or(0),
            comments_count: review.comments_count.unwrap_or(0),
            view_count: review.view_count.unwrap_or(0),
            read_time,
            published_at: review.published_at,
            created_at: review.created_at,
            updated_at: review.updated_at,
        }
    }

    /// Body split into paragraphs on blank lines.
    pub fn paragraphs(&self) -> impl Iterator<Item = &str> {
        self.content
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// One minute per thousand characters, never less than a minute.
fn estimate_read_time(content: &str) -> i64 {
    let chars = content.chars().count() as i64;
    ((chars + 999) / 1000).max(1)
}

/// Build a spec table from `product.specifications: [{name, value}]`.
fn specs_from_product(product: &Value) -> Map<String, Value> {
    product
        .get("specifications")
        .and_then(Value::as_array)
        .map(|specs| {
            specs
                .iter()
                .filter_map(|spec| {
                    let name = spec.get("name")?.as_str()?;
                    let value = spec.get("value")?.clone();
                    Some((name.to_string(), value))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Orderings offered for review listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSort {
    #[default]
    Latest,
    HighestRated,
    MostCommented,
    MostLiked,
}

impl ReviewSort {
    /// Column the backend orders by (always descending).
    pub fn column(self) -> &'static str {
        match self {
            Self::Latest => "created_at",
            Self::HighestRated => "rating",
            Self::MostCommented => "comments_count",
            Self::MostLiked => "likes_count",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::HighestRated => "highest_rated",
            Self::MostCommented => "most_commented",
            Self::MostLiked => "most_liked",
        }
    }
}
