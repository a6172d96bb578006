// src/seo/migration.rs

//! One-off SEO backfill for existing rows.
//!
//! Every review and category is read, a patch is computed from the columns
//! that are still empty, and the patch is written back. Columns that already
//! hold a value are never overwritten.

use std::fmt;

use futures::stream::{self, StreamExt};
use serde_json::{Map, Value, json};

use crate::backend::{DataBackend, Query, select_as};
use crate::error::Result;
use crate::models::{Category, Review, SiteConfig, tables};
use crate::seo::generate_keywords;
use crate::utils::truncate_chars;

/// Longest generated meta description, in characters.
pub const META_DESCRIPTION_MAX: usize = 155;
/// Reading speed used for `read_time`.
const WORDS_PER_MINUTE: usize = 200;
const DEFAULT_STATUS: &str = "published";

/// Which table to backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationTarget {
    Reviews,
    Categories,
}

impl MigrationTarget {
    fn table(self) -> &'static str {
        match self {
            Self::Reviews => tables::REVIEWS,
            Self::Categories => tables::CATEGORIES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Compute patches without writing them
    pub dry_run: bool,
    /// Restrict to one table; both when `None`
    pub only: Option<MigrationTarget>,
    /// Maximum concurrent row updates
    pub max_concurrent: usize,
}

/// Per-table counts. In a dry run `updated` counts rows that would change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} updated, {} skipped, {} failed",
            self.updated, self.skipped, self.failed
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub reviews: Option<MigrationOutcome>,
    pub categories: Option<MigrationOutcome>,
}

impl MigrationReport {
    pub fn failed(&self) -> usize {
        [self.reviews, self.categories]
            .iter()
            .flatten()
            .map(|o| o.failed)
            .sum()
    }
}

/// Run the backfill. A failed table read aborts; failed row writes are
/// logged and counted.
pub async fn run(
    backend: &dyn DataBackend,
    site: &SiteConfig,
    options: &MigrationOptions,
) -> Result<MigrationReport> {
    let wants = |target| options.only.is_none_or(|only| only == target);
    let mut report = MigrationReport::default();

    if wants(MigrationTarget::Reviews) {
        log::info!("Migrating reviews...");
        let reviews: Vec<Review> = select_as(backend, &Query::table(tables::REVIEWS)).await?;
        let patches = reviews
            .iter()
            .map(|r| (json!(r.id), review_patch(r, site)))
            .collect();
        report.reviews = Some(apply(backend, MigrationTarget::Reviews, patches, options).await);
    }

    if wants(MigrationTarget::Categories) {
        log::info!("Migrating categories...");
        let categories: Vec<Category> =
            select_as(backend, &Query::table(tables::CATEGORIES)).await?;
        let patches = categories
            .iter()
            .map(|c| (json!(c.id), category_patch(c, site)))
            .collect();
        report.categories =
            Some(apply(backend, MigrationTarget::Categories, patches, options).await);
    }

    Ok(report)
}

async fn apply(
    backend: &dyn DataBackend,
    target: MigrationTarget,
    patches: Vec<(Value, Map<String, Value>)>,
    options: &MigrationOptions,
) -> MigrationOutcome {
    let table = target.table();
    let mut outcome = MigrationOutcome::default();
    let mut pending = Vec::new();
    for (id, patch) in patches {
        if patch.is_empty() {
            outcome.skipped += 1;
        } else if options.dry_run {
            log::info!("[dry-run] {table} {id}: would set {:?}", patch.keys().collect::<Vec<_>>());
            outcome.updated += 1;
        } else {
            pending.push((id, patch));
        }
    }

    let results: Vec<bool> = stream::iter(pending)
        .map(|(id, patch)| async move {
            match backend
                .update(&Query::table(table).eq("id", id.clone()), Value::Object(patch))
                .await
            {
                Ok(rows) if !rows.is_empty() => true,
                Ok(_) => {
                    log::error!("Updating {table} {id} matched no rows");
                    false
                }
                Err(e) => {
                    log::error!("Error updating {table} {id}: {e}");
                    false
                }
            }
        })
        .buffer_unordered(options.max_concurrent.max(1))
        .collect()
        .await;

    for ok in results {
        if ok {
            outcome.updated += 1;
        } else {
            outcome.failed += 1;
        }
    }
    log::info!("{table}: {outcome}");
    outcome
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

fn short_description(description: Option<&str>) -> Option<Value> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| json!(truncate_chars(d, META_DESCRIPTION_MAX)))
}

/// Columns to fill on a review.
pub fn review_patch(review: &Review, site: &SiteConfig) -> Map<String, Value> {
    let mut patch = Map::new();
    if is_blank(review.meta_title.as_deref()) {
        patch.insert("meta_title".into(), json!(review.title));
    }
    if is_blank(review.meta_description.as_deref()) {
        if let Some(description) = short_description(review.description.as_deref()) {
            patch.insert("meta_description".into(), description);
        }
    }
    if review.keywords.as_ref().is_none_or(Vec::is_empty) {
        let keywords = generate_keywords(review.content.as_deref(), &site.keywords);
        patch.insert("keywords".into(), json!(keywords));
    }
    if is_blank(review.canonical_url.as_deref()) {
        patch.insert("canonical_url".into(), json!(Review::path_for(&review.slug)));
    }
    if review.read_time.is_none_or(|minutes| minutes <= 0) {
        let words = review
            .content
            .as_deref()
            .map_or(0, |c| c.split_whitespace().count());
        let minutes = words.div_ceil(WORDS_PER_MINUTE).max(1);
        patch.insert("read_time".into(), json!(minutes));
    }
    if is_blank(review.status.as_deref()) {
        patch.insert("status".into(), json!(DEFAULT_STATUS));
    }
    patch
}

/// Columns to fill on a category.
pub fn category_patch(category: &Category, site: &SiteConfig) -> Map<String, Value> {
    let mut patch = Map::new();
    if is_blank(category.meta_title.as_deref()) {
        patch.insert(
            "meta_title".into(),
            json!(format!("{} Reviews and Comparisons", category.name)),
        );
    }
    if is_blank(category.meta_description.as_deref()) {
        if let Some(description) = short_description(category.description.as_deref()) {
            patch.insert("meta_description".into(), description);
        }
    }
    if category.keywords.as_ref().is_none_or(Vec::is_empty) {
        let keywords = generate_keywords(category.description.as_deref(), &site.keywords);
        patch.insert("keywords".into(), json!(keywords));
    }
    patch
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::backend::MemoryBackend;
    use crate::error::AppError;
    use crate::models::AuthUser;

    fn options(dry_run: bool) -> MigrationOptions {
        MigrationOptions {
            dry_run,
            only: None,
            max_concurrent: 2,
        }
    }

    async fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend
            .seed(
                tables::REVIEWS,
                [
                    json!({
                        "id": "r1", "title": "Acme Blender", "slug": "acme-blender",
                        "description": "d".repeat(200),
                        "content": "blender ".repeat(450),
                    }),
                    json!({
                        "id": "r2", "title": "Done", "slug": "done",
                        "meta_title": "Done", "meta_description": "ok", "keywords": ["done"],
                        "canonical_url": "/review/done", "read_time": 3, "status": "draft",
                    }),
                ],
            )
            .await
            .unwrap();
        backend
            .seed(
                tables::CATEGORIES,
                [json!({"id": 1, "name": "Kitchen", "slug": "kitchen", "meta_title": "Custom"})],
            )
            .await
            .unwrap();
        backend
    }

    fn row<'a>(rows: &'a [Value], id: &str) -> &'a Value {
        rows.iter().find(|r| r["id"] == json!(id)).unwrap()
    }

    #[test]
    fn test_review_patch_fills_only_missing() {
        let review = Review {
            id: "r".into(),
            title: "Title".into(),
            slug: "title".into(),
            meta_title: Some("Kept".into()),
            content: Some("one two three".into()),
            ..Review::default()
        };
        let patch = review_patch(&review, &SiteConfig::default());

        assert!(!patch.contains_key("meta_title"));
        assert!(!patch.contains_key("meta_description"));
        assert_eq!(patch["canonical_url"], "/review/title");
        assert_eq!(patch["read_time"], 1);
        assert_eq!(patch["status"], "published");
        assert_eq!(patch["keywords"], json!(["three"]));
    }

    #[test]
    fn test_category_patch() {
        let category = Category {
            id: 1,
            name: "Audio".into(),
            slug: "audio".into(),
            description: Some("Speakers and headphones".into()),
            ..Category::default()
        };
        let patch = category_patch(&category, &SiteConfig::default());
        assert_eq!(patch["meta_title"], "Audio Reviews and Comparisons");
        assert_eq!(patch["meta_description"], "Speakers and headphones");
        assert_eq!(patch["keywords"], json!(["speakers", "headphones"]));
    }

    #[tokio::test]
    async fn test_run_patches_rows() {
        let backend = backend().await;
        let report = run(&backend, &SiteConfig::default(), &options(false)).await.unwrap();

        assert_eq!(
            report.reviews,
            Some(MigrationOutcome { updated: 1, skipped: 1, failed: 0 })
        );
        assert_eq!(report.categories.unwrap().updated, 1);

        let reviews = backend.rows(tables::REVIEWS).await;
        let r1 = row(&reviews, "r1");
        assert_eq!(r1["meta_title"], "Acme Blender");
        assert_eq!(r1["meta_description"].as_str().unwrap().len(), META_DESCRIPTION_MAX);
        assert_eq!(r1["read_time"], 3);
        assert_eq!(r1["keywords"], json!(["blender"]));
        assert_eq!(row(&reviews, "r2")["status"], "draft");

        let categories = backend.rows(tables::CATEGORIES).await;
        assert_eq!(categories[0]["meta_title"], "Custom");
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let backend = backend().await;
        let before = backend.rows(tables::REVIEWS).await;
        let report = run(&backend, &SiteConfig::default(), &options(true)).await.unwrap();

        assert_eq!(report.reviews.unwrap().updated, 1);
        assert_eq!(backend.rows(tables::REVIEWS).await, before);
    }

    #[tokio::test]
    async fn test_only_one_table() {
        let backend = backend().await;
        let options = MigrationOptions {
            only: Some(MigrationTarget::Categories),
            ..options(false)
        };
        let report = run(&backend, &SiteConfig::default(), &options).await.unwrap();
        assert!(report.reviews.is_none());
        assert!(report.categories.is_some());
    }

    /// Delegates to the memory backend but refuses every update.
    struct ReadOnly(MemoryBackend);

    #[async_trait]
    impl DataBackend for ReadOnly {
        async fn select(&self, query: &Query) -> Result<Vec<Value>> {
            self.0.select(query).await
        }
        async fn insert(&self, table: &str, row: Value) -> Result<Value> {
            self.0.insert(table, row).await
        }
        async fn update(&self, _query: &Query, _patch: Value) -> Result<Vec<Value>> {
            Err(AppError::forbidden("read only"))
        }
        async fn delete(&self, query: &Query) -> Result<Vec<Value>> {
            self.0.delete(query).await
        }
        async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
            self.0.rpc(function, args).await
        }
        async fn current_user(&self, access_token: &str) -> Result<Option<AuthUser>> {
            self.0.current_user(access_token).await
        }
        async fn sign_out(&self, access_token: &str) -> Result<()> {
            self.0.sign_out(access_token).await
        }
        fn for_session(&self, _access_token: &str) -> Arc<dyn DataBackend> {
            Arc::new(ReadOnly(self.0.clone()))
        }
    }

    #[tokio::test]
    async fn test_row_failures_are_counted() {
        let backend = ReadOnly(backend().await);
        let report = run(&backend, &SiteConfig::default(), &options(false)).await.unwrap();

        assert_eq!(
            report.reviews,
            Some(MigrationOutcome { updated: 0, skipped: 1, failed: 1 })
        );
        assert_eq!(report.failed(), 2);
    }
}
