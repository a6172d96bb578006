//! Category listing.

use std::collections::HashMap;
use std::time::Duration;

use crate::backend::{Query, select_as};
use crate::cache::QueryKey;
use crate::error::{AppError, Result};
use crate::models::{Category, CategoryWithCount, tables};
use crate::services::ServiceContext;

/// Categories change rarely; keep them longer than other reads.
const CATEGORIES_STALE_TIME: Duration = Duration::from_secs(60);

#[derive(Debug, serde::Deserialize)]
struct CategoryIdRow {
    category_id: Option<i64>,
}

/// Service for reading categories.
#[derive(Clone)]
pub struct CategoryService {
    ctx: ServiceContext,
}

impl CategoryService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub fn cache_key() -> QueryKey {
        QueryKey::from(["allCategories"])
    }

    /// Every category ordered by name, with the number of reviews in each.
    pub async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>> {
        let options = self
            .ctx
            .cache
            .options()
            .with_stale_time(CATEGORIES_STALE_TIME);
        self.ctx
            .cache
            .fetch(Self::cache_key(), options, || self.load_with_counts())
            .await
    }

    async fn load_with_counts(&self) -> Result<Vec<CategoryWithCount>> {
        let backend = self.ctx.backend.as_ref();
        let categories: Vec<Category> =
            select_as(backend, &Query::table(tables::CATEGORIES).order_asc("name")).await?;
        let review_rows: Vec<CategoryIdRow> =
            select_as(backend, &Query::table(tables::REVIEWS).select("category_id")).await?;

        let mut counts: HashMap<i64, usize> = HashMap::new();
        for id in review_rows.into_iter().filter_map(|r| r.category_id) {
            *counts.entry(id).or_default() += 1;
        }

        log::debug!("Loaded {} categories", categories.len());
        Ok(categories
            .into_iter()
            .map(|category| CategoryWithCount {
                review_count: counts.get(&category.id).copied().unwrap_or(0),
                category,
            })
            .collect())
    }

    /// Categories without counts, ordered by name.
    pub async fn list(&self) -> Result<Vec<Category>> {
        Ok(self
            .list_with_counts()
            .await?
            .into_iter()
            .map(|c| c.category)
            .collect())
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Category> {
        self.find_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::not_found("category", slug))
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        Ok(self.list().await?.into_iter().find(|c| c.slug == slug))
    }

    /// Lookup table from id to category.
    pub async fn by_id(&self) -> Result<HashMap<i64, Category>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect())
    }
}
