// src/services/reviews.rs

//! Review pages, listings and tags.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::backend::{Query, select_as, select_one};
use crate::cache::QueryKey;
use crate::error::{AppError, Result};
use crate::models::{
    Category, CategoryRef, Page, PageRequest, Review, ReviewDetail, ReviewSort, ReviewSummary,
    tables,
};
use crate::services::counters::{self, CounterField};
use crate::services::{CategoryService, ServiceContext};

/// Number of reviews on the home page carousel.
pub const DEFAULT_FEATURED_LIMIT: usize = 6;

/// Listing options for a category page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryFilter {
    pub sort: ReviewSort,
    /// Title substring
    pub search: Option<String>,
    /// Reviews carrying any of these tags
    pub tags: Vec<String>,
    pub page: usize,
    pub per_page: usize,
}

impl Default for CategoryFilter {
    fn default() -> Self {
        Self {
            sort: ReviewSort::Latest,
            search: None,
            tags: Vec::new(),
            page: 1,
            per_page: 12,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TagsRow {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Service for reading reviews.
#[derive(Clone)]
pub struct ReviewService {
    ctx: ServiceContext,
    categories: CategoryService,
}

impl ReviewService {
    pub fn new(ctx: ServiceContext, categories: CategoryService) -> Self {
        Self { ctx, categories }
    }

    /// Full review for its page.
    pub async fn get_by_slug(&self, slug: &str) -> Result<ReviewDetail> {
        let key = QueryKey::from(["review", slug]);
        self.ctx
            .cache
            .fetch(key, self.ctx.cache.options(), || self.load_detail(slug))
            .await
    }

    async fn load_detail(&self, slug: &str) -> Result<ReviewDetail> {
        let review: Review = select_one(
            self.ctx.backend.as_ref(),
            Query::table(tables::REVIEWS).eq("slug", slug),
        )
        .await?
        .ok_or_else(|| AppError::not_found("review", slug))?;

        let category = match review.category_id {
            Some(id) => self.categories.by_id().await?.remove(&id),
            None => None,
        };
        Ok(ReviewDetail::from_review(review, category.as_ref()))
    }

    /// Count a page view. Failures are logged and otherwise ignored.
    pub async fn record_view(&self, review_id: &str) {
        let backend = self.ctx.backend.as_ref();
        if let Err(e) = counters::adjust(backend, CounterField::ReviewViews, review_id, 1).await {
            log::warn!("Failed to record view for review {review_id}: {e}");
        }
    }

    /// Featured reviews, newest first.
    pub async fn featured(&self, limit: usize) -> Result<Vec<ReviewSummary>> {
        let limit = limit.clamp(1, crate::models::MAX_PER_PAGE);
        let key = QueryKey::from(["featuredReviews", limit.to_string().as_str()]);
        self.ctx
            .cache
            .fetch(key, self.ctx.cache.options(), || async move {
                let query = Query::table(tables::REVIEWS)
                    .select(ReviewSummary::COLUMNS)
                    .eq("featured", true)
                    .order_desc("created_at")
                    .limit(limit);
                let rows = select_as(self.ctx.backend.as_ref(), &query).await?;
                self.with_categories(rows).await
            })
            .await
    }

    /// Newest reviews for infinite scroll.
    pub async fn latest(&self, page: usize, per_page: usize) -> Result<Page<ReviewSummary>> {
        let request = PageRequest::new(page, per_page);
        let key = QueryKey::from([
            "reviews".to_string(),
            "latest".to_string(),
            request.page.to_string(),
            request.per_page.to_string(),
        ]);
        self.ctx
            .cache
            .fetch(key, self.ctx.cache.options(), || async move {
                let query = Query::table(tables::REVIEWS)
                    .select(ReviewSummary::COLUMNS)
                    .order_desc("created_at");
                self.fetch_page(query, request).await
            })
            .await
    }

    /// Reviews in one category with sorting, title search and tag filters.
    pub async fn by_category(
        &self,
        slug: &str,
        filter: &CategoryFilter,
    ) -> Result<Page<ReviewSummary>> {
        let category_id = self.categories.get_by_slug(slug).await?.id;
        let request = PageRequest::new(filter.page, filter.per_page);
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        let key = QueryKey::new([
            "reviews",
            "category",
            slug,
            filter.sort.as_str(),
            search.as_deref().unwrap_or_default(),
            filter.tags.join(",").as_str(),
            request.page.to_string().as_str(),
            request.per_page.to_string().as_str(),
        ]);
        self.ctx
            .cache
            .fetch(key, self.ctx.cache.options(), || {
                let search = search.clone();
                async move {
                    let mut query = Query::table(tables::REVIEWS)
                        .select(ReviewSummary::COLUMNS)
                        .eq("category_id", category_id);
                    if let Some(term) = search {
                        query = query.ilike("title", term);
                    }
                    if !filter.tags.is_empty() {
                        query = query.overlaps("tags", &filter.tags);
                    }
                    query = query.order_desc(filter.sort.column());
                    if filter.sort != ReviewSort::Latest {
                        query = query.order_desc("created_at");
                    }
                    self.fetch_page(query, request).await
                }
            })
            .await
    }

    /// Distinct tags, sorted, optionally within one category.
    pub async fn tags(&self, category_slug: Option<&str>) -> Result<Vec<String>> {
        let category = match category_slug {
            Some(slug) => Some(self.categories.get_by_slug(slug).await?),
            None => None,
        };
        let key = QueryKey::from(["tags", category_slug.unwrap_or("all")]);
        self.ctx
            .cache
            .fetch(key, self.ctx.cache.options(), || {
                let category_id = category.as_ref().map(|c| c.id);
                async move {
                    let mut query = Query::table(tables::REVIEWS).select("tags");
                    if let Some(id) = category_id {
                        query = query.eq("category_id", id);
                    }
                    let rows: Vec<TagsRow> = select_as(self.ctx.backend.as_ref(), &query).await?;
                    let tags: BTreeSet<String> = rows
                        .into_iter()
                        .flat_map(|r| r.tags.unwrap_or_default())
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect();
                    Ok(tags.into_iter().collect::<Vec<_>>())
                }
            })
            .await
    }

    /// Every review slug, for the sitemap.
    pub async fn all_slugs(&self) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct SlugRow {
            slug: String,
        }
        let query = Query::table(tables::REVIEWS)
            .select("slug")
            .order_asc("slug");
        let rows: Vec<SlugRow> = select_as(self.ctx.backend.as_ref(), &query).await?;
        Ok(rows.into_iter().map(|r| r.slug).collect())
    }

    /// Fetch one page past the end to learn whether another page exists.
    async fn fetch_page(&self, query: Query, request: PageRequest) -> Result<Page<ReviewSummary>> {
        let query = query
            .offset(request.offset())
            .limit(request.per_page + 1);
        let rows = select_as(self.ctx.backend.as_ref(), &query).await?;
        let rows = self.with_categories(rows).await?;
        Ok(Page::from_overfetch(rows, request.page, request.per_page))
    }

    /// Fill `category` on each summary from the cached category list.
    pub(crate) async fn with_categories(
        &self,
        mut rows: Vec<ReviewSummary>,
    ) -> Result<Vec<ReviewSummary>> {
        let by_id: HashMap<i64, Category> = self.categories.by_id().await?;
        for row in &mut rows {
            let category = row.category_id.and_then(|id| by_id.get(&id));
            row.category = Some(category.map(CategoryRef::from).unwrap_or_default());
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::services::testing::seeded;

    fn ids(page: &[ReviewSummary]) -> Vec<&str> {
        page.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn detail_resolves_category() {
        let (_, services) = seeded().await;
        let detail = services.reviews.get_by_slug("quiet-kettle").await.unwrap();
        assert_eq!(detail.category.name, "Kitchen");
        assert_eq!(detail.canonical_url, "/review/quiet-kettle");

        let orphan = services.reviews.get_by_slug("mystery-gadget").await.unwrap();
        assert_eq!(orphan.category.slug, "uncategorized");
        assert_eq!(orphan.rating, 0.0);
    }

    #[tokio::test]
    async fn missing_review_is_not_found() {
        let (_, services) = seeded().await;
        let err = services.reviews.get_by_slug("nope").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "review", .. }));
    }

    #[tokio::test]
    async fn record_view_bumps_counter() {
        let (backend, services) = seeded().await;
        services.reviews.record_view("r2").await;
        services.reviews.record_view("r2").await;

        let rows = backend.rows(tables::REVIEWS).await;
        let kettle = rows.iter().find(|r| r["id"] == json!("r2")).unwrap();
        assert_eq!(kettle["view_count"], json!(2));
    }

    #[tokio::test]
    async fn record_view_swallows_failures() {
        let (backend, services) = seeded().await;
        backend.fail_rpc(crate::backend::ADJUST_COUNTER_RPC).await;
        services.reviews.record_view("r2").await;
    }

    #[tokio::test]
    async fn featured_newest_first() {
        let (_, services) = seeded().await;
        let featured = services.reviews.featured(DEFAULT_FEATURED_LIMIT).await.unwrap();
        assert_eq!(ids(&featured), vec!["r3", "r1"]);
        assert_eq!(featured[0].category.as_ref().unwrap().slug, "audio");
    }

    #[tokio::test]
    async fn latest_pages_with_has_more() {
        let (_, services) = seeded().await;
        let first = services.reviews.latest(1, 3).await.unwrap();
        assert_eq!(ids(&first.items), vec!["r4", "r3", "r2"]);
        assert!(first.has_more);

        let second = services.reviews.latest(2, 3).await.unwrap();
        assert_eq!(ids(&second.items), vec!["r1"]);
        assert!(!second.has_more);
    }

    #[tokio::test]
    async fn category_listing_sorts_and_filters() {
        let (_, services) = seeded().await;
        let filter = CategoryFilter {
            sort: ReviewSort::HighestRated,
            ..CategoryFilter::default()
        };
        let page = services.reviews.by_category("kitchen", &filter).await.unwrap();
        assert_eq!(ids(&page.items), vec!["r1", "r2"]);

        let filter = CategoryFilter {
            tags: vec!["kettle".into()],
            ..CategoryFilter::default()
        };
        let page = services.reviews.by_category("kitchen", &filter).await.unwrap();
        assert_eq!(ids(&page.items), vec!["r2"]);

        let filter = CategoryFilter {
            search: Some("  blender ".into()),
            ..CategoryFilter::default()
        };
        let page = services.reviews.by_category("kitchen", &filter).await.unwrap();
        assert_eq!(ids(&page.items), vec!["r1"]);
    }

    #[tokio::test]
    async fn category_listing_unknown_slug() {
        let (_, services) = seeded().await;
        let err = services
            .reviews
            .by_category("garden", &CategoryFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn tags_are_distinct_and_sorted() {
        let (_, services) = seeded().await;
        assert_eq!(
            services.reviews.tags(None).await.unwrap(),
            vec!["blender", "headphones", "kettle", "kitchen", "studio"]
        );
        assert_eq!(
            services.reviews.tags(Some("kitchen")).await.unwrap(),
            vec!["blender", "kettle", "kitchen"]
        );
    }
}
