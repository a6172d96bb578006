//! Review search with filters and relevance ranking.
//!
//! The backend narrows candidates (substring match on title, content or
//! description; category; tags). Relevance ranking happens here because it
//! needs per-field weights the REST filter language cannot express.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::backend::{Filter, Query, select_as};
use crate::cache::QueryKey;
use crate::error::Result;
use crate::models::{Page, PageRequest, Review, ReviewSort, ReviewSummary, tables};
use crate::services::{CategoryService, ServiceContext};

/// Most candidate rows ranked in memory for one relevance search.
const RELEVANCE_CANDIDATE_LIMIT: usize = 500;

const TITLE_WEIGHT: u32 = 3;
const TAG_WEIGHT: u32 = 2;
const DESCRIPTION_WEIGHT: u32 = 1;
const CONTENT_WEIGHT: u32 = 1;

/// Result orderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchSort {
    #[default]
    Relevance,
    Latest,
    HighestRated,
    MostCommented,
    MostLiked,
}

impl SearchSort {
    fn as_review_sort(self) -> Option<ReviewSort> {
        match self {
            Self::Relevance => None,
            Self::Latest => Some(ReviewSort::Latest),
            Self::HighestRated => Some(ReviewSort::HighestRated),
            Self::MostCommented => Some(ReviewSort::MostCommented),
            Self::MostLiked => Some(ReviewSort::MostLiked),
        }
    }

    fn as_str(self) -> &'static str {
        self.as_review_sort()
            .map(ReviewSort::as_str)
            .unwrap_or("relevance")
    }
}

/// What the user searched for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    pub q: Option<String>,
    /// Category slug
    pub category: Option<String>,
    /// Every listed tag must be present
    pub tags: Vec<String>,
    pub sort: SearchSort,
    pub page: usize,
    pub per_page: usize,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            q: None,
            category: None,
            tags: Vec::new(),
            sort: SearchSort::Relevance,
            page: 1,
            per_page: 12,
        }
    }
}

impl SearchFilters {
    fn query_text(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    fn category_slug(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    fn clean_tags(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Nothing to search for.
    pub fn is_empty(&self) -> bool {
        self.query_text().is_none() && self.category_slug().is_none() && self.clean_tags().is_empty()
    }

    fn cache_key(&self, request: PageRequest) -> QueryKey {
        QueryKey::new([
            "search",
            self.query_text().unwrap_or_default(),
            self.category_slug().unwrap_or_default(),
            self.clean_tags().join(",").as_str(),
            self.sort.as_str(),
            request.page.to_string().as_str(),
            request.per_page.to_string().as_str(),
        ])
    }
}

/// Service for searching reviews.
#[derive(Clone)]
pub struct SearchService {
    ctx: ServiceContext,
    categories: CategoryService,
}

impl SearchService {
    pub fn new(ctx: ServiceContext, categories: CategoryService) -> Self {
        Self { ctx, categories }
    }

    pub async fn search(&self, filters: &SearchFilters) -> Result<Page<ReviewSummary>> {
        let request = PageRequest::new(filters.page, filters.per_page);
        if filters.is_empty() {
            return Ok(empty_page(request));
        }

        let category_id = match filters.category_slug() {
            Some(slug) => match self.categories.find_by_slug(slug).await? {
                Some(category) => Some(category.id),
                None => {
                    log::debug!("Search for unknown category {slug:?}");
                    return Ok(empty_page(request));
                }
            },
            None => None,
        };

        self.ctx
            .cache
            .fetch(filters.cache_key(request), self.ctx.cache.options(), || {
                self.run(filters, category_id, request)
            })
            .await
    }

    async fn run(
        &self,
        filters: &SearchFilters,
        category_id: Option<i64>,
        request: PageRequest,
    ) -> Result<Page<ReviewSummary>> {
        let backend = self.ctx.backend.as_ref();
        let text = filters.query_text();

        let mut query = Query::table(tables::REVIEWS);
        if let Some(q) = text {
            query = query.or(vec![
                Filter::ILike("title".into(), q.to_string()),
                Filter::ILike("content".into(), q.to_string()),
                Filter::ILike("description".into(), q.to_string()),
            ]);
        }
        if let Some(id) = category_id {
            query = query.eq("category_id", id);
        }
        let tags = filters.clean_tags();
        if !tags.is_empty() {
            query = query.contains_all("tags", &tags);
        }

        let sort = match (filters.sort.as_review_sort(), text) {
            (Some(sort), _) => sort,
            (None, None) => ReviewSort::Latest,
            (None, Some(q)) => {
                let query = query
                    .select(format!("{},content", ReviewSummary::COLUMNS))
                    .order_desc("created_at")
                    .limit(RELEVANCE_CANDIDATE_LIMIT);
                let candidates: Vec<Review> = select_as(backend, &query).await?;
                let ranked = rank_by_relevance(candidates, q);
                let rows: Vec<ReviewSummary> = ranked
                    .iter()
                    .skip(request.offset())
                    .take(request.per_page + 1)
                    .map(ReviewSummary::from)
                    .collect();
                return self.finish(rows, request).await;
            }
        };

        let mut query = query
            .select(ReviewSummary::COLUMNS)
            .order_desc(sort.column());
        if sort != ReviewSort::Latest {
            query = query.order_desc("created_at");
        }
        let query = query
            .offset(request.offset())
            .limit(request.per_page + 1);
        let rows = select_as(backend, &query).await?;
        self.finish(rows, request).await
    }

    async fn finish(&self, rows: Vec<ReviewSummary>, request: PageRequest) -> Result<Page<ReviewSummary>> {
        let by_id = self.categories.by_id().await?;
        let rows = rows
            .into_iter()
            .map(|mut row| {
                let category = row.category_id.and_then(|id| by_id.get(&id));
                row.category = Some(category.map(Into::into).unwrap_or_default());
                row
            })
            .collect();
        Ok(Page::from_overfetch(rows, request.page, request.per_page))
    }
}

fn empty_page(request: PageRequest) -> Page<ReviewSummary> {
    Page {
        items: Vec::new(),
        page: request.page,
        per_page: request.per_page,
        has_more: false,
    }
}

/// Lowercase word tokens of a query.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = text.unicode_words().map(str::to_lowercase).collect();
    tokens.dedup();
    tokens
}

/// Weighted token hits across title, tags, description and content.
pub fn relevance_score(review: &Review, tokens: &[String]) -> u32 {
    let title = review.title.to_lowercase();
    let description = review.description.as_deref().unwrap_or_default().to_lowercase();
    let content = review.content.as_deref().unwrap_or_default().to_lowercase();
    let tags: Vec<String> = review
        .tags
        .iter()
        .flatten()
        .map(|t| t.to_lowercase())
        .collect();

    tokens
        .iter()
        .map(|token| {
            let mut score = 0;
            if title.contains(token.as_str()) {
                score += TITLE_WEIGHT;
            }
            if tags.iter().any(|t| t.contains(token.as_str())) {
                score += TAG_WEIGHT;
            }
            if description.contains(token.as_str()) {
                score += DESCRIPTION_WEIGHT;
            }
            if content.contains(token.as_str()) {
                score += CONTENT_WEIGHT;
            }
            score
        })
        .sum()
}

/// Highest score first; ties by title.
fn rank_by_relevance(mut reviews: Vec<Review>, q: &str) -> Vec<Review> {
    let tokens = tokenize(q);
    let mut scored: Vec<(u32, Review)> = reviews
        .drain(..)
        .map(|review| (relevance_score(&review, &tokens), review))
        .collect();
    scored.sort_by(|(sa, a), (sb, b)| match sb.cmp(sa) {
        Ordering::Equal => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        other => other,
    });
    scored.into_iter().map(|(_, review)| review).collect()
}
