// src/api/routes.rs

//! Route handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::instrument;

use crate::api::AppState;
use crate::api::extract::{BearerToken, CurrentUser, MaybeUser};
use crate::error::Result;
use crate::models::{
    AuthUser, Category, CategoryWithCount, CommentView, LikeState, NewComment, Page, Profile,
    ProfileUpdate, ReviewDetail, ReviewSort, ReviewSummary,
};
use crate::seo;
use crate::services::{CategoryFilter, SearchFilters, SearchSort};
use crate::utils::sha256_hex;

type SharedState = State<Arc<AppState>>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PageParams {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FeaturedParams {
    pub limit: Option<usize>,
}

/// Query string of a category listing. `tags` is comma separated.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CategoryReviewParams {
    pub sort: Option<ReviewSort>,
    pub search: Option<String>,
    pub tags: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

/// Query string of a search. `tags` is comma separated.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    pub q: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub sort: Option<SearchSort>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

fn split_tags(tags: Option<&str>) -> Vec<String> {
    tags.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// A review page: the review plus its JSON-LD documents.
#[derive(Debug, Serialize)]
pub struct ReviewPage {
    pub review: ReviewDetail,
    pub structured_data: Value,
    pub breadcrumb: Value,
    /// Whether the caller has liked the review; absent when anonymous
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct Me {
    pub user: AuthUser,
    pub profile: Option<Profile>,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[instrument(skip_all)]
pub async fn sitemap(State(state): SharedState, headers: HeaderMap) -> Result<Response> {
    let body = seo::build_sitemap(&state.services, state.config.site.origin()).await?;
    let etag = format!("\"{}\"", sha256_hex(&body));

    let matches = headers
        .get(IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|tag| tag.trim() == etag));
    if matches {
        return Ok((StatusCode::NOT_MODIFIED, [(ETAG, etag)]).into_response());
    }

    Ok((
        [
            (CONTENT_TYPE, "application/xml".to_string()),
            (CACHE_CONTROL, "public, max-age=3600".to_string()),
            (ETAG, etag),
        ],
        body,
    )
        .into_response())
}

pub async fn robots(State(state): SharedState) -> impl IntoResponse {
    let sitemap_url = format!("{}/sitemap.xml", state.config.site.origin());
    (
        [(CONTENT_TYPE, "text/plain")],
        seo::generate_robots_txt(&sitemap_url),
    )
}

#[instrument(skip_all)]
pub async fn categories(State(state): SharedState) -> Result<Json<Vec<CategoryWithCount>>> {
    Ok(Json(state.services.categories.list_with_counts().await?))
}

#[instrument(skip(state))]
pub async fn category(State(state): SharedState, Path(slug): Path<String>) -> Result<Json<Category>> {
    Ok(Json(state.services.categories.get_by_slug(&slug).await?))
}

#[instrument(skip(state))]
pub async fn category_reviews(
    State(state): SharedState,
    Path(slug): Path<String>,
    Query(params): Query<CategoryReviewParams>,
) -> Result<Json<Page<ReviewSummary>>> {
    let defaults = CategoryFilter::default();
    let filter = CategoryFilter {
        sort: params.sort.unwrap_or(defaults.sort),
        search: params.search,
        tags: split_tags(params.tags.as_deref()),
        page: params.page.unwrap_or(defaults.page),
        per_page: params.per_page.unwrap_or(defaults.per_page),
    };
    Ok(Json(state.services.reviews.by_category(&slug, &filter).await?))
}

#[instrument(skip(state))]
pub async fn category_tags(
    State(state): SharedState,
    Path(slug): Path<String>,
) -> Result<Json<Vec<String>>> {
    Ok(Json(state.services.reviews.tags(Some(&slug)).await?))
}

#[instrument(skip(state))]
pub async fn latest_reviews(
    State(state): SharedState,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<ReviewSummary>>> {
    let page = state
        .services
        .reviews
        .latest(params.page.unwrap_or(1), params.per_page.unwrap_or(12))
        .await?;
    Ok(Json(page))
}

#[instrument(skip(state))]
pub async fn featured_reviews(
    State(state): SharedState,
    Query(params): Query<FeaturedParams>,
) -> Result<Json<Vec<ReviewSummary>>> {
    let limit = params
        .limit
        .unwrap_or(crate::services::DEFAULT_FEATURED_LIMIT);
    Ok(Json(state.services.reviews.featured(limit).await?))
}

#[instrument(skip(state, viewer))]
pub async fn review(
    State(state): SharedState,
    Path(slug): Path<String>,
    MaybeUser(viewer): MaybeUser,
) -> Result<Json<ReviewPage>> {
    let services = &state.services;
    let review = services.reviews.get_by_slug(&slug).await?;
    services.reviews.record_view(&review.id).await;

    let site = &state.config.site;
    let liked = match &viewer {
        Some(user) => Some(services.likes.has_liked(user, &review.id).await?),
        None => None,
    };
    Ok(Json(ReviewPage {
        structured_data: seo::review_structured_data(&review, site),
        breadcrumb: seo::breadcrumb_structured_data(&seo::review_breadcrumbs(&review, site)),
        review,
        liked,
    }))
}

#[instrument(skip_all)]
pub async fn tags(State(state): SharedState) -> Result<Json<Vec<String>>> {
    Ok(Json(state.services.reviews.tags(None).await?))
}

#[instrument(skip(state))]
pub async fn search(
    State(state): SharedState,
    Query(params): Query<SearchParams>,
) -> Result<Json<Page<ReviewSummary>>> {
    let defaults = SearchFilters::default();
    let filters = SearchFilters {
        q: params.q,
        category: params.category,
        tags: split_tags(params.tags.as_deref()),
        sort: params.sort.unwrap_or(defaults.sort),
        page: params.page.unwrap_or(defaults.page),
        per_page: params.per_page.unwrap_or(defaults.per_page),
    };
    Ok(Json(state.services.search.search(&filters).await?))
}

#[instrument(skip(state, viewer))]
pub async fn list_comments(
    State(state): SharedState,
    Path(review_id): Path<String>,
    MaybeUser(viewer): MaybeUser,
) -> Result<Json<Vec<CommentView>>> {
    let comments = state
        .services
        .comments
        .list(&review_id, viewer.as_ref())
        .await?;
    Ok(Json(comments))
}

#[instrument(skip(state, user, body), fields(user = %user.id))]
pub async fn add_comment(
    State(state): SharedState,
    Path(review_id): Path<String>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<NewComment>,
) -> Result<(StatusCode, Json<CommentView>)> {
    let comment = state
        .services
        .comments
        .add(&user, &review_id, &body.content, body.parent_id.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[instrument(skip(state, user), fields(user = %user.id))]
pub async fn delete_comment(
    State(state): SharedState,
    Path(comment_id): Path<String>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Value>> {
    let deleted = state.services.comments.delete(&user, &comment_id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

#[instrument(skip(state, user), fields(user = %user.id))]
pub async fn like_comment(
    State(state): SharedState,
    Path(comment_id): Path<String>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<LikeState>> {
    Ok(Json(state.services.comments.toggle_like(&user, &comment_id).await?))
}

#[instrument(skip(state, user), fields(user = %user.id))]
pub async fn like_review(
    State(state): SharedState,
    Path(review_id): Path<String>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<LikeState>> {
    Ok(Json(state.services.likes.toggle_review_like(&user, &review_id).await?))
}

#[instrument(skip_all, fields(user = %user.id))]
pub async fn me(State(state): SharedState, CurrentUser(user): CurrentUser) -> Json<Me> {
    let profile = match state.services.profiles.ensure(&user).await {
        Ok(profile) => Some(profile),
        Err(e) => {
            tracing::warn!(error = %e, "profile unavailable");
            None
        }
    };
    Json(Me { user, profile })
}

#[instrument(skip_all, fields(user = %user.id))]
pub async fn my_likes(
    State(state): SharedState,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<String>>> {
    Ok(Json(state.services.likes.user_likes(&user).await?))
}

#[instrument(skip_all, fields(user = %user.id))]
pub async fn update_profile(
    State(state): SharedState,
    CurrentUser(user): CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Profile>> {
    Ok(Json(state.services.profiles.update(&user, update).await?))
}

#[instrument(skip(state))]
pub async fn profile(State(state): SharedState, Path(id): Path<String>) -> Result<Json<Profile>> {
    Ok(Json(state.services.profiles.get(&id).await?))
}

#[instrument(skip_all)]
pub async fn logout(State(state): SharedState, BearerToken(token): BearerToken) -> Result<StatusCode> {
    state.services.auth.sign_out(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_tags() {
        assert_eq!(split_tags(Some(" a, b ,,c")), vec!["a", "b", "c"]);
        assert!(split_tags(None).is_empty());
    }
}
