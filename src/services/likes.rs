//! Review likes.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::backend::{Query, select_as};
use crate::cache::QueryKey;
use crate::error::{AppError, Result};
use crate::models::{AuthUser, LikeState, tables};
use crate::services::ServiceContext;
use crate::services::counters::{self, CounterField};

#[derive(Debug, Deserialize)]
struct LikedReview {
    review_id: String,
}

/// Service for liking reviews.
#[derive(Clone)]
pub struct LikeService {
    ctx: ServiceContext,
}

impl LikeService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    fn cache_key(user_id: &str) -> QueryKey {
        QueryKey::from(["userLikes", user_id])
    }

    /// Ids of the reviews `user` has liked.
    pub async fn user_likes(&self, user: &AuthUser) -> Result<Vec<String>> {
        self.ctx
            .cache
            .fetch(Self::cache_key(&user.id), self.ctx.cache.options(), || async move {
                let query = Query::table(tables::REVIEW_LIKES)
                    .select("review_id")
                    .eq("user_id", user.id.as_str())
                    .order_desc("created_at");
                let rows: Vec<LikedReview> =
                    select_as(self.ctx.as_user(user).as_ref(), &query).await?;
                Ok(rows.into_iter().map(|r| r.review_id).collect::<Vec<_>>())
            })
            .await
    }

    /// Whether `user` has liked the review.
    pub async fn has_liked(&self, user: &AuthUser, review_id: &str) -> Result<bool> {
        Ok(self.user_likes(user).await?.iter().any(|id| id == review_id))
    }

    /// Like the review if not yet liked, otherwise remove the like.
    pub async fn toggle_review_like(&self, user: &AuthUser, review_id: &str) -> Result<LikeState> {
        let backend = self.ctx.as_user(user);
        let exists = !backend
            .select(
                &Query::table(tables::REVIEWS)
                    .select("id")
                    .eq("id", review_id)
                    .limit(1),
            )
            .await?
            .is_empty();
        if !exists {
            return Err(AppError::not_found("review", review_id));
        }

        let mine = Query::table(tables::REVIEW_LIKES)
            .eq("review_id", review_id)
            .eq("user_id", user.id.as_str());
        let existing = backend.select(&mine).await?;

        let (liked, count) = if existing.is_empty() {
            let row = json!({"review_id": review_id, "user_id": user.id});
            let result = counters::write_with_counter(
                backend.as_ref(),
                CounterField::ReviewLikes,
                review_id,
                1,
                backend.insert(tables::REVIEW_LIKES, row),
                |stored: Value| {
                    let backend = backend.clone();
                    async move {
                        let id = stored.get("id").cloned().unwrap_or(Value::Null);
                        backend
                            .delete(&Query::table(tables::REVIEW_LIKES).eq("id", id))
                            .await
                            .map(|_| ())
                    }
                },
            )
            .await;
            match result {
                Ok((_, count)) => (true, count),
                // A concurrent request already stored this like
                Err(AppError::Conflict(_)) => (true, None),
                Err(e) => return Err(e),
            }
        } else {
            let (_, count) = counters::write_with_counter(
                backend.as_ref(),
                CounterField::ReviewLikes,
                review_id,
                -(existing.len() as i64),
                backend.delete(&mine),
                |removed: Vec<Value>| {
                    let backend = backend.clone();
                    async move {
                        for row in removed {
                            backend.insert(tables::REVIEW_LIKES, row).await?;
                        }
                        Ok(())
                    }
                },
            )
            .await?;
            (false, count)
        };

        let count = match count {
            Some(count) => count,
            None => counters::read(backend.as_ref(), CounterField::ReviewLikes, review_id).await?,
        };
        log::info!(
            "User {} {} review {review_id}",
            user.id,
            if liked { "liked" } else { "unliked" }
        );

        self.ctx.cache.invalidate(&Self::cache_key(&user.id)).await;
        self.ctx.cache.invalidate(&QueryKey::from(["review"])).await;
        Ok(LikeState { liked, count })
    }
}
