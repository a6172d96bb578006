// src/services/comments.rs

//! Threaded comments and comment likes.
//!
//! Threads are one level deep: a reply to a reply is attached to the
//! top-level comment. Top-level comments list newest first, replies oldest
//! first.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::{Value, json};

use crate::backend::{DataBackend, Query, select_as, select_one};
use crate::cache::QueryKey;
use crate::error::{AppError, Result};
use crate::models::{
    AuthUser, Comment, CommentAuthor, CommentView, LikeState, Profile, tables,
};
use crate::services::counters::{self, CounterField};
use crate::services::{ProfileService, ServiceContext};

/// Rows and authors of one review's comments, independent of the viewer.
#[derive(Debug, Clone)]
struct Thread {
    comments: Vec<Comment>,
    profiles: HashMap<String, Profile>,
}

#[derive(Debug, Deserialize)]
struct LikedRow {
    comment_id: String,
}

/// Service for reading and writing comments.
#[derive(Clone)]
pub struct CommentService {
    ctx: ServiceContext,
    profiles: ProfileService,
}

impl CommentService {
    pub fn new(ctx: ServiceContext, profiles: ProfileService) -> Self {
        Self { ctx, profiles }
    }

    pub fn cache_key(review_id: &str) -> QueryKey {
        QueryKey::from(["comments", review_id])
    }

    /// Comments on a review, threaded, with `user_liked` set for `viewer`.
    pub async fn list(&self, review_id: &str, viewer: Option<&AuthUser>) -> Result<Vec<CommentView>> {
        let thread = self
            .ctx
            .cache
            .fetch(Self::cache_key(review_id), self.ctx.cache.options(), || {
                self.load_thread(review_id)
            })
            .await?;

        let liked = match viewer {
            Some(user) if !thread.comments.is_empty() => self.liked_by(review_id, &thread, user).await?,
            _ => HashSet::new(),
        };
        Ok(build_views(&thread, &liked))
    }

    async fn load_thread(&self, review_id: &str) -> Result<Thread> {
        let query = Query::table(tables::COMMENTS)
            .eq("review_id", review_id)
            .order_asc("created_at");
        let comments: Vec<Comment> = select_as(self.ctx.backend.as_ref(), &query).await?;

        let author_ids: Vec<String> = comments
            .iter()
            .map(|c| c.user_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let profiles = self.profiles.get_many(&author_ids).await?;
        Ok(Thread { comments, profiles })
    }

    async fn liked_by(&self, review_id: &str, thread: &Thread, user: &AuthUser) -> Result<HashSet<String>> {
        let key = Self::cache_key(review_id).with("likedBy").with(user.id.as_str());
        let comment_ids: Vec<String> = thread.comments.iter().map(|c| c.id.clone()).collect();
        self.ctx
            .cache
            .fetch(key, self.ctx.cache.options(), || {
                let comment_ids = comment_ids.clone();
                async move {
                    let query = Query::table(tables::COMMENT_LIKES)
                        .select("comment_id")
                        .eq("user_id", user.id.as_str())
                        .in_list("comment_id", comment_ids);
                    let rows: Vec<LikedRow> = select_as(self.ctx.backend.as_ref(), &query).await?;
                    Ok(rows.into_iter().map(|r| r.comment_id).collect::<HashSet<_>>())
                }
            })
            .await
    }

    async fn find(&self, backend: &dyn DataBackend, comment_id: &str) -> Result<Comment> {
        select_one(backend, Query::table(tables::COMMENTS).eq("id", comment_id))
            .await?
            .ok_or_else(|| AppError::not_found("comment", comment_id))
    }

    /// Post a comment or reply as `user`.
    pub async fn add(
        &self,
        user: &AuthUser,
        review_id: &str,
        content: &str,
        parent_id: Option<&str>,
    ) -> Result<CommentView> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::validation("comment cannot be empty"));
        }
        let max_length = self.ctx.config.comments.max_length;
        if content.chars().count() > max_length {
            return Err(AppError::validation(format!(
                "comment must be at most {max_length} characters"
            )));
        }

        let backend = self.ctx.as_user(user);
        let review_exists = !backend
            .select(
                &Query::table(tables::REVIEWS)
                    .select("id")
                    .eq("id", review_id)
                    .limit(1),
            )
            .await?
            .is_empty();
        if !review_exists {
            return Err(AppError::not_found("review", review_id));
        }

        let parent_id = match parent_id.map(str::trim).filter(|p| !p.is_empty()) {
            Some(id) => {
                let parent = self.find(backend.as_ref(), id).await?;
                if parent.review_id != review_id {
                    return Err(AppError::validation(
                        "reply must belong to the same review as its parent",
                    ));
                }
                Some(parent.parent_id.unwrap_or(parent.id))
            }
            None => None,
        };

        let profile = match self.profiles.ensure(user).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                log::warn!("Could not ensure profile for {}: {e}", user.id);
                None
            }
        };

        let row = json!({
            "review_id": review_id,
            "user_id": user.id,
            "parent_id": parent_id,
            "content": content,
        });
        let (stored, _) = counters::write_with_counter(
            backend.as_ref(),
            CounterField::ReviewComments,
            review_id,
            1,
            backend.insert(tables::COMMENTS, row),
            |stored: Value| {
                let backend = backend.clone();
                async move {
                    let id = stored.get("id").cloned().unwrap_or(Value::Null);
                    backend
                        .delete(&Query::table(tables::COMMENTS).eq("id", id))
                        .await
                        .map(|_| ())
                }
            },
        )
        .await?;
        let comment: Comment = serde_json::from_value(stored)?;
        log::info!("User {} commented on review {review_id}", user.id);

        self.invalidate_review(review_id).await;
        Ok(CommentView {
            author: author_for(&comment.user_id, profile.as_ref()),
            id: comment.id,
            content: comment.content,
            date: comment.created_at,
            likes: 0,
            user_liked: false,
            replies: Vec::new(),
        })
    }

    /// Delete the user's own comment with its replies and their likes.
    /// Returns how many comments were removed.
    pub async fn delete(&self, user: &AuthUser, comment_id: &str) -> Result<usize> {
        let backend = self.ctx.as_user(user);
        let comment = self.find(backend.as_ref(), comment_id).await?;
        if comment.user_id != user.id {
            return Err(AppError::forbidden("only the author can delete a comment"));
        }

        let replies: Vec<Comment> = select_as(
            backend.as_ref(),
            &Query::table(tables::COMMENTS).eq("parent_id", comment_id),
        )
        .await?;
        let ids: Vec<String> = std::iter::once(comment.id.clone())
            .chain(replies.into_iter().map(|r| r.id))
            .collect();

        let write = async {
            let likes = backend
                .delete(&Query::table(tables::COMMENT_LIKES).in_list("comment_id", ids.clone()))
                .await?;
            match backend
                .delete(&Query::table(tables::COMMENTS).in_list("id", ids.clone()))
                .await
            {
                Ok(comments) => Ok((comments, likes)),
                Err(e) => {
                    restore(backend.as_ref(), tables::COMMENT_LIKES, likes).await;
                    Err(e)
                }
            }
        };
        let undo = |(comments, likes): (Vec<Value>, Vec<Value>)| {
            let backend = backend.clone();
            async move {
                restore(backend.as_ref(), tables::COMMENTS, parents_first(comments)).await;
                restore(backend.as_ref(), tables::COMMENT_LIKES, likes).await;
                Ok(())
            }
        };

        let expected = ids.len() as i64;
        let ((removed, _), _) = counters::write_with_counter(
            backend.as_ref(),
            CounterField::ReviewComments,
            &comment.review_id,
            -expected,
            write,
            undo,
        )
        .await?;

        if removed.len() as i64 != expected {
            log::warn!(
                "Deleted {} of {expected} comments in thread {comment_id}",
                removed.len()
            );
        }
        log::info!("User {} deleted comment {comment_id}", user.id);
        self.invalidate_review(&comment.review_id).await;
        Ok(removed.len())
    }

    /// Like or unlike a comment.
    pub async fn toggle_like(&self, user: &AuthUser, comment_id: &str) -> Result<LikeState> {
        let backend = self.ctx.as_user(user);
        let comment = self.find(backend.as_ref(), comment_id).await?;
        let mine = Query::table(tables::COMMENT_LIKES)
            .eq("comment_id", comment_id)
            .eq("user_id", user.id.as_str());
        let existing = backend.select(&mine).await?;

        let (liked, count) = if existing.is_empty() {
            let row = json!({"comment_id": comment_id, "user_id": user.id});
            let insert = backend.insert(tables::COMMENT_LIKES, row);
            let result = counters::write_with_counter(
                backend.as_ref(),
                CounterField::CommentLikes,
                comment_id,
                1,
                insert,
                |stored: Value| delete_by_id(backend.clone(), tables::COMMENT_LIKES, stored),
            )
            .await;
            match result {
                Ok((_, count)) => (true, count),
                // Liked concurrently; the counter was bumped by that request
                Err(AppError::Conflict(_)) => (true, None),
                Err(e) => return Err(e),
            }
        } else {
            let (removed, count) = counters::write_with_counter(
                backend.as_ref(),
                CounterField::CommentLikes,
                comment_id,
                -(existing.len() as i64),
                backend.delete(&mine),
                |removed: Vec<Value>| {
                    let backend = backend.clone();
                    async move {
                        restore(backend.as_ref(), tables::COMMENT_LIKES, removed).await;
                        Ok(())
                    }
                },
            )
            .await?;
            log::debug!("Removed {} like rows for comment {comment_id}", removed.len());
            (false, count)
        };

        let count = match count {
            Some(count) => count,
            None => counters::read(backend.as_ref(), CounterField::CommentLikes, comment_id).await?,
        };
        self.ctx
            .cache
            .invalidate(&Self::cache_key(&comment.review_id))
            .await;
        Ok(LikeState { liked, count })
    }

    async fn invalidate_review(&self, review_id: &str) {
        self.ctx.cache.invalidate(&Self::cache_key(review_id)).await;
        self.ctx.cache.invalidate(&QueryKey::from(["review"])).await;
    }
}

/// Put deleted rows back, logging any that fail.
async fn restore(backend: &dyn DataBackend, table: &str, rows: Vec<Value>) {
    for row in rows {
        if let Err(e) = backend.insert(table, row).await {
            log::error!("Failed to restore row in {table}: {e}");
        }
    }
}

async fn delete_by_id(
    backend: std::sync::Arc<dyn DataBackend>,
    table: &'static str,
    row: Value,
) -> Result<()> {
    let id = row.get("id").cloned().unwrap_or(Value::Null);
    backend
        .delete(&Query::table(table).eq("id", id))
        .await
        .map(|_| ())
}

/// Top-level rows before replies so a restore never orphans a reply.
fn parents_first(mut rows: Vec<Value>) -> Vec<Value> {
    rows.sort_by_key(|row| !row.get("parent_id").is_none_or(Value::is_null));
    rows
}

fn author_for(user_id: &str, profile: Option<&Profile>) -> CommentAuthor {
    CommentAuthor {
        id: user_id.to_string(),
        name: profile
            .and_then(Profile::shown_name)
            .unwrap_or(CommentAuthor::ANONYMOUS)
            .to_string(),
        avatar: profile.and_then(|p| p.avatar_url.clone()),
    }
}

/// Arrange rows (oldest first) into newest-first threads.
fn build_views(thread: &Thread, liked: &HashSet<String>) -> Vec<CommentView> {
    let view = |comment: &Comment| CommentView {
        id: comment.id.clone(),
        author: author_for(&comment.user_id, thread.profiles.get(&comment.user_id)),
        content: comment.content.clone(),
        date: comment.created_at,
        likes: comment.likes_count.unwrap_or(0),
        user_liked: liked.contains(&comment.id),
        replies: Vec::new(),
    };

    let known: HashSet<&str> = thread.comments.iter().map(|c| c.id.as_str()).collect();
    let mut replies: HashMap<&str, Vec<CommentView>> = HashMap::new();
    let mut roots = Vec::new();
    for comment in &thread.comments {
        match comment.parent_id.as_deref() {
            Some(parent) if known.contains(parent) => {
                replies.entry(parent).or_default().push(view(comment));
            }
            _ => roots.push(comment),
        }
    }

    roots
        .into_iter()
        .rev()
        .map(|root| CommentView {
            replies: replies.remove(root.id.as_str()).unwrap_or_default(),
            ..view(root)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ADJUST_COUNTER_RPC;
    use crate::services::testing::{seeded, user};

    async fn comments_count(backend: &crate::backend::MemoryBackend, review_id: &str) -> i64 {
        counters::read(backend, CounterField::ReviewComments, review_id)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn added_comment_appears_on_next_read() {
        let (backend, services) = seeded().await;
        let u1 = user("u1");

        assert!(services.comments.list("r1", None).await.unwrap().is_empty());
        let added = services
            .comments
            .add(&u1, "r1", "  Great blender!  ", None)
            .await
            .unwrap();
        assert_eq!(added.content, "Great blender!");
        assert_eq!(added.author.name, "User u1");

        let list = services.comments.list("r1", None).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, added.id);
        assert_eq!(backend.rows(tables::COMMENTS).await.len(), 1);
        assert_eq!(comments_count(&backend, "r1").await, 1);
    }

    #[tokio::test]
    async fn empty_and_oversized_comments_are_rejected() {
        let (backend, services) = seeded().await;
        let u1 = user("u1");

        let err = services.comments.add(&u1, "r1", "   ", None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = services
            .comments
            .add(&u1, "r1", &"x".repeat(2_001), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(backend.rows(tables::COMMENTS).await.is_empty());
    }

    #[tokio::test]
    async fn comment_on_missing_review_is_not_found() {
        let (_, services) = seeded().await;
        let err = services
            .comments
            .add(&user("u1"), "nope", "hello", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "review", .. }));
    }

    #[tokio::test]
    async fn replies_nest_one_level() {
        let (_, services) = seeded().await;
        let (u1, u2) = (user("u1"), user("u2"));

        let first = services.comments.add(&u1, "r1", "first", None).await.unwrap();
        let second = services.comments.add(&u2, "r1", "second", None).await.unwrap();
        let reply = services
            .comments
            .add(&u2, "r1", "reply", Some(&first.id))
            .await
            .unwrap();
        services
            .comments
            .add(&u1, "r1", "reply to reply", Some(&reply.id))
            .await
            .unwrap();

        let list = services.comments.list("r1", None).await.unwrap();
        let top: Vec<&str> = list.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(top, vec![second.id.as_str(), first.id.as_str()]);

        let replies: Vec<&str> = list[1].replies.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(replies, vec!["reply", "reply to reply"]);
        assert!(list[1].replies.iter().all(|r| r.replies.is_empty()));
    }

    #[tokio::test]
    async fn reply_to_other_review_is_rejected() {
        let (_, services) = seeded().await;
        let u1 = user("u1");
        let parent = services.comments.add(&u1, "r1", "on r1", None).await.unwrap();

        let err = services
            .comments
            .add(&u1, "r2", "wrong thread", Some(&parent.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_removes_thread_and_adjusts_count() {
        let (backend, services) = seeded().await;
        let (u1, u2) = (user("u1"), user("u2"));

        let root = services.comments.add(&u1, "r1", "root", None).await.unwrap();
        let reply = services
            .comments
            .add(&u2, "r1", "reply", Some(&root.id))
            .await
            .unwrap();
        services.comments.toggle_like(&u1, &reply.id).await.unwrap();
        services.comments.add(&u2, "r1", "other", None).await.unwrap();
        assert_eq!(comments_count(&backend, "r1").await, 3);

        let err = services.comments.delete(&u2, &root.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        assert_eq!(services.comments.delete(&u1, &root.id).await.unwrap(), 2);
        assert_eq!(comments_count(&backend, "r1").await, 1);
        assert!(backend.rows(tables::COMMENT_LIKES).await.is_empty());
        assert_eq!(services.comments.list("r1", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_counter_rolls_back_comment() {
        let (backend, services) = seeded().await;
        backend.fail_rpc(ADJUST_COUNTER_RPC).await;

        let result = services.comments.add(&user("u1"), "r1", "hello", None).await;
        assert!(result.is_err());
        assert!(backend.rows(tables::COMMENTS).await.is_empty());
        assert_eq!(comments_count(&backend, "r1").await, 0);
    }

    #[tokio::test]
    async fn failed_counter_restores_deleted_thread() {
        let (backend, services) = seeded().await;
        let u1 = user("u1");
        let root = services.comments.add(&u1, "r1", "root", None).await.unwrap();
        services
            .comments
            .add(&u1, "r1", "reply", Some(&root.id))
            .await
            .unwrap();

        backend.fail_rpc(ADJUST_COUNTER_RPC).await;
        assert!(services.comments.delete(&u1, &root.id).await.is_err());
        assert_eq!(backend.rows(tables::COMMENTS).await.len(), 2);
        assert_eq!(comments_count(&backend, "r1").await, 2);
    }

    #[tokio::test]
    async fn like_toggle_flips_state_and_count() {
        let (_, services) = seeded().await;
        let (u1, u2) = (user("u1"), user("u2"));
        let comment = services.comments.add(&u1, "r1", "like me", None).await.unwrap();

        let liked = services.comments.toggle_like(&u2, &comment.id).await.unwrap();
        assert_eq!(liked, LikeState { liked: true, count: 1 });

        let list = services.comments.list("r1", Some(&u2)).await.unwrap();
        assert!(list[0].user_liked);
        assert_eq!(list[0].likes, 1);
        assert!(!services.comments.list("r1", Some(&u1)).await.unwrap()[0].user_liked);

        let unliked = services.comments.toggle_like(&u2, &comment.id).await.unwrap();
        assert_eq!(unliked, LikeState { liked: false, count: 0 });
        assert!(!services.comments.list("r1", Some(&u2)).await.unwrap()[0].user_liked);
    }

    #[test]
    fn orphan_replies_become_top_level() {
        let thread = Thread {
            comments: vec![Comment {
                id: "c2".into(),
                review_id: "r1".into(),
                user_id: "u1".into(),
                parent_id: Some("gone".into()),
                content: "orphan".into(),
                ..Comment::default()
            }],
            profiles: HashMap::new(),
        };

        let views = build_views(&thread, &HashSet::new());
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].author.name, "Anonymous");
    }
}
