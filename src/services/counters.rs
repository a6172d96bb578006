// src/services/counters.rs

//! The one way counter columns change.
//!
//! A counter is never computed on the client. Every change is a row write
//! (like, unlike, comment, delete) followed by the server-side
//! `adjust_counter` function, which adds a delta atomically and never lets
//! the value drop below zero. If the function call fails, the row write is
//! undone so rows and counters do not drift apart.

use std::future::Future;

use serde_json::{Value, json};

use crate::backend::{ADJUST_COUNTER_RPC, DataBackend};
use crate::error::Result;
use crate::models::tables;

/// Counter columns maintained by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    ReviewLikes,
    ReviewComments,
    ReviewViews,
    CommentLikes,
}

impl CounterField {
    pub fn table(self) -> &'static str {
        match self {
            Self::ReviewLikes | Self::ReviewComments | Self::ReviewViews => tables::REVIEWS,
            Self::CommentLikes => tables::COMMENTS,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::ReviewLikes | Self::CommentLikes => "likes_count",
            Self::ReviewComments => "comments_count",
            Self::ReviewViews => "view_count",
        }
    }
}

/// Add `delta` to a counter. Returns the new value when the backend reports it.
pub async fn adjust(
    backend: &dyn DataBackend,
    field: CounterField,
    row_id: &str,
    delta: i64,
) -> Result<Option<i64>> {
    let args = json!({
        "p_table": field.table(),
        "p_id": row_id,
        "p_column": field.column(),
        "p_delta": delta,
    });
    let value = backend.rpc(ADJUST_COUNTER_RPC, args).await?;
    Ok(match value {
        Value::Number(n) => n.as_i64(),
        Value::Array(rows) => rows.first().and_then(Value::as_i64),
        _ => None,
    })
}

/// Perform `write`, then adjust the counter; undo the write if that fails.
///
/// `undo` receives what `write` produced. A failing undo is logged; the
/// counter error is what the caller sees.
pub async fn write_with_counter<T, W, U, UF>(
    backend: &dyn DataBackend,
    field: CounterField,
    row_id: &str,
    delta: i64,
    write: W,
    undo: U,
) -> Result<(T, Option<i64>)>
where
    W: Future<Output = Result<T>>,
    U: FnOnce(T) -> UF,
    UF: Future<Output = Result<()>>,
{
    let written = write.await?;
    if delta == 0 {
        return Ok((written, None));
    }

    match adjust(backend, field, row_id, delta).await {
        Ok(count) => Ok((written, count)),
        Err(e) => {
            log::warn!(
                "{}.{} update for {row_id} failed, undoing row write: {e}",
                field.table(),
                field.column()
            );
            if let Err(undo_err) = undo(written).await {
                log::error!("Undo after failed counter update for {row_id} failed: {undo_err}");
            }
            Err(e)
        }
    }
}

/// Current value of a counter column, for backends that return nothing
/// from `adjust_counter`.
pub async fn read(backend: &dyn DataBackend, field: CounterField, row_id: &str) -> Result<i64> {
    let query = crate::backend::Query::table(field.table())
        .select(field.column())
        .eq("id", row_id)
        .limit(1);
    let rows = backend.select(&query).await?;
    Ok(rows
        .first()
        .and_then(|row| row.get(field.column()))
        .and_then(Value::as_i64)
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::{MemoryBackend, Query};
    use crate::error::AppError;

    async fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend
            .seed(tables::REVIEWS, [json!({"id": "r1", "title": "T", "slug": "t"})])
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn adjust_returns_new_value() {
        let backend = backend().await;
        assert_eq!(adjust(&backend, CounterField::ReviewViews, "r1", 1).await.unwrap(), Some(1));
        assert_eq!(adjust(&backend, CounterField::ReviewViews, "r1", 1).await.unwrap(), Some(2));
        assert_eq!(read(&backend, CounterField::ReviewViews, "r1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_counter_undoes_the_row_write() {
        let backend = backend().await;
        backend.fail_rpc(ADJUST_COUNTER_RPC).await;

        let like_query = Query::table(tables::REVIEW_LIKES).eq("review_id", "r1");
        let result = write_with_counter(
            &backend,
            CounterField::ReviewLikes,
            "r1",
            1,
            backend.insert(tables::REVIEW_LIKES, json!({"review_id": "r1", "user_id": "u1"})),
            |row: Value| {
                let backend = &backend;
                async move {
                    let id = row["id"].clone();
                    backend
                        .delete(&Query::table(tables::REVIEW_LIKES).eq("id", id))
                        .await
                        .map(|_| ())
                }
            },
        )
        .await;

        assert!(matches!(result, Err(AppError::Api { status: 500, .. })));
        assert!(backend.select(&like_query).await.unwrap().is_empty());
        assert_eq!(read(&backend, CounterField::ReviewLikes, "r1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn zero_delta_skips_the_rpc() {
        let backend = backend().await;
        backend.fail_rpc(ADJUST_COUNTER_RPC).await;
        let (value, count) = write_with_counter(
            &backend,
            CounterField::ReviewComments,
            "r1",
            0,
            async { Ok(5) },
            |_| async { Ok(()) },
        )
        .await
        .unwrap();
        assert_eq!((value, count), (5, None));
    }
}
