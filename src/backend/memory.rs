//! In-process implementation of [`DataBackend`].
//!
//! Keeps each table as a list of JSON rows behind one async lock and applies
//! the server-side rules the services rely on: unique keys, generated ids and
//! timestamps, column defaults and the atomic counter function. Used for
//! offline runs of the server and throughout the tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;

use super::{ADJUST_COUNTER_RPC, DataBackend, Query, require_filters};
use crate::error::{AppError, Result};
use crate::models::{AuthUser, tables};

/// Column sets that must be unique per table (in addition to `id`).
const UNIQUE_KEYS: &[(&str, &[&str])] = &[
    (tables::REVIEWS, &["slug"]),
    (tables::CATEGORIES, &["slug"]),
    (tables::REVIEW_LIKES, &["review_id", "user_id"]),
    (tables::COMMENT_LIKES, &["comment_id", "user_id"]),
    (tables::PROFILES, &["username"]),
];

/// Tables whose primary key is a bigint sequence rather than a uuid.
const NUMERIC_ID_TABLES: &[&str] = &[tables::CATEGORIES];

/// Tables carrying an `updated_at` column maintained on update.
const UPDATED_AT_TABLES: &[&str] = &[tables::REVIEWS, tables::COMMENTS, tables::PROFILES];

/// Counter columns `adjust_counter` may touch.
const COUNTER_COLUMNS: &[(&str, &str)] = &[
    (tables::REVIEWS, "likes_count"),
    (tables::REVIEWS, "comments_count"),
    (tables::REVIEWS, "view_count"),
    (tables::COMMENTS, "likes_count"),
];

#[derive(Default)]
struct State {
    tables: HashMap<String, Vec<Value>>,
    sessions: HashMap<String, AuthUser>,
    failing_rpcs: HashSet<String>,
    next_id: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl State {
    /// Strictly increasing timestamp, even within one clock tick.
    fn next_timestamp(&mut self) -> String {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn next_id(&mut self, table: &str) -> Value {
        let rows = self.tables.get(table).map(Vec::as_slice).unwrap_or_default();
        if NUMERIC_ID_TABLES.contains(&table) {
            let max = rows
                .iter()
                .filter_map(|r| r.get("id").and_then(Value::as_i64))
                .max()
                .unwrap_or(0);
            return json!(max + 1);
        }

        loop {
            self.next_id += 1;
            let id = format!("00000000-0000-4000-8000-{:012x}", self.next_id);
            let taken = self
                .tables
                .get(table)
                .is_some_and(|rows| rows.iter().any(|r| r.get("id") == Some(&json!(id))));
            if !taken {
                return json!(id);
            }
        }
    }

    /// Fill generated columns on a new row.
    fn prepare_insert(&mut self, table: &str, row: Value) -> Result<Value> {
        let Value::Object(mut fields) = row else {
            return Err(AppError::validation(format!(
                "insert into {table} expects an object"
            )));
        };

        if fields.get("id").is_none_or(Value::is_null) {
            let id = self.next_id(table);
            fields.insert("id".to_string(), id);
        }
        if fields.get("created_at").is_none_or(Value::is_null) {
            let ts = self.next_timestamp();
            fields.insert("created_at".to_string(), json!(ts));
        }
        for (column, default) in column_defaults(table) {
            if fields.get(column).is_none_or(Value::is_null) {
                fields.insert(column.to_string(), default);
            }
        }
        Ok(Value::Object(fields))
    }
}

fn column_defaults(table: &str) -> Vec<(&'static str, Value)> {
    match table {
        tables::REVIEWS => vec![
            ("likes_count", json!(0)),
            ("comments_count", json!(0)),
            ("view_count", json!(0)),
        ],
        tables::COMMENTS => vec![("likes_count", json!(0))],
        _ => Vec::new(),
    }
}

/// Find a row in `others` sharing a unique key with `row`.
fn find_conflict(table: &str, row: &Value, others: &[&Value]) -> Option<String> {
    let key_sets = std::iter::once(&["id"][..]).chain(
        UNIQUE_KEYS
            .iter()
            .filter(|(t, _)| *t == table)
            .map(|(_, cols)| *cols),
    );

    for columns in key_sets {
        let values: Vec<&Value> = columns
            .iter()
            .map(|c| row.get(*c).unwrap_or(&Value::Null))
            .collect();
        if values.iter().any(|v| v.is_null()) {
            continue;
        }
        let clash = others.iter().any(|other| {
            columns
                .iter()
                .zip(&values)
                .all(|(c, v)| other.get(*c) == Some(*v))
        });
        if clash {
            return Some(format!(
                "duplicate key value violates unique constraint \"{table}_{}_key\"",
                columns.join("_")
            ));
        }
    }
    None
}

fn project(row: &Value, columns: Option<&str>) -> Value {
    let Some(columns) = columns.filter(|c| c.trim() != "*") else {
        return row.clone();
    };
    let mut projected = Map::new();
    for column in columns.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        if let Some(value) = row.get(column) {
            projected.insert(column.to_string(), value.clone());
        }
    }
    Value::Object(projected)
}

/// [`DataBackend`] holding tables in memory. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert rows as-is (subject to the usual defaults and unique keys).
    pub async fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) -> Result<()> {
        for row in rows {
            self.insert(table, row).await?;
        }
        Ok(())
    }

    /// Make `access_token` resolve to `user`.
    pub async fn register_session(&self, access_token: &str, user: AuthUser) {
        let mut state = self.state.lock().await;
        state.sessions.insert(access_token.to_string(), user);
    }

    /// Make every later call of `function` fail with a 500.
    pub async fn fail_rpc(&self, function: &str) {
        self.state
            .lock()
            .await
            .failing_rpcs
            .insert(function.to_string());
    }

    pub async fn clear_rpc_failures(&self) {
        self.state.lock().await.failing_rpcs.clear();
    }

    /// Snapshot of a table's rows in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<Value> {
        let state = self.state.lock().await;
        state.tables.get(table).cloned().unwrap_or_default()
    }

    fn adjust_counter(state: &mut State, args: &Value) -> Result<Value> {
        let arg = |name: &str| {
            args.get(name)
                .ok_or_else(|| AppError::validation(format!("{ADJUST_COUNTER_RPC}: missing {name}")))
        };
        let table = arg("p_table")?.as_str().unwrap_or_default().to_string();
        let column = arg("p_column")?.as_str().unwrap_or_default().to_string();
        let id = arg("p_id")?.clone();
        let delta = arg("p_delta")?
            .as_i64()
            .ok_or_else(|| AppError::validation("p_delta must be an integer"))?;

        if !COUNTER_COLUMNS.contains(&(table.as_str(), column.as_str())) {
            return Err(AppError::validation(format!(
                "{table}.{column} is not a counter column"
            )));
        }

        let row = state
            .tables
            .get_mut(&table)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|r| super::Filter::Eq("id".into(), id.clone()).matches(r))
            })
            .ok_or_else(|| AppError::not_found("row", format!("{table}/{id}")))?;

        let current = row.get(&column).and_then(Value::as_i64).unwrap_or(0);
        let next = (current + delta).max(0);
        if let Some(fields) = row.as_object_mut() {
            fields.insert(column, json!(next));
        }
        Ok(json!(next))
    }
}

#[async_trait]
impl DataBackend for MemoryBackend {
    async fn select(&self, query: &Query) -> Result<Vec<Value>> {
        let state = self.state.lock().await;
        let Some(rows) = state.tables.get(&query.table) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<&Value> = rows.iter().filter(|r| query.matches(r)).collect();
        matched.sort_by(|a, b| query.compare_rows(a, b));

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| project(row, query.columns.as_deref()))
            .collect())
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        let mut state = self.state.lock().await;
        let row = state.prepare_insert(table, row)?;

        let rows = state.tables.entry(table.to_string()).or_default();
        let existing: Vec<&Value> = rows.iter().collect();
        if let Some(message) = find_conflict(table, &row, &existing) {
            return Err(AppError::conflict(message));
        }
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>> {
        require_filters(query)?;
        let Value::Object(patch) = patch else {
            return Err(AppError::validation("update expects an object"));
        };

        let mut state = self.state.lock().await;
        let touch_updated_at = UPDATED_AT_TABLES.contains(&query.table.as_str())
            && !patch.contains_key("updated_at");
        let stamp = touch_updated_at.then(|| state.next_timestamp());

        let Some(rows) = state.tables.get_mut(&query.table) else {
            return Ok(Vec::new());
        };

        let mut next = rows.clone();
        let mut updated_idx = Vec::new();
        for (idx, row) in next.iter_mut().enumerate() {
            if !query.matches(row) {
                continue;
            }
            if let Some(fields) = row.as_object_mut() {
                for (k, v) in &patch {
                    fields.insert(k.clone(), v.clone());
                }
                if let Some(stamp) = &stamp {
                    fields.insert("updated_at".to_string(), json!(stamp));
                }
            }
            updated_idx.push(idx);
        }

        for &idx in &updated_idx {
            let others: Vec<&Value> = next
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != idx)
                .map(|(_, r)| r)
                .collect();
            if let Some(message) = find_conflict(&query.table, &next[idx], &others) {
                return Err(AppError::conflict(message));
            }
        }

        let updated = updated_idx.iter().map(|&i| next[i].clone()).collect();
        *rows = next;
        Ok(updated)
    }

    async fn delete(&self, query: &Query) -> Result<Vec<Value>> {
        require_filters(query)?;
        let mut state = self.state.lock().await;
        let Some(rows) = state.tables.get_mut(&query.table) else {
            return Ok(Vec::new());
        };

        let (removed, kept): (Vec<Value>, Vec<Value>) =
            rows.drain(..).partition(|row| query.matches(row));
        *rows = kept;
        Ok(removed)
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        let mut state = self.state.lock().await;
        if state.failing_rpcs.contains(function) {
            return Err(AppError::api(500, format!("{function} failed")));
        }
        match function {
            ADJUST_COUNTER_RPC => Self::adjust_counter(&mut state, &args),
            other => Err(AppError::api(
                404,
                format!("Could not find the function public.{other}"),
            )),
        }
    }

    async fn current_user(&self, access_token: &str) -> Result<Option<AuthUser>> {
        let state = self.state.lock().await;
        Ok(state.sessions.get(access_token).map(|user| AuthUser {
            access_token: access_token.to_string(),
            ..user.clone()
        }))
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        self.state.lock().await.sessions.remove(access_token);
        Ok(())
    }

    fn for_session(&self, _access_token: &str) -> Arc<dyn DataBackend> {
        Arc::new(self.clone())
    }
}
