//! Access to the hosted relational data service.
//!
//! All authoritative state lives in the hosted database; this module is the
//! client side of it:
//!
//! - [`Query`]: table reads and write targets
//! - [`DataBackend`]: the operations the services need (table CRUD, RPC, auth)
//! - [`RestBackend`]: PostgREST/GoTrue over HTTPS
//! - [`MemoryBackend`]: in-process tables for offline runs and tests
//!
//! ```text
//! {url}/rest/v1/{table}        table reads and writes
//! {url}/rest/v1/rpc/{function} server-side functions (counters)
//! {url}/auth/v1/user           session lookup
//! {url}/auth/v1/logout         session revocation
//! ```

pub mod memory;
pub mod query;
pub mod rest;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::AuthUser;

// Re-export for convenience
pub use memory::MemoryBackend;
pub use query::{Filter, Order, Query};
pub use rest::RestBackend;

/// Name of the server-side counter function.
pub const ADJUST_COUNTER_RPC: &str = "adjust_counter";

/// Trait for hosted data service clients.
///
/// Implementations act with the anonymous key unless obtained through
/// [`DataBackend::for_session`], in which case row-level security sees the
/// signed-in user.
#[async_trait]
pub trait DataBackend: Send + Sync {
    /// Read rows matching the query.
    async fn select(&self, query: &Query) -> Result<Vec<Value>>;

    /// Insert one row and return it as stored (with generated columns).
    async fn insert(&self, table: &str, row: Value) -> Result<Value>;

    /// Patch every row matching the query and return the updated rows.
    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>>;

    /// Delete every row matching the query and return the deleted rows.
    async fn delete(&self, query: &Query) -> Result<Vec<Value>>;

    /// Call a server-side function.
    async fn rpc(&self, function: &str, args: Value) -> Result<Value>;

    /// Resolve a session token to its user; `None` if the token is not valid.
    async fn current_user(&self, access_token: &str) -> Result<Option<AuthUser>>;

    /// Revoke a session token.
    async fn sign_out(&self, access_token: &str) -> Result<()>;

    /// A handle whose requests carry the user's token.
    fn for_session(&self, access_token: &str) -> Arc<dyn DataBackend>;
}

/// Shared handle to a backend.
pub type SharedBackend = Arc<dyn DataBackend>;

/// Refuse unfiltered updates and deletes.
pub(crate) fn require_filters(query: &Query) -> Result<()> {
    if query.filters.is_empty() {
        return Err(AppError::validation(format!(
            "refusing to modify every row of {}",
            query.table
        )));
    }
    Ok(())
}

/// Read rows and deserialize them.
pub async fn select_as<T: DeserializeOwned>(
    backend: &dyn DataBackend,
    query: &Query,
) -> Result<Vec<T>> {
    backend
        .select(query)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(AppError::from))
        .collect()
}

/// Read at most one row.
pub async fn select_one<T: DeserializeOwned>(
    backend: &dyn DataBackend,
    query: Query,
) -> Result<Option<T>> {
    let mut rows = select_as::<T>(backend, &query.limit(1)).await?;
    Ok(rows.pop())
}

/// Insert a typed row and deserialize what was stored.
pub async fn insert_as<R: Serialize + ?Sized, T: DeserializeOwned>(
    backend: &dyn DataBackend,
    table: &str,
    row: &R,
) -> Result<T> {
    let stored = backend.insert(table, serde_json::to_value(row)?).await?;
    Ok(serde_json::from_value(stored)?)
}
