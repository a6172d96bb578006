// src/backend/rest.rs

//! HTTPS client for the hosted service's REST and auth endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;
use url::Url;

use super::{DataBackend, Query, require_filters};
use crate::error::{AppError, Result};
use crate::models::{AuthUser, BackendConfig};
use crate::utils::http::{check_response, create_async_client};

/// [`DataBackend`] over PostgREST (`/rest/v1`) and GoTrue (`/auth/v1`).
#[derive(Clone)]
pub struct RestBackend {
    client: reqwest::Client,
    base: Url,
    anon_key: String,
    /// User token for row-level security; anonymous when `None`
    access_token: Option<String>,
}

impl std::fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestBackend")
            .field("base", &self.base.as_str())
            .field("authenticated", &self.access_token.is_some())
            .finish()
    }
}

impl RestBackend {
    /// Create an anonymous client from configuration.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let mut base = Url::parse(&config.url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client: create_async_client(config)?,
            base,
            anon_key: config.anon_key.clone(),
            access_token: None,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        self.endpoint(&format!("rest/v1/{table}"))
    }

    /// Request with `apikey` and a bearer token (the user's, else the anon key).
    fn request(&self, method: Method, url: Url, bearer: Option<&str>) -> RequestBuilder {
        let token = bearer
            .or(self.access_token.as_deref())
            .unwrap_or(&self.anon_key);
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    fn write_request(&self, method: Method, url: Url) -> RequestBuilder {
        self.request(method, url, None)
            .header("Prefer", "return=representation")
    }

    async fn send_rows(&self, request: RequestBuilder) -> Result<Vec<Value>> {
        let response = check_response(request.send().await?).await?;
        let body: Value = response.json().await?;
        match body {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }
}

#[async_trait]
impl DataBackend for RestBackend {
    async fn select(&self, query: &Query) -> Result<Vec<Value>> {
        log::debug!("GET {} {:?}", query.table, query.to_params());
        let request = self
            .request(Method::GET, self.table_url(&query.table)?, None)
            .query(&query.to_params());
        self.send_rows(request).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        log::debug!("POST {table}");
        let request = self
            .write_request(Method::POST, self.table_url(table)?)
            .json(&row);
        let mut rows = self.send_rows(request).await?;
        if rows.is_empty() {
            // Policies may hide the inserted row from the caller
            return Ok(row);
        }
        Ok(rows.swap_remove(0))
    }

    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>> {
        require_filters(query)?;
        log::debug!("PATCH {} {:?}", query.table, query.to_params());
        let request = self
            .write_request(Method::PATCH, self.table_url(&query.table)?)
            .query(&query.to_params())
            .json(&patch);
        self.send_rows(request).await
    }

    async fn delete(&self, query: &Query) -> Result<Vec<Value>> {
        require_filters(query)?;
        log::debug!("DELETE {} {:?}", query.table, query.to_params());
        let request = self
            .write_request(Method::DELETE, self.table_url(&query.table)?)
            .query(&query.to_params());
        self.send_rows(request).await
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        log::debug!("RPC {function}");
        let url = self.endpoint(&format!("rest/v1/rpc/{function}"))?;
        let response = self
            .request(Method::POST, url, None)
            .json(&args)
            .send()
            .await?;
        let text = check_response(response).await?.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn current_user(&self, access_token: &str) -> Result<Option<AuthUser>> {
        let url = self.endpoint("auth/v1/user")?;
        let response = self
            .request(Method::GET, url, Some(access_token))
            .send()
            .await?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Ok(None);
        }

        let payload: Value = check_response(response).await?.json().await?;
        Ok(AuthUser::from_auth_payload(&payload, access_token))
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let url = self.endpoint("auth/v1/logout")?;
        let response = self
            .request(Method::POST, url, Some(access_token))
            .send()
            .await?;
        match check_response(response).await {
            Ok(_) | Err(AppError::Unauthorized) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn for_session(&self, access_token: &str) -> Arc<dyn DataBackend> {
        Arc::new(Self {
            access_token: Some(access_token.to_string()),
            ..self.clone()
        })
    }
}
