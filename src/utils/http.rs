// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::BackendConfig;

/// Seconds to wait when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &BackendConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Error body returned by the REST and auth endpoints.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "msg", alias = "error_description")]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Check a backend response for error statuses.
///
/// Returns the response unchanged on success. Maps 401 to
/// [`AppError::Unauthorized`], 403 to [`AppError::Forbidden`], 409 and
/// unique-violation bodies (`23505`) to [`AppError::Conflict`], 429 to
/// [`AppError::RateLimited`] and anything else non-2xx to [`AppError::Api`].
pub async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(AppError::RateLimited {
            retry_after_secs: parse_retry_after(&resp),
        });
    }

    let text = resp.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ErrorBody>(&text).ok();
    let is_unique_violation = body
        .as_ref()
        .and_then(|b| b.code.as_ref())
        .is_some_and(|code| code.as_str() == Some("23505"));
    let message = body
        .and_then(|b| b.message)
        .unwrap_or_else(|| text.trim().to_string());

    Err(match status.as_u16() {
        401 => AppError::Unauthorized,
        403 => AppError::forbidden(message),
        409 => AppError::conflict(message),
        _ if is_unique_violation => AppError::conflict(message),
        code => AppError::api(code, message),
    })
}

/// Parse the `Retry-After` header as seconds, falling back to 60 s.
fn parse_retry_after(resp: &reqwest::Response) -> u64 {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}
