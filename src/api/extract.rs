//! Request extractors for the signed-in user.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::api::AppState;
use crate::error::AppError;
use crate::models::AuthUser;

/// Raw token from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl BearerToken {
    fn from_parts(parts: &Parts) -> Option<Self> {
        let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
        let (scheme, token) = value.trim().split_once(' ')?;
        let token = token.trim();
        (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty())
            .then(|| Self(token.to_string()))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_parts(parts).ok_or(AppError::Unauthorized)
    }
}

/// Signed-in user; rejects the request with 401 otherwise.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthUser);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_parts(parts).ok_or(AppError::Unauthorized)?;
        let user = state.services.auth.authenticate(&token).await?;
        Ok(Self(user))
    }
}

/// Signed-in user if any. A missing or rejected token reads as anonymous.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthUser>);

impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(BearerToken(token)) = BearerToken::from_parts(parts) else {
            return Ok(Self(None));
        };
        match state.services.auth.authenticate(&token).await {
            Ok(user) => Ok(Self(Some(user))),
            Err(AppError::Unauthorized) => Ok(Self(None)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(authorization: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/me");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(
            BearerToken::from_parts(&parts(Some("Bearer abc"))).map(|t| t.0),
            Some("abc".to_string())
        );
        assert_eq!(
            BearerToken::from_parts(&parts(Some("bearer  xyz "))).map(|t| t.0),
            Some("xyz".to_string())
        );
        assert!(BearerToken::from_parts(&parts(Some("Basic abc"))).is_none());
        assert!(BearerToken::from_parts(&parts(Some("Bearer "))).is_none());
        assert!(BearerToken::from_parts(&parts(None)).is_none());
    }
}
