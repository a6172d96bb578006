//! Session resolution.
//!
//! Sign-in itself happens between the browser and the hosted auth service.
//! This side only turns a bearer token into an [`AuthUser`] and revokes it on
//! sign-out.

use std::time::Duration;

use crate::cache::{QueryKey, RetryPolicy};
use crate::error::{AppError, Result};
use crate::models::AuthUser;
use crate::services::ServiceContext;
use crate::utils::sha256_hex;

/// How long a resolved session is trusted before asking the backend again.
const SESSION_STALE_TIME: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AuthService {
    ctx: ServiceContext,
}

impl AuthService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    // Tokens are hashed so they never sit in the cache key space
    fn cache_key(access_token: &str) -> QueryKey {
        QueryKey::from(["session".to_string(), sha256_hex(access_token)])
    }

    /// The user behind `access_token`, or `Unauthorized`.
    pub async fn authenticate(&self, access_token: &str) -> Result<AuthUser> {
        let access_token = access_token.trim();
        if access_token.is_empty() {
            return Err(AppError::Unauthorized);
        }

        let options = self
            .ctx
            .cache
            .options()
            .with_stale_time(SESSION_STALE_TIME)
            .with_retry(RetryPolicy::none());
        self.ctx
            .cache
            .fetch(Self::cache_key(access_token), options, || async move {
                self.ctx
                    .backend
                    .current_user(access_token)
                    .await?
                    .ok_or(AppError::Unauthorized)
            })
            .await
    }

    /// Revoke the session and forget it locally.
    pub async fn sign_out(&self, access_token: &str) -> Result<()> {
        let access_token = access_token.trim();
        self.ctx.cache.remove(&Self::cache_key(access_token)).await;
        self.ctx.backend.sign_out(access_token).await?;
        log::info!("Session signed out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::seeded;

    #[tokio::test]
    async fn known_token_resolves_user() {
        let (_, services) = seeded().await;
        let user = services.auth.authenticate("token-u1").await.unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.access_token, "token-u1");
    }

    #[tokio::test]
    async fn unknown_or_empty_token_is_unauthorized() {
        let (_, services) = seeded().await;
        for token in ["", "  ", "forged"] {
            let err = services.auth.authenticate(token).await.unwrap_err();
            assert!(matches!(err, AppError::Unauthorized));
        }
    }

    #[tokio::test]
    async fn sign_out_revokes_session() {
        let (_, services) = seeded().await;
        services.auth.authenticate("token-u2").await.unwrap();
        services.auth.sign_out("token-u2").await.unwrap();

        let err = services.auth.authenticate("token-u2").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }
}
