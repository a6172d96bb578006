// src/services/profiles.rs

//! User profiles.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};
use url::Url;

use crate::backend::{Query, select_as, select_one};
use crate::cache::QueryKey;
use crate::error::{AppError, Result};
use crate::models::{AuthUser, Profile, ProfileUpdate, tables};
use crate::services::ServiceContext;

static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]{3,30}$").expect("valid username pattern"));
const DISPLAY_NAME_MAX: usize = 80;
const BIO_MAX: usize = 500;

/// Service for reading and editing profiles.
#[derive(Clone)]
pub struct ProfileService {
    ctx: ServiceContext,
}

impl ProfileService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    fn cache_key(id: &str) -> QueryKey {
        QueryKey::from(["profile", id])
    }

    pub async fn get(&self, id: &str) -> Result<Profile> {
        self.ctx
            .cache
            .fetch(Self::cache_key(id), self.ctx.cache.options(), || async move {
                select_one(
                    self.ctx.backend.as_ref(),
                    Query::table(tables::PROFILES).eq("id", id),
                )
                .await?
                .ok_or_else(|| AppError::not_found("profile", id))
            })
            .await
    }

    /// Profiles for a set of user ids, keyed by id. Missing ids are absent.
    pub async fn get_many(&self, ids: &[String]) -> Result<HashMap<String, Profile>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let query = Query::table(tables::PROFILES).in_list("id", ids.iter().cloned());
        let profiles: Vec<Profile> = select_as(self.ctx.backend.as_ref(), &query).await?;
        Ok(profiles.into_iter().map(|p| (p.id.clone(), p)).collect())
    }

    /// The user's profile, created from identity metadata if missing.
    pub async fn ensure(&self, user: &AuthUser) -> Result<Profile> {
        let backend = self.ctx.as_user(user);
        let query = Query::table(tables::PROFILES).eq("id", user.id.as_str());
        if let Some(profile) = select_one(backend.as_ref(), query.clone()).await? {
            return Ok(profile);
        }

        let row = json!({
            "id": user.id,
            "display_name": user.name,
            "avatar_url": user.avatar,
        });
        match backend.insert(tables::PROFILES, row).await {
            Ok(stored) => {
                log::info!("Created profile for user {}", user.id);
                self.ctx.cache.remove(&Self::cache_key(&user.id)).await;
                Ok(serde_json::from_value(stored)?)
            }
            // Created concurrently by another request
            Err(AppError::Conflict(_)) => select_one(backend.as_ref(), query)
                .await?
                .ok_or_else(|| AppError::not_found("profile", &user.id)),
            Err(e) => Err(e),
        }
    }

    /// Apply a partial update to the user's own profile.
    ///
    /// Blank strings clear a field. A missing row is inserted, seeded with the
    /// identity name and avatar.
    pub async fn update(&self, user: &AuthUser, update: ProfileUpdate) -> Result<Profile> {
        let patch = self.validate(update)?;
        if patch.is_empty() {
            return self.ensure(user).await;
        }

        let backend = self.ctx.as_user(user);
        let query = Query::table(tables::PROFILES).eq("id", user.id.as_str());
        let exists = !backend.select(&query.clone().select("id")).await?.is_empty();

        let stored = if exists {
            let mut rows = backend.update(&query, Value::Object(patch)).await?;
            if rows.is_empty() {
                return Err(AppError::forbidden("profile update was not applied"));
            }
            rows.swap_remove(0)
        } else {
            let mut row = patch;
            row.insert("id".to_string(), json!(user.id));
            row.entry("display_name").or_insert_with(|| json!(user.name));
            row.entry("avatar_url").or_insert_with(|| json!(user.avatar));
            backend.insert(tables::PROFILES, Value::Object(row)).await?
        };

        self.ctx.cache.remove(&Self::cache_key(&user.id)).await;
        // Author names are embedded in comment threads
        self.ctx.cache.invalidate(&QueryKey::from(["comments"])).await;
        Ok(serde_json::from_value(stored)?)
    }

    /// Check an update and turn it into a column patch.
    fn validate(&self, update: ProfileUpdate) -> Result<Map<String, Value>> {
        let mut patch = Map::new();
        let mut set = |column: &str, value: Option<String>| {
            if let Some(value) = value {
                patch.insert(column.to_string(), blank_to_null(value));
            }
        };

        if let Some(username) = update.username.as_deref().map(str::trim) {
            if !username.is_empty() && !USERNAME.is_match(username) {
                return Err(AppError::validation(
                    "username must be 3-30 characters of lowercase letters, digits or underscores",
                ));
            }
        }
        if let Some(website) = update.website.as_deref().map(str::trim) {
            if !website.is_empty() {
                let valid = Url::parse(website)
                    .map(|u| matches!(u.scheme(), "http" | "https"))
                    .unwrap_or(false);
                if !valid {
                    return Err(AppError::validation("website must be an http(s) URL"));
                }
            }
        }
        if let Some(name) = &update.display_name {
            if name.trim().chars().count() > DISPLAY_NAME_MAX {
                return Err(AppError::validation(format!(
                    "display name must be at most {DISPLAY_NAME_MAX} characters"
                )));
            }
        }
        if let Some(bio) = &update.bio {
            if bio.trim().chars().count() > BIO_MAX {
                return Err(AppError::validation(format!(
                    "bio must be at most {BIO_MAX} characters"
                )));
            }
        }

        set("username", update.username);
        set("display_name", update.display_name);
        set("avatar_url", update.avatar_url);
        set("bio", update.bio);
        set("website", update.website);
        Ok(patch)
    }
}

fn blank_to_null(value: String) -> Value {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Value::Null
    } else {
        Value::String(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{seeded, user};

    #[tokio::test]
    async fn ensure_creates_profile_once() {
        let (backend, services) = seeded().await;
        let u1 = user("u1");

        let created = services.profiles.ensure(&u1).await.unwrap();
        assert_eq!(created.display_name.as_deref(), Some("User u1"));
        services.profiles.ensure(&u1).await.unwrap();

        assert_eq!(backend.rows(tables::PROFILES).await.len(), 1);
    }

    #[tokio::test]
    async fn update_inserts_then_patches() {
        let (_, services) = seeded().await;
        let u1 = user("u1");

        let profile = services
            .profiles
            .update(
                &u1,
                ProfileUpdate {
                    username: Some("jane_doe".into()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(profile.username.as_deref(), Some("jane_doe"));
        assert_eq!(profile.display_name.as_deref(), Some("User u1"));

        let profile = services
            .profiles
            .update(
                &u1,
                ProfileUpdate {
                    bio: Some("Coffee nerd".into()),
                    website: Some("https://jane.dev".into()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(profile.username.as_deref(), Some("jane_doe"));
        assert_eq!(profile.bio.as_deref(), Some("Coffee nerd"));
        assert_eq!(services.profiles.get("u1").await.unwrap(), profile);
    }

    #[tokio::test]
    async fn blank_fields_clear_values() {
        let (_, services) = seeded().await;
        let u1 = user("u1");
        services
            .profiles
            .update(&u1, ProfileUpdate { bio: Some("x".into()), ..ProfileUpdate::default() })
            .await
            .unwrap();
        let cleared = services
            .profiles
            .update(&u1, ProfileUpdate { bio: Some("  ".into()), ..ProfileUpdate::default() })
            .await
            .unwrap();
        assert_eq!(cleared.bio, None);
    }

    #[tokio::test]
    async fn invalid_updates_are_rejected() {
        let (_, services) = seeded().await;
        let u1 = user("u1");

        for update in [
            ProfileUpdate { username: Some("ab".into()), ..ProfileUpdate::default() },
            ProfileUpdate { username: Some("Has Spaces".into()), ..ProfileUpdate::default() },
            ProfileUpdate { website: Some("ftp://files.example.com".into()), ..ProfileUpdate::default() },
            ProfileUpdate { display_name: Some("x".repeat(81)), ..ProfileUpdate::default() },
        ] {
            let err = services.profiles.update(&u1, update).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn taken_username_conflicts() {
        let (_, services) = seeded().await;
        let name = ProfileUpdate {
            username: Some("taken".into()),
            ..ProfileUpdate::default()
        };
        services.profiles.update(&user("u1"), name.clone()).await.unwrap();
        let err = services.profiles.update(&user("u2"), name).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn missing_profile_is_not_found() {
        let (_, services) = seeded().await;
        let err = services.profiles.get("nobody").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "profile", .. }));
    }
}
