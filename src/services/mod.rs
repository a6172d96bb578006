//! Service layer for the review site.
//!
//! This module contains the business logic for:
//! - Category listing (`CategoryService`)
//! - Review pages, listings and tags (`ReviewService`)
//! - Search with filters (`SearchService`)
//! - Threaded comments (`CommentService`)
//! - Review likes (`LikeService`)
//! - Profiles (`ProfileService`)
//! - Session resolution (`AuthService`)
//!
//! Every counter change goes through [`counters`].

mod auth;
mod categories;
mod comments;
pub mod counters;
mod likes;
mod profiles;
mod reviews;
mod search;

use std::sync::Arc;

use crate::backend::{DataBackend, SharedBackend};
use crate::cache::QueryCache;
use crate::models::{AuthUser, Config};

pub use auth::AuthService;
pub use categories::CategoryService;
pub use comments::CommentService;
pub use likes::LikeService;
pub use profiles::ProfileService;
pub use reviews::{CategoryFilter, DEFAULT_FEATURED_LIMIT, ReviewService};
pub use search::{SearchFilters, SearchService, SearchSort};

/// What every service needs: configuration, the backend and the shared cache.
#[derive(Clone)]
pub struct ServiceContext {
    pub config: Arc<Config>,
    pub backend: SharedBackend,
    pub cache: Arc<QueryCache>,
}

impl ServiceContext {
    pub fn new(config: Arc<Config>, backend: SharedBackend) -> Self {
        let cache = Arc::new(QueryCache::new(&config.cache));
        Self {
            config,
            backend,
            cache,
        }
    }

    /// Backend handle acting as `user`.
    pub fn as_user(&self, user: &AuthUser) -> Arc<dyn DataBackend> {
        self.backend.for_session(&user.access_token)
    }
}

/// All services over one context.
#[derive(Clone)]
pub struct Services {
    pub context: ServiceContext,
    pub categories: CategoryService,
    pub reviews: ReviewService,
    pub search: SearchService,
    pub comments: CommentService,
    pub likes: LikeService,
    pub profiles: ProfileService,
    pub auth: AuthService,
}

impl Services {
    pub fn new(config: Arc<Config>, backend: SharedBackend) -> Self {
        let context = ServiceContext::new(config, backend);
        let categories = CategoryService::new(context.clone());
        let profiles = ProfileService::new(context.clone());

        Self {
            reviews: ReviewService::new(context.clone(), categories.clone()),
            search: SearchService::new(context.clone(), categories.clone()),
            comments: CommentService::new(context.clone(), profiles.clone()),
            likes: LikeService::new(context.clone()),
            auth: AuthService::new(context.clone()),
            categories,
            profiles,
            context,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the service tests.

    use std::sync::Arc;

    use serde_json::json;

    use super::Services;
    use crate::backend::MemoryBackend;
    use crate::models::{AuthUser, Config, tables};

    pub fn config() -> Config {
        let mut config = Config::default();
        config.backend.anon_key = "test-anon-key".into();
        config.cache.retry = 0;
        config
    }

    pub fn user(id: &str) -> AuthUser {
        AuthUser {
            id: id.to_string(),
            name: Some(format!("User {id}")),
            access_token: format!("token-{id}"),
            ..AuthUser::default()
        }
    }

    /// Two categories, four reviews, two signed-in users.
    pub async fn seeded() -> (MemoryBackend, Services) {
        let backend = MemoryBackend::new();
        backend
            .seed(
                tables::CATEGORIES,
                [
                    json!({"id": 1, "name": "Kitchen", "slug": "kitchen"}),
                    json!({"id": 2, "name": "Audio", "slug": "audio", "description": "Headphones and speakers"}),
                ],
            )
            .await
            .unwrap();
        backend
            .seed(
                tables::REVIEWS,
                [
                    json!({
                        "id": "r1", "title": "Acme Blender Pro", "slug": "acme-blender-pro",
                        "description": "A powerful countertop blender", "content": "The blender crushes ice with ease.",
                        "rating": 4.5, "category_id": 1, "tags": ["blender", "kitchen"], "featured": true,
                        "created_at": "2026-01-01T10:00:00Z"
                    }),
                    json!({
                        "id": "r2", "title": "Quiet Kettle", "slug": "quiet-kettle",
                        "description": "Boils water without the noise", "content": "A kettle for early mornings.",
                        "rating": 4.0, "category_id": 1, "tags": ["kettle", "kitchen"],
                        "created_at": "2026-01-02T10:00:00Z"
                    }),
                    json!({
                        "id": "r3", "title": "Studio Headphones", "slug": "studio-headphones",
                        "description": "Flat response for mixing", "content": "Great for a home studio and blender users alike.",
                        "rating": 4.8, "category_id": 2, "tags": ["headphones", "studio"], "featured": true,
                        "created_at": "2026-01-03T10:00:00Z"
                    }),
                    json!({
                        "id": "r4", "title": "Mystery Gadget", "slug": "mystery-gadget",
                        "content": "Nobody knows what it does.",
                        "created_at": "2026-01-04T10:00:00Z"
                    }),
                ],
            )
            .await
            .unwrap();

        for id in ["u1", "u2"] {
            let u = user(id);
            backend.register_session(&u.access_token.clone(), u).await;
        }

        let services = Services::new(Arc::new(config()), Arc::new(backend.clone()));
        (backend, services)
    }
}
