// src/api/mod.rs

//! HTTP API served by `reviewa2z-server`.
//!
//! Reads are public. Writes and `/api/me*` need `Authorization: Bearer
//! <access token>` issued by the hosted auth service.

mod extract;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, IF_NONE_MATCH};
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post, put};
use tokio::net::TcpListener;
use tokio::signal::{self, ctrl_c};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::backend::SharedBackend;
use crate::error::Result;
use crate::models::Config;
use crate::services::Services;

pub use extract::{BearerToken, CurrentUser, MaybeUser};

/// Shared handler state.
pub struct AppState {
    pub config: Arc<Config>,
    pub services: Services,
}

impl AppState {
    pub fn new(config: Arc<Config>, backend: SharedBackend) -> Arc<Self> {
        let services = Services::new(Arc::clone(&config), backend);
        Arc::new(Self { config, services })
    }
}

/// Every route, with CORS and request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/categories", get(routes::categories))
        .route("/categories/{slug}", get(routes::category))
        .route("/categories/{slug}/reviews", get(routes::category_reviews))
        .route("/categories/{slug}/tags", get(routes::category_tags))
        .route("/reviews", get(routes::latest_reviews))
        .route("/reviews/featured", get(routes::featured_reviews))
        // `{review}` is a slug for the page and an id for comments and likes
        .route("/reviews/{review}", get(routes::review))
        .route(
            "/reviews/{review}/comments",
            get(routes::list_comments).post(routes::add_comment),
        )
        .route("/reviews/{review}/like", post(routes::like_review))
        .route("/comments/{id}", delete(routes::delete_comment))
        .route("/comments/{id}/like", post(routes::like_comment))
        .route("/tags", get(routes::tags))
        .route("/search", get(routes::search))
        .route("/me", get(routes::me))
        .route("/me/likes", get(routes::my_likes))
        .route("/me/profile", put(routes::update_profile))
        .route("/profiles/{id}", get(routes::profile))
        .route("/auth/logout", post(routes::logout));

    Router::new()
        .route("/health", get(routes::health))
        .route("/sitemap.xml", get(routes::sitemap))
        .route("/robots.txt", get(routes::robots))
        .nest("/api", api)
        .layer(cors_layer(&state.config.server.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, IF_NONE_MATCH])
        .max_age(Duration::from_secs(60 * 60));

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

/// Serve on `listener` until Ctrl-C or SIGTERM.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let address = listener.local_addr()?;
    info!("Server running on {address}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
