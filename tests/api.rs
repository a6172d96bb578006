//! End-to-end tests of the HTTP API over the in-memory backend.

use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use reviewa2z::api::{self, AppState};
use reviewa2z::backend::{ADJUST_COUNTER_RPC, MemoryBackend};
use reviewa2z::models::{AuthUser, Config, tables};

struct TestServer {
    addr: SocketAddr,
    backend: MemoryBackend,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let backend = MemoryBackend::new();
        backend
            .seed(
                tables::CATEGORIES,
                [json!({"id": 1, "name": "Kitchen", "slug": "kitchen", "description": "Cooking gear"})],
            )
            .await
            .unwrap();
        backend
            .seed(
                tables::REVIEWS,
                [
                    json!({
                        "id": "r1", "title": "Acme Blender Pro", "slug": "acme-blender-pro",
                        "description": "A powerful blender", "content": "The blender crushes ice.",
                        "rating": 4.5, "category_id": 1, "tags": ["blender"], "featured": true,
                        "product": {"brand": "Acme"}, "created_at": "2026-01-01T10:00:00Z"
                    }),
                    json!({
                        "id": "r2", "title": "Quiet Kettle", "slug": "quiet-kettle",
                        "content": "Boils quietly.", "rating": 4.0, "category_id": 1,
                        "tags": ["kettle"], "created_at": "2026-01-02T10:00:00Z"
                    }),
                ],
            )
            .await
            .unwrap();
        backend
            .register_session(
                "alice-token",
                AuthUser {
                    id: "alice".into(),
                    name: Some("Alice".into()),
                    ..AuthUser::default()
                },
            )
            .await;

        let mut config = Config::default();
        config.backend.anon_key = "test".into();
        config.cache.retry = 0;
        let state = AppState::new(Arc::new(config), Arc::new(backend.clone()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, api::router(state)).await.unwrap();
        });

        Self {
            addr,
            backend,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    async fn get_json(&self, path: &str) -> Value {
        let resp = self.get(path).await;
        assert_eq!(resp.status(), StatusCode::OK, "GET {path}");
        resp.json().await.unwrap()
    }
}

#[tokio::test]
async fn public_reads() {
    let server = TestServer::start().await;

    assert_eq!(server.get_json("/health").await["status"], "ok");

    let categories = server.get_json("/api/categories").await;
    assert_eq!(categories[0]["slug"], "kitchen");
    assert_eq!(categories[0]["review_count"], 2);

    let latest = server.get_json("/api/reviews?per_page=1").await;
    assert_eq!(latest["items"][0]["slug"], "quiet-kettle");
    assert_eq!(latest["has_more"], true);

    let featured = server.get_json("/api/reviews/featured").await;
    assert_eq!(featured.as_array().unwrap().len(), 1);

    let listing = server
        .get_json("/api/categories/kitchen/reviews?sort=highest_rated")
        .await;
    assert_eq!(listing["items"][0]["id"], "r1");

    let tags = server.get_json("/api/tags").await;
    assert_eq!(tags, json!(["blender", "kettle"]));

    let results = server.get_json("/api/search?q=blender").await;
    assert_eq!(results["items"][0]["id"], "r1");

    let missing = server.get("/api/categories/garden").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body: Value = missing.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("garden"));
}

#[tokio::test]
async fn review_page_has_structured_data_and_counts_views() {
    let server = TestServer::start().await;

    let page = server.get_json("/api/reviews/acme-blender-pro").await;
    assert_eq!(page["review"]["category"]["name"], "Kitchen");
    assert_eq!(page["structured_data"]["brand"]["name"], "Acme");
    assert_eq!(page["breadcrumb"]["itemListElement"][1]["name"], "Kitchen");
    assert!(page.get("liked").is_none());

    let rows = server.backend.rows(tables::REVIEWS).await;
    let r1 = rows.iter().find(|r| r["id"] == "r1").unwrap();
    assert_eq!(r1["view_count"], 1);
}

#[tokio::test]
async fn writes_require_a_session() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .post(server.url("/api/reviews/r1/comments"))
        .json(&json!({"content": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = server
        .client
        .post(server.url("/api/reviews/r1/like"))
        .bearer_auth("forged")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(server.get("/api/me").await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn comment_like_and_logout_flow() {
    let server = TestServer::start().await;
    let client = &server.client;

    let resp = client
        .post(server.url("/api/reviews/r1/comments"))
        .bearer_auth("alice-token")
        .json(&json!({"content": "  Love it  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let comment: Value = resp.json().await.unwrap();
    assert_eq!(comment["content"], "Love it");
    assert_eq!(comment["author"]["name"], "Alice");

    let comments = server.get_json("/api/reviews/r1/comments").await;
    assert_eq!(comments.as_array().unwrap().len(), 1);

    let like: Value = client
        .post(server.url("/api/reviews/r1/like"))
        .bearer_auth("alice-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(like, json!({"liked": true, "count": 1}));

    let likes: Value = client
        .get(server.url("/api/me/likes"))
        .bearer_auth("alice-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(likes, json!(["r1"]));

    let page: Value = client
        .get(server.url("/api/reviews/acme-blender-pro"))
        .bearer_auth("alice-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["liked"], true);
    assert_eq!(page["review"]["comments_count"], 1);

    let resp = client
        .delete(server.url(&format!("/api/comments/{}", comment["id"].as_str().unwrap())))
        .bearer_auth("alice-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .post(server.url("/api/auth/logout"))
        .bearer_auth("alice-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client
        .get(server.url("/api/me"))
        .bearer_auth("alice-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn failed_counter_surfaces_as_upstream_error() {
    let server = TestServer::start().await;
    server.backend.fail_rpc(ADJUST_COUNTER_RPC).await;

    let resp = server
        .client
        .post(server.url("/api/reviews/r1/like"))
        .bearer_auth("alice-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert!(server.backend.rows(tables::REVIEW_LIKES).await.is_empty());
}

#[tokio::test]
async fn profile_update_and_lookup() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .put(server.url("/api/me/profile"))
        .bearer_auth("alice-token")
        .json(&json!({"username": "alice_a", "bio": "Home cook"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let profile = server.get_json("/api/profiles/alice").await;
    assert_eq!(profile["username"], "alice_a");
    assert_eq!(profile["display_name"], "Alice");

    let resp = server
        .client
        .put(server.url("/api/me/profile"))
        .bearer_auth("alice-token")
        .json(&json!({"username": "No Spaces Allowed"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sitemap_and_robots() {
    let server = TestServer::start().await;

    let resp = server.get("/sitemap.xml").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "application/xml");
    let etag = resp.headers()["etag"].to_str().unwrap().to_string();
    let xml = resp.text().await.unwrap();
    assert!(xml.contains("https://reviewa2z.com/review/quiet-kettle"));
    assert!(xml.contains("https://reviewa2z.com/category/kitchen"));

    let resp = server
        .client
        .get(server.url("/sitemap.xml"))
        .header("If-None-Match", &etag)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);

    let robots = server.get("/robots.txt").await.text().await.unwrap();
    assert!(robots.contains("Sitemap: https://reviewa2z.com/sitemap.xml"));
}
