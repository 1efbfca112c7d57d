use std::time::Duration;

use anyhow::Context;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use challenz_core::{AppConfig, AppState, Environment};
use challenz_store::{Backend, MemoryStore};
use serde_json::{json, Value};
use tower::ServiceExt;

const SESSION_SECRET: &str = "integration-session-secret-0123456789";

fn seed() -> Value {
    let users: Vec<Value> = (1..=25)
        .map(|i| {
            json!({
                "id": format!("u{i}"),
                "username": format!("user{i}"),
                "email": format!("user{i}@example.com"),
                "region": if i % 2 == 0 { "eu" } else { "us" },
                "status": if i == 3 { "banned" } else { "active" },
                "created_at": format!("2024-01-{i:02}T00:00:00.000Z"),
            })
        })
        .collect();
    let now = chrono::Utc::now();
    let at = |hours: i64| {
        (now + chrono::Duration::hours(hours)).to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    };
    json!({
        "users": users,
        "challenges": [
            {"id": "c1", "title": "Plank week", "creator_id": "u1", "status": "active", "created_at": "2024-02-03T00:00:00.000Z"},
            {"id": "c2", "title": "Salsa basics", "creator_id": "deleted-user", "status": "active", "created_at": "2024-02-02T00:00:00.000Z"},
            {"id": "c3", "title": "Latte art", "creator_id": null, "status": "draft", "created_at": "2024-02-01T00:00:00.000Z"},
        ],
        "products": [
            {"id": "p1", "name": "Yoga mat", "category": "fitness", "price": 25.0, "stock": 4, "created_at": "2024-01-03T00:00:00.000Z"},
            {"id": "p2", "name": "Water bottle", "category": "fitness", "price": 9.5, "stock": 8, "created_at": "2024-01-02T00:00:00.000Z"},
            {"id": "p3", "name": "Apron", "category": "kitchen", "price": 15.0, "stock": 0, "created_at": "2024-01-01T00:00:00.000Z"},
        ],
        "orders": [
            {"id": "o1", "user_id": "u1", "product_id": "p1", "total": 25.0, "created_at": "2024-03-01T10:00:00.000Z"},
            {"id": "o2", "user_id": "u2", "product_id": "p2", "total": 19.0, "created_at": "2024-03-02T10:00:00.000Z"},
        ],
        "flash_sales": [
            {"id": "f1", "product_id": "p1", "title": "Mat madness", "discount_percent": 20, "status": "live",
             "starts_at": "2024-03-01T00:00:00.000Z", "ends_at": "2024-03-03T00:00:00.000Z", "created_at": "2024-02-20T00:00:00.000Z"},
            {"id": "f2", "product_id": "p2", "title": "Hydrate", "discount_percent": 10, "status": "ended",
             "starts_at": "2024-01-01T00:00:00.000Z", "ends_at": "2024-01-02T00:00:00.000Z", "created_at": "2023-12-20T00:00:00.000Z"},
            {"id": "f3", "product_id": "p2", "title": "Bottle rush", "discount_percent": 15, "status": "scheduled",
             "starts_at": at(-1), "ends_at": at(24), "created_at": at(-48)},
        ],
        "returns": [
            {"id": "r1", "order_id": "o1", "user_id": "u1", "amount": 25.0, "status": "pending", "created_at": "2024-03-05T00:00:00.000Z"},
        ],
        "reports": [
            {"id": "rep1", "reporter_id": "u2", "target_id": "c1", "type": "spam", "status": "open", "created_at": "2024-03-06T00:00:00.000Z"},
            {"id": "rep2", "reporter_id": "u4", "target_id": "c2", "type": "abuse", "status": "resolved", "created_at": "2024-03-07T00:00:00.000Z"},
        ],
    })
}

fn test_config(environment: Environment) -> AppConfig {
    AppConfig {
        environment,
        admin_password_hash: None,
        session_secret: SESSION_SECRET.to_string(),
        session_ttl_seconds: 3600,
        login_attempts_per_minute: 3,
        max_page_size: 100,
        analytics_mock_delay: Duration::ZERO,
        ..AppConfig::default()
    }
}

struct TestContext {
    app: Router,
    token: String,
}

impl TestContext {
    fn new() -> anyhow::Result<Self> {
        Self::with_seed(seed(), test_config(Environment::Production))
    }

    fn with_seed(seed: Value, config: AppConfig) -> anyhow::Result<Self> {
        let store = MemoryStore::from_json(seed)?;
        let router = challenz_api::build_router(&config);
        let state = AppState::new(Backend::Memory(store), config);
        let token = challenz_core::auth::create_session(SESSION_SECRET, 3600)?;
        Ok(Self {
            app: router.with_state(state),
            token,
        })
    }

    async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let builder = Request::builder()
            .method(method)
            .uri(path)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token));
        send(&self.app, builder, body).await
    }
}

async fn send(
    app: &Router,
    mut builder: axum::http::request::Builder,
    body: Option<Value>,
) -> anyhow::Result<(StatusCode, Value)> {
    let request = if let Some(payload) = body {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        builder.body(Body::from(payload.to_string()))?
    } else {
        builder.body(Body::empty())?
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let body_bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let payload = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes)
            .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&body_bytes) }))
    };
    Ok((status, payload))
}

fn ids(payload: &Value) -> Vec<String> {
    payload["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn health_is_public() -> anyhow::Result<()> {
    let ctx = TestContext::new()?;
    let (status, payload) = send(&ctx.app, Request::builder().uri("/health"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn api_routes_require_a_session() -> anyhow::Result<()> {
    let ctx = TestContext::new()?;
    for path in ["/api/users", "/api/dashboard/stats", "/api/auth/session"] {
        let (status, payload) = send(&ctx.app, Request::builder().uri(path), None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{path}");
        assert!(payload["error"].is_string());
    }

    let forged = Request::builder()
        .uri("/api/users")
        .header(header::AUTHORIZATION, "Bearer not-a-real-token");
    let (status, _) = send(&ctx.app, forged, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The legacy client-side flag grants nothing.
    let legacy = Request::builder()
        .uri("/api/users")
        .header(header::COOKIE, "isAdmin=true");
    let (status, _) = send(&ctx.app, legacy, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn users_paginate_twenty_five_rows() -> anyhow::Result<()> {
    let ctx = TestContext::new()?;
    let mut sizes = Vec::new();
    for page in 1..=4 {
        let (status, payload) = ctx
            .request_json(Method::GET, &format!("/api/users?page={page}&limit=10"), None)
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            payload["pagination"],
            json!({
                "currentPage": page,
                "totalPages": 3,
                "totalItems": 25,
                "itemsPerPage": 10,
            })
        );
        sizes.push(payload["items"].as_array().context("items array")?.len());
    }
    assert_eq!(sizes, vec![10, 10, 5, 0]);
    Ok(())
}

#[tokio::test]
async fn page_parameters_are_validated() -> anyhow::Result<()> {
    let ctx = TestContext::new()?;

    let (status, payload) = ctx.request_json(Method::GET, "/api/users?limit=0", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(payload["error"].as_str().context("error text")?.contains("limit"));

    let (status, _) = ctx.request_json(Method::GET, "/api/users?page=-2", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, payload) = ctx
        .request_json(Method::GET, "/api/users?page=abc&limit=", None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["pagination"]["currentPage"], 1);
    assert_eq!(payload["pagination"]["itemsPerPage"], 10);

    let (status, payload) = ctx.request_json(Method::GET, "/api/users?limit=5000", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["pagination"]["itemsPerPage"], 100);
    assert_eq!(payload["pagination"]["totalPages"], 1);
    Ok(())
}

#[tokio::test]
async fn users_filter_by_search_region_and_status() -> anyhow::Result<()> {
    let ctx = TestContext::new()?;

    let (_, payload) = ctx
        .request_json(Method::GET, "/api/users?search=USER1&limit=100", None)
        .await?;
    // user1, user10..user19
    assert_eq!(payload["pagination"]["totalItems"], 11);

    let (_, payload) = ctx
        .request_json(Method::GET, "/api/users?status=banned", None)
        .await?;
    assert_eq!(ids(&payload), vec!["u3".to_string()]);

    let (_, payload) = ctx
        .request_json(Method::GET, "/api/users?region=eu&status=all&limit=100", None)
        .await?;
    assert_eq!(payload["pagination"]["totalItems"], 12);

    let (status, _) = ctx
        .request_json(Method::GET, "/api/users?status=sleeping", None)
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn single_user_lookup_distinguishes_missing() -> anyhow::Result<()> {
    let ctx = TestContext::new()?;
    let (status, payload) = ctx.request_json(Method::GET, "/api/users/u7", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["username"], "user7");

    let (status, payload) = ctx.request_json(Method::GET, "/api/users/u999", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(payload, json!({ "error": "not found" }));
    Ok(())
}

#[tokio::test]
async fn challenges_are_enriched_with_their_creator() -> anyhow::Result<()> {
    let ctx = TestContext::new()?;
    let (status, payload) = ctx.request_json(Method::GET, "/api/challenges", None).await?;
    assert_eq!(status, StatusCode::OK);
    let items = payload["items"].as_array().context("items")?;
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["creator"]["username"], "user1");
    assert!(items[0]["creator"].get("email").is_none());
    assert_eq!(items[1]["creator"], Value::Null);
    assert_eq!(items[2]["creator"], Value::Null);

    let (status, payload) = ctx.request_json(Method::GET, "/api/challenges/c1", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["creator"]["id"], "u1");

    let (_, payload) = ctx
        .request_json(Method::GET, "/api/challenges?status=draft", None)
        .await?;
    assert_eq!(ids(&payload), vec!["c3".to_string()]);
    Ok(())
}

#[tokio::test]
async fn returns_and_reports_carry_their_references() -> anyhow::Result<()> {
    let ctx = TestContext::new()?;
    let (status, payload) = ctx.request_json(Method::GET, "/api/returns", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["items"][0]["user"]["username"], "user1");
    assert_eq!(payload["items"][0]["order"]["total"], 25.0);

    let (status, payload) = ctx
        .request_json(Method::GET, "/api/reports?type=spam", None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&payload), vec!["rep1".to_string()]);
    assert_eq!(payload["items"][0]["reporter"]["username"], "user2");
    Ok(())
}

#[tokio::test]
async fn status_updates_validate_values() -> anyhow::Result<()> {
    let ctx = TestContext::new()?;

    let (status, payload) = ctx
        .request_json(
            Method::PATCH,
            "/api/reports/rep1/status",
            Some(json!({ "status": "reviewing" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["status"], "reviewing");

    let (status, payload) = ctx
        .request_json(
            Method::PATCH,
            "/api/returns/r1/status",
            Some(json!({ "status": "lost" })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(payload["error"].as_str().context("error")?.contains("pending"));

    let (status, _) = ctx
        .request_json(
            Method::PATCH,
            "/api/users/u404/status",
            Some(json!({ "status": "suspended" })),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn bulk_stock_update_reports_partial_progress() -> anyhow::Result<()> {
    let ctx = TestContext::new()?;
    let (status, payload) = ctx
        .request_json(
            Method::POST,
            "/api/products/stock",
            Some(json!({
                "updates": [
                    {"id": "p1", "stock": 40},
                    {"id": "p2", "stock": 80},
                    {"id": "p9", "stock": 1},
                ]
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["complete"], false);
    assert_eq!(payload["applied"], json!(["p1", "p2"]));
    assert_eq!(payload["failed_id"], "p9");

    let (_, payload) = ctx
        .request_json(Method::GET, "/api/products?category=fitness", None)
        .await?;
    let stocks: Vec<i64> = payload["items"]
        .as_array()
        .context("items")?
        .iter()
        .filter_map(|p| p["stock"].as_i64())
        .collect();
    assert_eq!(stocks, vec![40, 80]);

    let (status, _) = ctx
        .request_json(
            Method::POST,
            "/api/products/stock",
            Some(json!({ "updates": [{"id": "p3", "stock": -4}] })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn flash_sales_list_and_create() -> anyhow::Result<()> {
    let ctx = TestContext::new()?;

    let (status, payload) = ctx
        .request_json(
            Method::GET,
            "/api/flash-sales?startDate=2024-03-02&endDate=2024-03-10",
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&payload), vec!["f1".to_string()]);
    assert_eq!(payload["items"][0]["product"]["name"], "Yoga mat");
    assert_eq!(payload["items"][0]["status"], "ended");

    let (status, payload) = ctx
        .request_json(Method::GET, "/api/flash-sales?status=live", None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&payload), vec!["f3".to_string()]);
    assert_eq!(payload["items"][0]["status"], "live");

    let (status, payload) = ctx
        .request_json(Method::GET, "/api/flash-sales?status=ended", None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    let mut ended = ids(&payload);
    ended.sort();
    assert_eq!(ended, vec!["f1".to_string(), "f2".to_string()]);

    let (status, _) = ctx
        .request_json(
            Method::GET,
            "/api/flash-sales?startDate=2024-03-10&endDate=2024-03-01",
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let starts = chrono::Utc::now() + chrono::Duration::days(1);
    let ends = starts + chrono::Duration::days(2);
    let (status, payload) = ctx
        .request_json(
            Method::POST,
            "/api/flash-sales",
            Some(json!({
                "product_id": "p3",
                "title": "Apron drop",
                "discount_percent": 30,
                "starts_at": starts.to_rfc3339(),
                "ends_at": ends.to_rfc3339(),
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payload["status"], "scheduled");

    let (status, _) = ctx
        .request_json(
            Method::POST,
            "/api/flash-sales",
            Some(json!({
                "product_id": "p3",
                "title": "Too generous",
                "discount_percent": 95,
                "starts_at": starts.to_rfc3339(),
                "ends_at": ends.to_rfc3339(),
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn dashboard_and_analytics() -> anyhow::Result<()> {
    let ctx = TestContext::new()?;

    let (status, payload) = ctx.request_json(Method::GET, "/api/dashboard/stats", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        payload,
        json!({
            "totalUsers": 25,
            "activeChallenges": 2,
            "openReports": 1,
            "pendingReturns": 1,
            "liveFlashSales": 1,
        })
    );

    let (status, payload) = ctx
        .request_json(
            Method::GET,
            "/api/analytics/revenue?startDate=2024-03-01&endDate=2024-03-01",
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["orderCount"], 1);
    assert_eq!(payload["totalRevenue"], 25.0);

    let (status, payload) = ctx
        .request_json(Method::GET, "/api/analytics/engagement?days=5", None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["sample"], true);
    assert_eq!(payload["days"].as_array().context("days")?.len(), 5);

    let (status, _) = ctx
        .request_json(Method::GET, "/api/analytics/engagement?days=many", None)
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, payload) = ctx
        .request_json(Method::GET, "/api/analytics/content-performance", None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["sample"], true);
    Ok(())
}

#[tokio::test]
async fn store_failures_hide_details_outside_development() -> anyhow::Result<()> {
    // No `reports` collection, so every report query fails in the store.
    let partial = json!({ "users": [] });

    let prod = TestContext::with_seed(partial.clone(), test_config(Environment::Production))?;
    let (status, payload) = prod.request_json(Method::GET, "/api/reports", None).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(payload, json!({ "error": "failed to load data" }));

    let dev = TestContext::with_seed(partial, test_config(Environment::Development))?;
    let (status, payload) = dev.request_json(Method::GET, "/api/reports", None).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = payload["error"].as_str().context("error text")?;
    assert!(message.contains("unknown collection 'reports'"), "{message}");
    Ok(())
}

#[tokio::test]
async fn login_issues_a_session_cookie() -> anyhow::Result<()> {
    let mut config = test_config(Environment::Development);
    config.admin_password_hash = Some(challenz_core::auth::hash_password("correct horse")?);
    let ctx = TestContext::with_seed(seed(), config)?;

    let login = |password: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "password": password }).to_string()))
    };

    let response = ctx.app.clone().oneshot(login("wrong")?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = ctx.app.clone().oneshot(login("correct horse")?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .context("session cookie")?
        .to_str()?
        .to_string();
    assert!(set_cookie.contains("HttpOnly"));
    let cookie = set_cookie
        .split(';')
        .next()
        .context("cookie pair")?
        .to_string();

    let with_cookie = Request::builder()
        .uri("/api/auth/session")
        .header(header::COOKIE, cookie);
    let (status, payload) = send(&ctx.app, with_cookie, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["authenticated"], true);

    let logout = Request::builder().method(Method::POST).uri("/api/auth/logout");
    let response = ctx.app.clone().oneshot(logout.body(Body::empty())?).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cleared = response
        .headers()
        .get(header::SET_COOKIE)
        .context("clearing cookie")?
        .to_str()?;
    assert!(cleared.contains("Max-Age=0"));
    Ok(())
}

#[tokio::test]
async fn login_attempts_are_throttled() -> anyhow::Result<()> {
    let ctx = TestContext::new()?;
    let mut statuses = Vec::new();
    for _ in 0..4 {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"password":"guess"}"#))?;
        statuses.push(ctx.app.clone().oneshot(request).await?.status());
    }
    assert_eq!(
        statuses,
        vec![
            StatusCode::UNAUTHORIZED,
            StatusCode::UNAUTHORIZED,
            StatusCode::UNAUTHORIZED,
            StatusCode::TOO_MANY_REQUESTS,
        ]
    );
    Ok(())
}
