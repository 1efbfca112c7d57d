use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use challenz_core::{AppConfig, AppState};
use serde_json::json;

pub mod error;
pub mod middleware;
pub mod routes;

use error::ErrorDetail;

pub fn build_router(config: &AppConfig) -> Router<AppState> {
    let cors = build_cors_layer(&config.allowed_origins);
    Router::new()
        // Health
        .route("/health", get(health))
        // Auth
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/session", get(routes::auth::session))
        // Dashboard
        .route("/api/dashboard/stats", get(routes::dashboard::stats))
        // Users
        .route("/api/users", get(routes::users::list_users))
        .route("/api/users/{id}", get(routes::users::get_user))
        .route("/api/users/{id}/status", patch(routes::users::update_user_status))
        // Challenges
        .route("/api/challenges", get(routes::challenges::list_challenges))
        .route("/api/challenges/{id}", get(routes::challenges::get_challenge))
        // Products
        .route("/api/products", get(routes::products::list_products))
        .route("/api/products/stock", post(routes::products::update_stock))
        // Flash sales
        .route(
            "/api/flash-sales",
            get(routes::flash_sales::list_flash_sales).post(routes::flash_sales::create_flash_sale),
        )
        // Returns
        .route("/api/returns", get(routes::returns::list_returns))
        .route(
            "/api/returns/{id}/status",
            patch(routes::returns::update_return_status),
        )
        // Reports
        .route("/api/reports", get(routes::reports::list_reports))
        .route(
            "/api/reports/{id}/status",
            patch(routes::reports::update_report_status),
        )
        // Analytics
        .route("/api/analytics/revenue", get(routes::analytics::revenue))
        .route("/api/analytics/engagement", get(routes::analytics::engagement))
        .route(
            "/api/analytics/content-performance",
            get(routes::analytics::content_performance),
        )
        // Middleware layers
        .layer(from_fn_with_state(
            config.environment.is_development(),
            expose_error_details,
        ))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Cross-origin access is limited to the configured dashboard origins, with
/// credentials so the session cookie is sent.
fn build_cors_layer(allowed_origins: &[String]) -> tower_http::cors::CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// In development, replace generic 500 bodies with the underlying failure.
async fn expose_error_details(
    State(expose): State<bool>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let Some(ErrorDetail(detail)) = response.extensions_mut().remove::<ErrorDetail>() else {
        return response;
    };
    if !expose {
        return response;
    }
    (response.status(), Json(json!({ "error": detail }))).into_response()
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "challenz-admin" })),
    )
}
