use axum::{
    extract::{Query, State},
    Json,
};
use challenz_core::admin;
use challenz_core::fetcher::{self, PageRequest, PageResult};
use challenz_core::AppState;
use challenz_models::{collections, StockUpdate};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::AdminSession;
use crate::routes::{page_params, search_filter, text_filter};

#[derive(Deserialize)]
pub struct ListProductsQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    pub category: Option<String>,
}

pub async fn list_products(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(params): Query<ListProductsQuery>,
) -> Result<Json<PageResult>, ApiError> {
    let page = page_params(&state, params.page.as_deref(), params.limit.as_deref())?;
    let request = PageRequest::new(collections::PRODUCTS, page)
        .filters(search_filter(&["name"], params.search.as_deref())?)
        .filters(text_filter("category", params.category.as_deref()));

    let result = fetcher::fetch_page(state.store.as_ref(), &request, &state.config.fetch).await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
pub struct UpdateStockRequest {
    pub updates: Vec<StockUpdate>,
}

/// Always 200 once validation passes; `complete: false` plus `failed_id`
/// signals that the run stopped early.
pub async fn update_stock(
    State(state): State<AppState>,
    _admin: AdminSession,
    Json(body): Json<UpdateStockRequest>,
) -> Result<Json<Value>, ApiError> {
    let outcome =
        admin::bulk_update_stock(state.store.as_ref(), &body.updates, &state.config.fetch).await?;
    Ok(Json(json!({
        "complete": outcome.is_complete(),
        "applied": outcome.applied,
        "failed_id": outcome.failed_id,
        "error": outcome.error,
    })))
}
