use axum::{
    extract::{Path, Query, State},
    Json,
};
use challenz_core::admin::{self, StatusTarget};
use challenz_core::fetcher::{self, EnrichmentSpec, PageRequest, PageResult};
use challenz_core::AppState;
use challenz_models::{collections, ReturnStatus};
use challenz_store::Record;
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::AdminSession;
use crate::routes::{enum_filter, page_params, UpdateStatusRequest};

#[derive(Deserialize)]
pub struct ListReturnsQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
}

pub async fn list_returns(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(params): Query<ListReturnsQuery>,
) -> Result<Json<PageResult>, ApiError> {
    let page = page_params(&state, params.page.as_deref(), params.limit.as_deref())?;
    let request = PageRequest::new(collections::RETURNS, page)
        .filters(enum_filter::<ReturnStatus>("status", params.status.as_deref())?)
        .enrich(
            EnrichmentSpec::new("user_id", collections::USERS, "id", "user")
                .project(["id", "username", "email"]),
        )
        .enrich(
            EnrichmentSpec::new("order_id", collections::ORDERS, "id", "order")
                .project(["id", "total", "product_id", "created_at"]),
        );

    let result = fetcher::fetch_page(state.store.as_ref(), &request, &state.config.fetch).await?;
    Ok(Json(result))
}

pub async fn update_return_status(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<String>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<Record>, ApiError> {
    let row = admin::update_status(
        state.store.as_ref(),
        StatusTarget::Return,
        &id,
        &body.status,
        &state.config.fetch,
    )
    .await?;
    Ok(Json(row))
}
