use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use challenz_core::admin;
use challenz_core::fetcher::{self, EnrichmentSpec, PageRequest, PageResult};
use challenz_core::AppState;
use challenz_models::{collections, FlashSaleStatus, NewFlashSale};
use challenz_store::{Filter, Record};
use challenz_util::format_timestamp;
use chrono::Utc;
use challenz_util::validation::parse_date_range;
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::AdminSession;
use crate::routes::{enum_param, page_params, text_filter};

#[derive(Deserialize)]
pub struct ListFlashSalesQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
    pub region: Option<String>,
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
}

/// Sales whose window overlaps `[startDate, endDate]`. `status` is the
/// status at request time, not the one stored when the sale was created.
pub async fn list_flash_sales(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(params): Query<ListFlashSalesQuery>,
) -> Result<Json<PageResult>, ApiError> {
    let page = page_params(&state, params.page.as_deref(), params.limit.as_deref())?;
    let (start, end) = parse_date_range(params.start_date.as_deref(), params.end_date.as_deref())?;

    let status = enum_param::<FlashSaleStatus>(params.status.as_deref())?;
    let now = Utc::now();

    let request = PageRequest::new(collections::FLASH_SALES, page)
        .filters(status.map(|s| admin::flash_sale_status_filters(s, now)).unwrap_or_default())
        .filters(text_filter("region", params.region.as_deref()))
        .filters(start.map(|s| Filter::gte("ends_at", format_timestamp(&s))))
        .filters(end.map(|e| Filter::lte("starts_at", format_timestamp(&e))))
        .enrich(
            EnrichmentSpec::new("product_id", collections::PRODUCTS, "id", "product")
                .project(["id", "name", "price", "stock"]),
        );

    let mut result = fetcher::fetch_page(state.store.as_ref(), &request, &state.config.fetch).await?;
    admin::refresh_flash_sale_statuses(&mut result.items, now);
    Ok(Json(result))
}

pub async fn create_flash_sale(
    State(state): State<AppState>,
    _admin: AdminSession,
    Json(body): Json<NewFlashSale>,
) -> Result<(StatusCode, Json<Record>), ApiError> {
    let sale = admin::create_flash_sale(state.store.as_ref(), body, &state.config.fetch).await?;
    Ok((StatusCode::CREATED, Json(sale)))
}
