use axum::{
    extract::{Path, Query, State},
    Json,
};
use challenz_core::admin::{self, StatusTarget};
use challenz_core::fetcher::{self, EnrichmentSpec, PageRequest, PageResult};
use challenz_core::AppState;
use challenz_models::{collections, ReportStatus, ReportType};
use challenz_store::Record;
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::AdminSession;
use crate::routes::{enum_filter, page_params, UpdateStatusRequest};

#[derive(Deserialize)]
pub struct ListReportsQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub report_type: Option<String>,
}

pub async fn list_reports(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(params): Query<ListReportsQuery>,
) -> Result<Json<PageResult>, ApiError> {
    let page = page_params(&state, params.page.as_deref(), params.limit.as_deref())?;
    let request = PageRequest::new(collections::REPORTS, page)
        .filters(enum_filter::<ReportStatus>("status", params.status.as_deref())?)
        .filters(enum_filter::<ReportType>("type", params.report_type.as_deref())?)
        .enrich(
            EnrichmentSpec::new("reporter_id", collections::USERS, "id", "reporter")
                .project(["id", "username"]),
        );

    let result = fetcher::fetch_page(state.store.as_ref(), &request, &state.config.fetch).await?;
    Ok(Json(result))
}

pub async fn update_report_status(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<String>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<Record>, ApiError> {
    let row = admin::update_status(
        state.store.as_ref(),
        StatusTarget::Report,
        &id,
        &body.status,
        &state.config.fetch,
    )
    .await?;
    Ok(Json(row))
}
