use axum::{
    extract::{Query, State},
    Json,
};
use challenz_core::analytics::{self, ContentPerformanceReport, EngagementReport, RevenueReport};
use challenz_core::AppState;
use challenz_util::validation::parse_date_range;
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::AdminSession;

#[derive(Deserialize)]
pub struct RevenueQuery {
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
}

pub async fn revenue(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(params): Query<RevenueQuery>,
) -> Result<Json<RevenueReport>, ApiError> {
    let (start, end) = parse_date_range(params.start_date.as_deref(), params.end_date.as_deref())?;
    let report = analytics::revenue(state.store.as_ref(), start, end, &state.config.fetch).await?;
    Ok(Json(report))
}

#[derive(Deserialize)]
pub struct EngagementQuery {
    pub days: Option<String>,
}

pub async fn engagement(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(params): Query<EngagementQuery>,
) -> Result<Json<EngagementReport>, ApiError> {
    let days = match params.days.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => Some(
            raw.parse::<i64>()
                .map_err(|_| ApiError::BadRequest(format!("days must be an integer (got '{raw}')")))?,
        ),
    };
    let report = analytics::engagement(days, state.config.analytics_mock_delay).await?;
    Ok(Json(report))
}

pub async fn content_performance(
    State(state): State<AppState>,
    _admin: AdminSession,
) -> Json<ContentPerformanceReport> {
    Json(analytics::content_performance(state.config.analytics_mock_delay).await)
}
