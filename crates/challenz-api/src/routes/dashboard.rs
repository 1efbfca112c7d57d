use axum::{extract::State, Json};
use challenz_core::admin::{self, DashboardStats};
use challenz_core::AppState;

use crate::error::ApiError;
use crate::middleware::AdminSession;

pub async fn stats(
    State(state): State<AppState>,
    _admin: AdminSession,
) -> Result<Json<DashboardStats>, ApiError> {
    let stats = admin::dashboard_stats(state.store.as_ref(), &state.config.fetch).await?;
    Ok(Json(stats))
}
