use axum::{
    extract::{Path, Query, State},
    Json,
};
use challenz_core::admin::{self, StatusTarget};
use challenz_core::fetcher::{self, PageRequest, PageResult};
use challenz_core::AppState;
use challenz_models::{collections, UserStatus};
use challenz_store::{Projection, Record};
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::AdminSession;
use crate::routes::{enum_filter, page_params, search_filter, text_filter, UpdateStatusRequest};

#[derive(Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    pub region: Option<String>,
    pub status: Option<String>,
}

pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(params): Query<ListUsersQuery>,
) -> Result<Json<PageResult>, ApiError> {
    let page = page_params(&state, params.page.as_deref(), params.limit.as_deref())?;
    let request = PageRequest::new(collections::USERS, page)
        .filters(search_filter(&["username", "email"], params.search.as_deref())?)
        .filters(text_filter("region", params.region.as_deref()))
        .filters(enum_filter::<UserStatus>("status", params.status.as_deref())?);

    let result = fetcher::fetch_page(state.store.as_ref(), &request, &state.config.fetch).await?;
    Ok(Json(result))
}

pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<String>,
) -> Result<Json<Record>, ApiError> {
    let user = fetcher::fetch_one(
        state.store.as_ref(),
        collections::USERS,
        &id,
        &Projection::All,
        &state.config.fetch,
    )
    .await?;
    Ok(Json(user))
}

pub async fn update_user_status(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<String>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<Record>, ApiError> {
    let user = admin::update_status(
        state.store.as_ref(),
        StatusTarget::User,
        &id,
        &body.status,
        &state.config.fetch,
    )
    .await?;
    Ok(Json(user))
}
