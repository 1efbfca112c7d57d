use axum::{
    extract::{Path, Query, State},
    Json,
};
use challenz_core::fetcher::{self, EnrichmentSpec, PageRequest, PageResult};
use challenz_core::AppState;
use challenz_models::{collections, ChallengeStatus};
use challenz_store::{Projection, Record};
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::AdminSession;
use crate::routes::{enum_filter, page_params, search_filter};

#[derive(Deserialize)]
pub struct ListChallengesQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
}

fn creator() -> EnrichmentSpec {
    EnrichmentSpec::new("creator_id", collections::USERS, "id", "creator")
        .project(["id", "username", "avatar_url"])
}

pub async fn list_challenges(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(params): Query<ListChallengesQuery>,
) -> Result<Json<PageResult>, ApiError> {
    let page = page_params(&state, params.page.as_deref(), params.limit.as_deref())?;
    let request = PageRequest::new(collections::CHALLENGES, page)
        .filters(enum_filter::<ChallengeStatus>("status", params.status.as_deref())?)
        .filters(search_filter(&["title", "description"], params.search.as_deref())?)
        .enrich(creator());

    let result = fetcher::fetch_page(state.store.as_ref(), &request, &state.config.fetch).await?;
    Ok(Json(result))
}

pub async fn get_challenge(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<String>,
) -> Result<Json<Record>, ApiError> {
    let challenge = fetcher::fetch_one(
        state.store.as_ref(),
        collections::CHALLENGES,
        &id,
        &Projection::All,
        &state.config.fetch,
    )
    .await?;
    let mut rows = vec![challenge];
    fetcher::enrich_records(state.store.as_ref(), &mut rows, &[creator()], &state.config.fetch)
        .await?;
    let challenge = rows.pop().ok_or(ApiError::NotFound)?;
    Ok(Json(challenge))
}
