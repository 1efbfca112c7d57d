pub mod analytics;
pub mod auth;
pub mod challenges;
pub mod dashboard;
pub mod flash_sales;
pub mod products;
pub mod reports;
pub mod returns;
pub mod users;

use challenz_core::AppState;
use challenz_models::UnknownVariant;
use challenz_store::{Condition, Filter, Op};
use challenz_util::validation::sanitize_search;
use challenz_util::PageParams;
use serde::Deserialize;
use std::str::FromStr;

use crate::error::ApiError;

/// Body of every `PATCH .../{id}/status` route.
#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub(crate) fn page_params(
    state: &AppState,
    page: Option<&str>,
    limit: Option<&str>,
) -> Result<PageParams, ApiError> {
    Ok(PageParams::parse(page, limit, state.config.max_page_size)?)
}

/// Parse an enum query parameter. Blank and `all` mean no value.
pub(crate) fn enum_param<T>(raw: Option<&str>) -> Result<Option<T>, ApiError>
where
    T: FromStr<Err = UnknownVariant>,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) if value.eq_ignore_ascii_case("all") => Ok(None),
        Some(value) => Ok(Some(value.parse()?)),
    }
}

/// `eq` filter on an enum column. Blank and `all` mean no filter.
pub(crate) fn enum_filter<T>(field: &str, raw: Option<&str>) -> Result<Option<Filter>, ApiError>
where
    T: FromStr<Err = UnknownVariant> + std::fmt::Display,
{
    Ok(enum_param::<T>(raw)?.map(|parsed| Filter::eq(field, parsed.to_string())))
}

/// Plain-text `eq` filter for free-form columns such as region or category.
pub(crate) fn text_filter(field: &str, raw: Option<&str>) -> Option<Filter> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
        .map(|value| Filter::eq(field, value))
}

/// Case-insensitive substring match of `raw` against any of `fields`.
pub(crate) fn search_filter(fields: &[&str], raw: Option<&str>) -> Result<Option<Filter>, ApiError> {
    let Some(term) = sanitize_search(raw)? else {
        return Ok(None);
    };
    let pattern = format!("%{term}%");
    Ok(Some(Filter::or(
        fields
            .iter()
            .map(|field| Condition::new(*field, Op::Ilike, pattern.as_str()))
            .collect(),
    )))
}
