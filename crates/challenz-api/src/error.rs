use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use challenz_core::auth::AuthError;
use challenz_core::error::CoreError;
use challenz_core::fetcher::FetchError;
use serde_json::json;
use thiserror::Error;

/// Raw failure text attached to 500 responses. Only the development
/// environment copies it into the body (see [`crate::expose_error_details`]).
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("rate limited")]
    RateLimited,
    #[error("query failed: {0}")]
    QueryFailed(String),
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, detail) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string(), None),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "too many attempts, try again later".to_string(),
                None,
            ),
            ApiError::QueryFailed(msg) => {
                tracing::error!("store query failed: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to load data".to_string(),
                    Some(msg.clone()),
                )
            }
            ApiError::Internal(err) => {
                tracing::error!("API internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                    Some(format!("{err:#}")),
                )
            }
        };
        let mut response = (status, Json(json!({ "error": message }))).into_response();
        if let Some(detail) = detail {
            response.extensions_mut().insert(ErrorDetail(detail));
        }
        response
    }
}

impl From<FetchError> for ApiError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Validation(msg) => ApiError::BadRequest(msg),
            FetchError::NotFound { .. } => ApiError::NotFound,
            err @ FetchError::QueryFailed { .. } => ApiError::QueryFailed(err.to_string()),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::NotFound => ApiError::NotFound,
            CoreError::BadRequest(msg) => ApiError::BadRequest(msg),
            CoreError::Fetch(err) => err.into(),
            CoreError::Internal(msg) => ApiError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials | AuthError::InvalidSession | AuthError::LoginDisabled => {
                ApiError::Unauthorized
            }
            AuthError::Internal(msg) => ApiError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl From<challenz_util::PageParamError> for ApiError {
    fn from(e: challenz_util::PageParamError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<challenz_util::ValidationError> for ApiError {
    fn from(e: challenz_util::ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<challenz_models::UnknownVariant> for ApiError {
    fn from(e: challenz_models::UnknownVariant) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use challenz_core::fetcher::Stage;

    #[test]
    fn fetch_errors_map_to_distinct_statuses() {
        let validation: ApiError = FetchError::Validation("limit must be at least 1".into()).into();
        assert_eq!(validation.into_response().status(), StatusCode::BAD_REQUEST);

        let missing: ApiError = FetchError::NotFound {
            collection: "users".into(),
            id: "u1".into(),
        }
        .into();
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let failed: ApiError = FetchError::QueryFailed {
            stage: Stage::Count,
            message: "connection reset".into(),
        }
        .into();
        let response = failed.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = response.extensions().get::<ErrorDetail>().expect("detail");
        assert_eq!(detail.0, "count query failed: connection reset");
    }
}
