use crate::fetcher::FetchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<challenz_util::ValidationError> for CoreError {
    fn from(err: challenz_util::ValidationError) -> Self {
        CoreError::BadRequest(err.to_string())
    }
}

impl From<challenz_models::UnknownVariant> for CoreError {
    fn from(err: challenz_models::UnknownVariant) -> Self {
        CoreError::BadRequest(err.to_string())
    }
}
