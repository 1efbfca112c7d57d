use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageParamError {
    #[error("{field} must be a positive integer (got {value})")]
    NotPositive { field: &'static str, value: i64 },
    #[error("{field} is too large (got {value})")]
    TooLarge { field: &'static str, value: i64 },
}

/// Validated `page`/`limit` pair taken from a query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageParams {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageParams {
    /// Parse raw `page`/`limit` query values.
    ///
    /// Absent, empty or non-numeric values fall back to the defaults (1 and
    /// 10). Numeric values of zero or below are rejected rather than
    /// replaced, so a caller asking for `limit=0` gets a validation error
    /// instead of an empty range. `limit` is capped at `max_limit`.
    pub fn parse(
        page: Option<&str>,
        limit: Option<&str>,
        max_limit: u32,
    ) -> Result<Self, PageParamError> {
        let page = parse_positive("page", page)?.unwrap_or(DEFAULT_PAGE);
        let limit = parse_positive("limit", limit)?
            .unwrap_or(DEFAULT_LIMIT)
            .min(max_limit.max(1));
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

fn parse_positive(field: &'static str, raw: Option<&str>) -> Result<Option<u32>, PageParamError> {
    let Some(value) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let Ok(parsed) = value.parse::<i64>() else {
        return Ok(None);
    };
    if parsed < 1 {
        return Err(PageParamError::NotPositive {
            field,
            value: parsed,
        });
    }
    u32::try_from(parsed)
        .map(Some)
        .map_err(|_| PageParamError::TooLarge {
            field,
            value: parsed,
        })
}
