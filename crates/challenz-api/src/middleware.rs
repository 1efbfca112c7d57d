use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use challenz_core::AppState;

use crate::error::ApiError;

pub const SESSION_COOKIE_NAME: &str = "challenz_session";

/// A request carrying a valid admin session, taken from the session cookie
/// or an `Authorization: Bearer` header.
pub struct AdminSession {
    pub expires_at: usize,
}

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .or_else(|| get_cookie_value(&parts.headers, SESSION_COOKIE_NAME))
            .ok_or(ApiError::Unauthorized)?;

        let claims =
            challenz_core::auth::validate_session(&token, &state.config.session_secret)?;

        Ok(AdminSession {
            expires_at: claims.exp,
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

pub(crate) fn get_cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|part| part.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; challenz_session=abc.def.ghi"),
        );
        assert_eq!(
            get_cookie_value(&headers, SESSION_COOKIE_NAME).as_deref(),
            Some("abc.def.ghi")
        );
        assert_eq!(get_cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn empty_cookie_counts_as_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("challenz_session="));
        assert_eq!(get_cookie_value(&headers, SESSION_COOKIE_NAME), None);
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Token abc"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc"));
    }
}
