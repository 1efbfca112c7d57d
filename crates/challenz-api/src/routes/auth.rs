use axum::{
    body::to_bytes,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{AppendHeaders, IntoResponse},
    Json,
};
use challenz_core::AppState;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;

use crate::error::ApiError;
use crate::middleware::{AdminSession, SESSION_COOKIE_NAME};

const SESSION_COOKIE_PATH: &str = "/api";
const MAX_LOGIN_BODY_BYTES: usize = 16 * 1024;

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    password: String,
}

fn build_session_cookie(token: &str, ttl_seconds: u64, secure: bool) -> String {
    let secure_attr = if secure { "; Secure" } else { "" };
    format!(
        "{name}={value}; HttpOnly; Path={path}; SameSite=Strict; Max-Age={max_age}{secure}",
        name = SESSION_COOKIE_NAME,
        value = token,
        path = SESSION_COOKIE_PATH,
        max_age = ttl_seconds,
        secure = secure_attr,
    )
}

fn build_session_cookie_clear(secure: bool) -> String {
    let secure_attr = if secure { "; Secure" } else { "" };
    format!(
        "{name}=; HttpOnly; Path={path}; SameSite=Strict; Max-Age=0{secure}",
        name = SESSION_COOKIE_NAME,
        path = SESSION_COOKIE_PATH,
        secure = secure_attr,
    )
}

fn should_use_secure_cookie(state: &AppState) -> bool {
    !state.config.environment.is_development()
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("invalid header value: {e}")))
}

pub async fn login(State(state): State<AppState>, request: Request) -> Result<impl IntoResponse, ApiError> {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "local".to_string());
    if !state.login_throttle.try_acquire(&client) {
        tracing::warn!(client = %client, "login throttled");
        return Err(ApiError::RateLimited);
    }

    let (_, body) = request.into_parts();
    let body_bytes = to_bytes(body, MAX_LOGIN_BODY_BYTES)
        .await
        .map_err(|_| ApiError::BadRequest("invalid login request body".into()))?;
    let body: LoginRequest = serde_json::from_slice(&body_bytes)
        .map_err(|_| ApiError::BadRequest("invalid login request body".into()))?;

    let token = match challenz_core::auth::login(
        &body.password,
        state.config.admin_password_hash.as_deref(),
        &state.config.session_secret,
        state.config.session_ttl_seconds,
    ) {
        Ok(token) => token,
        Err(err) => {
            tracing::warn!(client = %client, error = %err, "admin login rejected");
            return Err(err.into());
        }
    };
    tracing::info!(client = %client, "admin session issued");

    let cookie = build_session_cookie(
        &token,
        state.config.session_ttl_seconds,
        should_use_secure_cookie(&state),
    );
    Ok((
        StatusCode::OK,
        AppendHeaders([(header::SET_COOKIE, header_value(&cookie)?)]),
        Json(json!({
            "token": token,
            "expires_in": state.config.session_ttl_seconds,
        })),
    ))
}

pub async fn logout(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let cookie = build_session_cookie_clear(should_use_secure_cookie(&state));
    Ok((
        StatusCode::NO_CONTENT,
        AppendHeaders([(header::SET_COOKIE, header_value(&cookie)?)]),
    ))
}

pub async fn session(session: AdminSession) -> impl IntoResponse {
    Json(json!({
        "authenticated": true,
        "expires_at": session.expires_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_is_http_only_and_scoped() {
        let cookie = build_session_cookie("tok", 3600, true);
        assert!(cookie.starts_with("challenz_session=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Path=/api"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(cookie.ends_with("; Secure"));
        assert!(!build_session_cookie("tok", 60, false).contains("Secure"));
    }

    #[test]
    fn clearing_cookie_expires_it() {
        let cookie = build_session_cookie_clear(false);
        assert!(cookie.starts_with("challenz_session=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
