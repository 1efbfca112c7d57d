use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Subject carried by every admin session token.
pub const ADMIN_SUBJECT: &str = "admin";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("login disabled: no admin password configured")]
    LoginDisabled,
    #[error("invalid session")]
    InvalidSession,
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Internal(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Internal(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Check the submitted password against the configured hash and issue a
/// session token on success.
pub fn login(
    password: &str,
    password_hash: Option<&str>,
    secret: &str,
    ttl_secs: u64,
) -> Result<String, AuthError> {
    let hash = password_hash.ok_or(AuthError::LoginDisabled)?;
    if !verify_password(password, hash)? {
        return Err(AuthError::InvalidCredentials);
    }
    create_session(secret, ttl_secs)
}

pub fn create_session(secret: &str, ttl_secs: u64) -> Result<String, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::Internal("session secret is empty".into()));
    }
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = SessionClaims {
        sub: ADMIN_SUBJECT.to_string(),
        iat: now,
        exp: now + ttl_secs as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Internal(e.to_string()))
}

pub fn validate_session(token: &str, secret: &str) -> Result<SessionClaims, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::InvalidSession);
    }
    let claims = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AuthError::InvalidSession)?;
    if claims.sub != ADMIN_SUBJECT {
        return Err(AuthError::InvalidSession);
    }
    Ok(claims)
}

/// Fixed one-minute window of login attempts per client key.
pub struct LoginThrottle {
    per_minute: u32,
    windows: DashMap<String, (i64, u32)>,
}

impl LoginThrottle {
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute: per_minute.max(1),
            windows: DashMap::new(),
        }
    }

    /// Record an attempt. Returns false once the client is over the limit
    /// for the current minute.
    pub fn try_acquire(&self, client: &str) -> bool {
        self.try_acquire_at(client, chrono::Utc::now().timestamp() / 60)
    }

    fn try_acquire_at(&self, client: &str, minute: i64) -> bool {
        if self.windows.len() > 10_000 {
            self.windows.retain(|_, (window, _)| *window == minute);
        }
        let mut entry = self.windows.entry(client.to_string()).or_insert((minute, 0));
        if entry.0 != minute {
            *entry = (minute, 0);
        }
        if entry.1 >= self.per_minute {
            return false;
        }
        entry.1 += 1;
        true
    }
}
