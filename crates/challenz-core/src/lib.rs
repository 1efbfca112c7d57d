pub mod admin;
pub mod analytics;
pub mod auth;
pub mod error;
pub mod fetcher;

use challenz_store::Backend;
use fetcher::FetchOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Deployment environment. Only development exposes raw store messages in
/// error responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Environment::Development),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn is_development(self) -> bool {
        self == Environment::Development
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Backend>,
    pub config: AppConfig,
    pub login_throttle: Arc<auth::LoginThrottle>,
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(store: Backend, config: AppConfig) -> Self {
        Self {
            store: Arc::new(store),
            login_throttle: Arc::new(auth::LoginThrottle::new(config.login_attempts_per_minute)),
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub environment: Environment,
    /// Argon2 PHC string of the admin password. `None` disables login.
    pub admin_password_hash: Option<String>,
    pub session_secret: String,
    pub session_ttl_seconds: u64,
    /// Login attempts allowed per client per minute, successful or not.
    pub login_attempts_per_minute: u32,
    pub fetch: FetchOptions,
    pub max_page_size: u32,
    /// Artificial latency before sample analytics are returned.
    pub analytics_mock_delay: Duration,
    /// Extra origins allowed by CORS besides same-origin requests.
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            admin_password_hash: None,
            session_secret: String::new(),
            session_ttl_seconds: 8 * 60 * 60,
            login_attempts_per_minute: 10,
            fetch: FetchOptions::default(),
            max_page_size: challenz_util::pagination::MAX_LIMIT,
            analytics_mock_delay: Duration::from_millis(300),
            allowed_origins: Vec::new(),
        }
    }
}
