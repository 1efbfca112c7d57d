use anyhow::{Context, Result};
use challenz_core::fetcher::FetchOptions;
use challenz_core::{AppConfig, Environment};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

fn harden_secret_file_permissions(path: &str) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// `development` exposes raw store errors in responses.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Dashboard origins allowed to call the API with credentials.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            environment: default_environment(),
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sql,
    Postgrest,
}

impl StoreBackend {
    fn as_str(self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Sql => "sql",
            StoreBackend::Postgrest => "postgrest",
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Statement timeout in seconds for PostgreSQL connections (0 = disabled).
    #[serde(default)]
    pub statement_timeout_secs: u64,
    /// Base URL of the hosted REST endpoint, e.g. `https://xyz.supabase.co/rest/v1`.
    #[serde(default)]
    pub rest_url: String,
    #[serde(default)]
    pub service_key: String,
    /// JSON file loaded into the memory backend at startup.
    pub seed_path: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            database_url: default_database_url(),
            max_connections: default_max_connections(),
            statement_timeout_secs: 0,
            rest_url: String::new(),
            service_key: String::new(),
            seed_path: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Argon2 PHC string; generate with `challenz-server hash-password`.
    pub admin_password_hash: Option<String>,
    pub session_secret: String,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: u64,
    #[serde(default = "default_login_attempts")]
    pub login_attempts_per_minute: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_password_hash: None,
            session_secret: generate_random_hex(64),
            session_ttl_seconds: default_session_ttl(),
            login_attempts_per_minute: default_login_attempts(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FetcherConfig {
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_max_concurrent_lookups")]
    pub max_concurrent_lookups: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: default_query_timeout_ms(),
            max_concurrent_lookups: default_max_concurrent_lookups(),
            max_page_size: default_max_page_size(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_mock_delay_ms")]
    pub mock_delay_ms: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            mock_delay_ms: default_mock_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" => Some(LogFormat::Pretty),
            _ => None,
        }
    }
}

/// Only the `[logging]` table, read before the subscriber exists.
#[derive(Debug, Default, Deserialize)]
struct LoggingSection {
    #[serde(default)]
    logging: LoggingConfig,
}

/// Log format to install before the full config is loaded. The file's
/// `[logging]` table is used when readable, `CHALLENZ_LOG_FORMAT` wins.
pub fn startup_log_format(path: &str) -> LogFormat {
    resolve_log_format(path, std::env::var("CHALLENZ_LOG_FORMAT").ok().as_deref())
}

fn resolve_log_format(path: &str, env_value: Option<&str>) -> LogFormat {
    if let Some(format) = env_value.and_then(LogFormat::parse) {
        return format;
    }
    fs::read_to_string(path)
        .ok()
        .and_then(|content| toml::from_str::<LoggingSection>(&content).ok())
        .map(|section| section.logging.format)
        .unwrap_or_default()
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Generate a cryptographically random hex string of the given length.
fn generate_random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..16u8);
            char::from(if idx < 10 {
                b'0' + idx
            } else {
                b'a' + idx - 10
            })
        })
        .collect()
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".into()
}
fn default_environment() -> String {
    "production".into()
}
fn default_store_backend() -> StoreBackend {
    StoreBackend::Memory
}
fn default_database_url() -> String {
    "sqlite://./data/challenz.db?mode=rwc".into()
}
fn default_max_connections() -> u32 {
    10
}
fn default_session_ttl() -> u64 {
    8 * 60 * 60
}
fn default_login_attempts() -> u32 {
    10
}
fn default_query_timeout_ms() -> u64 {
    5_000
}
fn default_max_concurrent_lookups() -> usize {
    8
}
fn default_max_page_size() -> u32 {
    challenz_util::pagination::MAX_LIMIT
}
fn default_mock_delay_ms() -> u64 {
    300
}

fn looks_like_placeholder_secret(raw: &str) -> bool {
    let normalized = raw.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return true;
    }
    normalized.contains("change_me")
        || normalized.contains("replace_me")
        || normalized.contains("replace_with")
        || normalized.starts_with("example")
        || normalized == "devsecret"
        || normalized == "secret"
}

fn validate_secret_configuration(config: &Config) -> Result<()> {
    let session_secret = config.auth.session_secret.trim();
    if session_secret.len() < 32 || looks_like_placeholder_secret(session_secret) {
        anyhow::bail!(
            "Invalid auth.session_secret: use a strong random secret (at least 32 characters) and never leave placeholder values"
        );
    }

    let environment = config.environment()?;
    let has_hash = config
        .auth
        .admin_password_hash
        .as_deref()
        .is_some_and(|h| !h.trim().is_empty());
    if !has_hash {
        if environment.is_development() {
            tracing::warn!("auth.admin_password_hash is not set; admin login is disabled");
        } else {
            anyhow::bail!(
                "auth.admin_password_hash is required in production; generate one with `challenz-server hash-password <PASSWORD>`"
            );
        }
    }

    if config.store.backend == StoreBackend::Postgrest
        && (config.store.rest_url.trim().is_empty()
            || looks_like_placeholder_secret(&config.store.service_key))
    {
        anyhow::bail!("store.backend = \"postgrest\" needs store.rest_url and a real store.service_key");
    }

    Ok(())
}

/// Generate a commented config file template with the given values filled in.
fn generate_config_template(config: &Config) -> String {
    format!(
        r#"# Challenz Admin Configuration
# Generated automatically on first run. Edit as needed.

[server]
bind_address = "{bind_address}"
# "development" exposes raw store errors in API responses.
environment = "{environment}"
# Dashboard origins allowed to send credentialed requests:
# allowed_origins = ["https://admin.example.com"]

[store]
# Backend: "memory", "sql" (SQLite/PostgreSQL URL) or "postgrest".
backend = "{backend}"
database_url = "{database_url}"
max_connections = {max_connections}
# rest_url = "https://your-project.supabase.co/rest/v1"
# service_key = "your-service-role-key"
# seed_path = "config/seed.json"

[auth]
# Generate with: challenz-server hash-password <PASSWORD>
# admin_password_hash = "$argon2id$..."
session_secret = "{session_secret}"
session_ttl_seconds = {session_ttl}
login_attempts_per_minute = {login_attempts}

[fetcher]
query_timeout_ms = {query_timeout_ms}
max_concurrent_lookups = {max_concurrent_lookups}
max_page_size = {max_page_size}

[analytics]
mock_delay_ms = {mock_delay_ms}

[logging]
# "pretty" or "json"
format = "pretty"
"#,
        bind_address = config.server.bind_address,
        environment = config.server.environment,
        backend = config.store.backend.as_str(),
        database_url = config.store.database_url,
        max_connections = config.store.max_connections,
        session_secret = config.auth.session_secret,
        session_ttl = config.auth.session_ttl_seconds,
        login_attempts = config.auth.login_attempts_per_minute,
        query_timeout_ms = config.fetcher.query_timeout_ms,
        max_concurrent_lookups = config.fetcher.max_concurrent_lookups,
        max_page_size = config.fetcher.max_page_size,
        mock_delay_ms = config.analytics.mock_delay_ms,
    )
}

// ── Config Loading ───────────────────────────────────────────────────────────

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = Self::read_or_generate(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        validate_secret_configuration(&config)?;
        Ok(config)
    }

    fn read_or_generate(path: &str) -> Result<Self> {
        let config = if Path::new(path).exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading config file '{path}'"))?;
            toml::from_str(&content).with_context(|| format!("parsing config file '{path}'"))?
        } else {
            tracing::info!("Config file not found at '{}', generating defaults...", path);
            let config = Config::default();

            if let Some(parent) = Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }

            fs::write(path, generate_config_template(&config))?;
            tracing::info!("Generated default config at '{}'", path);
            config
        };
        let _ = harden_secret_file_permissions(path);
        Ok(config)
    }

    /// Apply `CHALLENZ_*` overrides. Unparseable numeric values are ignored.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(value) = var("CHALLENZ_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = var("CHALLENZ_ENVIRONMENT") {
            self.server.environment = value;
        }
        if let Some(value) = var("CHALLENZ_ALLOWED_ORIGINS") {
            self.server.allowed_origins = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = var("CHALLENZ_STORE_BACKEND") {
            match value.trim().to_ascii_lowercase().as_str() {
                "memory" => self.store.backend = StoreBackend::Memory,
                "sql" => self.store.backend = StoreBackend::Sql,
                "postgrest" | "supabase" => self.store.backend = StoreBackend::Postgrest,
                _ => {
                    tracing::warn!(
                        "Ignoring invalid CHALLENZ_STORE_BACKEND value '{}'; expected memory, sql or postgrest",
                        value
                    );
                }
            }
        }
        if let Some(value) = var("CHALLENZ_DATABASE_URL") {
            self.store.database_url = value;
        }
        if let Some(parsed) = var("CHALLENZ_DATABASE_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            self.store.max_connections = parsed;
        }
        if let Some(value) = var("CHALLENZ_REST_URL") {
            self.store.rest_url = value;
        }
        if let Some(value) = var("CHALLENZ_SERVICE_KEY") {
            self.store.service_key = value;
        }
        if let Some(value) = var("CHALLENZ_SEED_PATH") {
            self.store.seed_path = Some(value);
        }
        if let Some(value) = var("CHALLENZ_ADMIN_PASSWORD_HASH") {
            self.auth.admin_password_hash = Some(value);
        }
        if let Some(value) = var("CHALLENZ_SESSION_SECRET") {
            self.auth.session_secret = value;
        }
        if let Some(parsed) = var("CHALLENZ_SESSION_TTL_SECONDS").and_then(|v| v.parse().ok()) {
            self.auth.session_ttl_seconds = parsed;
        }
        if let Some(parsed) = var("CHALLENZ_LOGIN_ATTEMPTS_PER_MINUTE").and_then(|v| v.parse().ok()) {
            self.auth.login_attempts_per_minute = parsed;
        }
        if let Some(parsed) = var("CHALLENZ_QUERY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.fetcher.query_timeout_ms = parsed;
        }
        if let Some(parsed) = var("CHALLENZ_MAX_PAGE_SIZE").and_then(|v| v.parse::<u32>().ok()) {
            self.fetcher.max_page_size = parsed.clamp(1, 1000);
        }
        if let Some(parsed) = var("CHALLENZ_ANALYTICS_MOCK_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.analytics.mock_delay_ms = parsed;
        }
        if let Some(value) = var("CHALLENZ_LOG_FORMAT") {
            match LogFormat::parse(&value) {
                Some(format) => self.logging.format = format,
                None => tracing::warn!("Ignoring invalid CHALLENZ_LOG_FORMAT value '{}'", value),
            }
        }
    }

    pub fn environment(&self) -> Result<Environment> {
        Environment::parse(&self.server.environment).with_context(|| {
            format!(
                "server.environment must be \"development\" or \"production\" (got \"{}\")",
                self.server.environment
            )
        })
    }

    pub fn app_config(&self) -> Result<AppConfig> {
        Ok(AppConfig {
            environment: self.environment()?,
            admin_password_hash: self
                .auth
                .admin_password_hash
                .clone()
                .filter(|h| !h.trim().is_empty()),
            session_secret: self.auth.session_secret.clone(),
            session_ttl_seconds: self.auth.session_ttl_seconds,
            login_attempts_per_minute: self.auth.login_attempts_per_minute,
            fetch: FetchOptions {
                query_timeout: Duration::from_millis(self.fetcher.query_timeout_ms.max(1)),
                max_concurrent_lookups: self.fetcher.max_concurrent_lookups.max(1),
            },
            max_page_size: self.fetcher.max_page_size.max(1),
            analytics_mock_delay: Duration::from_millis(self.analytics.mock_delay_ms),
            allowed_origins: self.server.allowed_origins.clone(),
        })
    }
}
