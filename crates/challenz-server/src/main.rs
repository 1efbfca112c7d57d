use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use challenz_core::AppState;
use challenz_store::{Backend, MemoryStore, PostgrestConfig, PostgrestStore, SqlStore};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

use cli::Command;
use config::{Config, LogFormat, StoreBackend};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    if let Some(Command::HashPassword { password }) = &args.command {
        let hash = challenz_core::auth::hash_password(password)?;
        println!("{hash}");
        return Ok(());
    }

    init_tracing(config::startup_log_format(&args.config));
    let config = Config::load(&args.config)?;
    tracing::info!(path = %args.config, "configuration loaded");

    let app_config = config.app_config()?;
    ensure_data_dirs(&config);
    let store = connect_store(&config, app_config.fetch.query_timeout).await?;
    let backend_kind = store.kind();

    let router = challenz_api::build_router(&app_config);
    let state = AppState::new(store, app_config);
    let shutdown_notify = state.shutdown.clone();
    let environment = state.config.environment;
    let app = router.with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    print_startup_banner(&config.server.bind_address, environment.as_str(), backend_kind);

    let shutdown_signal = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                tracing::info!("Shutting down (ctrl-c)...");
            }
            _ = shutdown_notify.notified() => {
                tracing::info!("Shutting down (requested)...");
            }
        }
    };

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("challenz=info,tower_http=debug"));
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

async fn connect_store(config: &Config, query_timeout: Duration) -> Result<Backend> {
    let store = &config.store;
    let backend = match store.backend {
        StoreBackend::Memory => match &store.seed_path {
            Some(path) => Backend::Memory(MemoryStore::load_seed(path).await?),
            None => {
                tracing::warn!("memory store has no seed_path; every collection starts empty");
                Backend::Memory(MemoryStore::new())
            }
        },
        StoreBackend::Sql => {
            let statement_timeout = (store.statement_timeout_secs > 0)
                .then(|| Duration::from_secs(store.statement_timeout_secs));
            let sql =
                SqlStore::connect(&store.database_url, store.max_connections, statement_timeout)
                    .await?;
            sql.run_migrations().await?;
            Backend::Sql(sql)
        }
        StoreBackend::Postgrest => Backend::Postgrest(PostgrestStore::new(PostgrestConfig {
            base_url: store.rest_url.clone(),
            service_key: store.service_key.clone(),
            request_timeout: Some(query_timeout),
        })?),
    };
    Ok(backend)
}

/// Ensure the SQLite database directory exists before connecting.
fn ensure_data_dirs(config: &Config) {
    if config.store.backend != StoreBackend::Sql {
        return;
    }
    if let Some(db_path) = config
        .store
        .database_url
        .strip_prefix("sqlite://")
        .and_then(|s| s.split('?').next())
    {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!("Could not create directory '{}': {}", parent.display(), e);
                }
            }
        }
    }
}

fn print_startup_banner(bind_address: &str, environment: &str, backend: &str) {
    println!();
    println!("  Challenz Admin");
    println!();
    println!("  Listening:   http://{}", bind_address);
    println!("  Environment: {}", environment);
    println!("  Store:       {}", backend);
    println!();
}
