//! Backing-store capability used by every admin view.
//!
//! The dashboard never talks to a table directly; it goes through [`Store`],
//! which exposes the five operations the hosted table API offers (count,
//! ranged query, single-row query, filtered update, insert). Three
//! implementations exist and [`Backend`] picks one at startup:
//!
//! - [`MemoryStore`] keeps tables in process, for tests and demo mode.
//! - [`SqlStore`] runs parameterised SQL on SQLite or PostgreSQL via sqlx.
//! - [`PostgrestStore`] speaks the PostgREST HTTP dialect of the hosted
//!   database service.

pub mod filter;
pub mod memory;
pub mod postgrest;
pub mod sql;

use serde_json::{Map, Value};
use thiserror::Error;

pub use filter::{check_identifier, Condition, Filter, Op, Order, Projection, Range, Select};
pub use memory::MemoryStore;
pub use postgrest::{PostgrestConfig, PostgrestStore};
pub use sql::{DatabaseEngine, SqlStore};

/// A single row, keyed by column name.
pub type Record = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("unknown collection '{0}'")]
    UnknownCollection(String),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("store responded with {status}: {message}")]
    Backend { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected store response: {0}")]
    Decode(String),
    #[error("store misconfigured: {0}")]
    Config(String),
}

#[allow(async_fn_in_trait)]
pub trait Store: Send + Sync {
    /// Number of rows matching every filter.
    async fn count(&self, collection: &str, filters: &[Filter]) -> Result<u64, StoreError>;

    /// Matching rows in `select.order`, restricted to `select.range`.
    async fn query(&self, collection: &str, select: &Select) -> Result<Vec<Record>, StoreError>;

    /// First matching row, if any.
    async fn query_one(
        &self,
        collection: &str,
        filters: &[Filter],
        projection: &Projection,
    ) -> Result<Option<Record>, StoreError>;

    /// Merge `patch` into every matching row and return the rows as written.
    /// At least one filter is required.
    async fn update(
        &self,
        collection: &str,
        filters: &[Filter],
        patch: &Record,
    ) -> Result<Vec<Record>, StoreError>;

    async fn insert(&self, collection: &str, records: Vec<Record>)
        -> Result<Vec<Record>, StoreError>;
}

/// The store selected in configuration.
pub enum Backend {
    Memory(MemoryStore),
    Sql(SqlStore),
    Postgrest(PostgrestStore),
}

impl Backend {
    pub fn kind(&self) -> &'static str {
        match self {
            Backend::Memory(_) => "memory",
            Backend::Sql(_) => "sql",
            Backend::Postgrest(_) => "postgrest",
        }
    }
}

impl Store for Backend {
    async fn count(&self, collection: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        match self {
            Backend::Memory(s) => s.count(collection, filters).await,
            Backend::Sql(s) => s.count(collection, filters).await,
            Backend::Postgrest(s) => s.count(collection, filters).await,
        }
    }

    async fn query(&self, collection: &str, select: &Select) -> Result<Vec<Record>, StoreError> {
        match self {
            Backend::Memory(s) => s.query(collection, select).await,
            Backend::Sql(s) => s.query(collection, select).await,
            Backend::Postgrest(s) => s.query(collection, select).await,
        }
    }

    async fn query_one(
        &self,
        collection: &str,
        filters: &[Filter],
        projection: &Projection,
    ) -> Result<Option<Record>, StoreError> {
        match self {
            Backend::Memory(s) => s.query_one(collection, filters, projection).await,
            Backend::Sql(s) => s.query_one(collection, filters, projection).await,
            Backend::Postgrest(s) => s.query_one(collection, filters, projection).await,
        }
    }

    async fn update(
        &self,
        collection: &str,
        filters: &[Filter],
        patch: &Record,
    ) -> Result<Vec<Record>, StoreError> {
        match self {
            Backend::Memory(s) => s.update(collection, filters, patch).await,
            Backend::Sql(s) => s.update(collection, filters, patch).await,
            Backend::Postgrest(s) => s.update(collection, filters, patch).await,
        }
    }

    async fn insert(
        &self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, StoreError> {
        match self {
            Backend::Memory(s) => s.insert(collection, records).await,
            Backend::Sql(s) => s.insert(collection, records).await,
            Backend::Postgrest(s) => s.insert(collection, records).await,
        }
    }
}

/// Shared precondition for `update` on every backend.
pub(crate) fn check_write(
    collection: &str,
    filters: &[Filter],
    patch: &Record,
) -> Result<(), StoreError> {
    check_identifier(collection)?;
    if filters.is_empty() {
        return Err(StoreError::InvalidFilter(
            "update requires at least one filter".into(),
        ));
    }
    filter::validate_filters(filters)?;
    if patch.is_empty() {
        return Err(StoreError::InvalidFilter("empty patch".into()));
    }
    patch.keys().try_for_each(|k| check_identifier(k))
}
