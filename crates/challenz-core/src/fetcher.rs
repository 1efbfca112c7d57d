//! Paginated collection fetcher.
//!
//! Every list view goes through [`fetch_page`]: it turns `page`/`limit` into a
//! row range, runs the count and the data query concurrently, resolves
//! foreign-key style references with one batched `IN` lookup per
//! [`EnrichmentSpec`], and returns the rows with pagination metadata.
//!
//! Store calls run inside the caller's task. Dropping the returned future
//! (for example when the HTTP client disconnects) drops every in-flight
//! lookup with it.

use challenz_store::{Filter, Order, Projection, Range, Record, Select, Store, StoreError};
use challenz_util::PageParams;
use futures_util::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_CONCURRENT_LOOKUPS: usize = 8;

#[derive(Clone, Copy, Debug)]
pub struct FetchOptions {
    /// Upper bound for each individual store call.
    pub query_timeout: Duration,
    /// Enrichment lookups allowed in flight at once for a single page.
    pub max_concurrent_lookups: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            max_concurrent_lookups: DEFAULT_MAX_CONCURRENT_LOOKUPS,
        }
    }
}

/// The store call that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Count,
    Data,
    Enrich(String),
    Lookup,
    Update(String),
    Insert(String),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Count => f.write_str("count"),
            Stage::Data => f.write_str("data"),
            Stage::Enrich(collection) => write!(f, "enrich({collection})"),
            Stage::Lookup => f.write_str("lookup"),
            Stage::Update(collection) => write!(f, "update({collection})"),
            Stage::Insert(collection) => write!(f, "insert({collection})"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Validation(String),
    #[error("{collection} '{id}' not found")]
    NotFound { collection: String, id: String },
    #[error("{stage} query failed: {message}")]
    QueryFailed { stage: Stage, message: String },
}

impl From<challenz_util::PageParamError> for FetchError {
    fn from(err: challenz_util::PageParamError) -> Self {
        FetchError::Validation(err.to_string())
    }
}

/// Resolve `row[local_key]` against `remote_collection.remote_key` and store
/// the matching record (or `null`) under `result_field`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentSpec {
    pub local_key: String,
    pub remote_collection: String,
    pub remote_key: String,
    pub result_field: String,
    pub projection: Projection,
    /// Tie-break when several remote rows share a key. Empty means the
    /// store's natural order.
    pub order: Vec<Order>,
}

impl EnrichmentSpec {
    pub fn new(
        local_key: impl Into<String>,
        remote_collection: impl Into<String>,
        remote_key: impl Into<String>,
        result_field: impl Into<String>,
    ) -> Self {
        Self {
            local_key: local_key.into(),
            remote_collection: remote_collection.into(),
            remote_key: remote_key.into(),
            result_field: result_field.into(),
            projection: Projection::All,
            order: Vec::new(),
        }
    }

    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Projection::fields(fields);
        self
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    /// The join needs the remote key even when the caller projected it away.
    fn lookup_projection(&self) -> Projection {
        match &self.projection {
            Projection::Fields(fields) if !fields.contains(&self.remote_key) => {
                let mut fields = fields.clone();
                fields.push(self.remote_key.clone());
                Projection::Fields(fields)
            }
            other => other.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub collection: String,
    pub params: PageParams,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub projection: Projection,
    pub enrich: Vec<EnrichmentSpec>,
}

impl PageRequest {
    /// A request ordered newest first by `created_at`.
    pub fn new(collection: impl Into<String>, params: PageParams) -> Self {
        Self {
            collection: collection.into(),
            params,
            filters: Vec::new(),
            order: vec![Order::desc("created_at")],
            projection: Projection::All,
            enrich: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    /// Replace the default ordering.
    pub fn order_by(mut self, order: Vec<Order>) -> Self {
        self.order = order;
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn enrich(mut self, spec: EnrichmentSpec) -> Self {
        self.enrich.push(spec);
        self
    }

    fn select(&self) -> Select {
        let mut projection = self.projection.clone();
        if let Projection::Fields(fields) = &mut projection {
            for spec in &self.enrich {
                if !fields.contains(&spec.local_key) {
                    fields.push(spec.local_key.clone());
                }
            }
        }
        let select = Select::new()
            .filters(self.filters.clone())
            .range(Range::new(self.params.offset(), self.params.limit))
            .projection(projection);
        self.order.iter().cloned().fold(select, Select::order)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_items: u64,
    pub items_per_page: u32,
}

impl Pagination {
    /// `current_page` is echoed as requested, even past the last page.
    pub fn new(page: u32, limit: u32, total_items: u64) -> Self {
        Self {
            current_page: page,
            total_pages: total_items.div_ceil(u64::from(limit.max(1))),
            total_items,
            items_per_page: limit,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    pub items: Vec<Record>,
    pub pagination: Pagination,
}

/// Run one store call under `timeout`, labelling any failure with `stage`.
pub async fn run_stage<T, F>(
    stage: Stage,
    collection: &str,
    timeout: Duration,
    call: F,
) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tracing::debug!(collection, stage = %stage, "store call");
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(FetchError::QueryFailed {
            stage,
            message: err.to_string(),
        }),
        Err(_) => Err(FetchError::QueryFailed {
            stage,
            message: format!("timed out after {}ms", timeout.as_millis()),
        }),
    }
}

pub async fn fetch_page<S: Store>(
    store: &S,
    request: &PageRequest,
    options: &FetchOptions,
) -> Result<PageResult, FetchError> {
    let PageParams { page, limit } = request.params;
    if page == 0 {
        return Err(FetchError::Validation("page must be at least 1".into()));
    }
    if limit == 0 {
        return Err(FetchError::Validation("limit must be at least 1".into()));
    }

    let select = request.select();
    let count = run_stage(
        Stage::Count,
        &request.collection,
        options.query_timeout,
        store.count(&request.collection, &request.filters),
    );
    let data = async {
        let mut rows = run_stage(
            Stage::Data,
            &request.collection,
            options.query_timeout,
            store.query(&request.collection, &select),
        )
        .await?;
        enrich_records(store, &mut rows, &request.enrich, options).await?;
        Ok::<_, FetchError>(rows)
    };
    let (total, items) = tokio::try_join!(count, data)?;

    Ok(PageResult {
        items,
        pagination: Pagination::new(page, limit, total),
    })
}

/// Single record by `id`. A missing row is `NotFound`, never a query failure.
pub async fn fetch_one<S: Store>(
    store: &S,
    collection: &str,
    id: &str,
    projection: &Projection,
    options: &FetchOptions,
) -> Result<Record, FetchError> {
    let filters = [Filter::eq("id", id)];
    run_stage(
        Stage::Lookup,
        collection,
        options.query_timeout,
        store.query_one(collection, &filters, projection),
    )
    .await?
    .ok_or_else(|| FetchError::NotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    })
}

/// Apply every spec to `rows` with one batched lookup per spec.
pub async fn enrich_records<S: Store>(
    store: &S,
    rows: &mut [Record],
    specs: &[EnrichmentSpec],
    options: &FetchOptions,
) -> Result<(), FetchError> {
    if specs.is_empty() || rows.is_empty() {
        return Ok(());
    }
    let width = options.max_concurrent_lookups.min(rows.len()).max(1);
    let keys: Vec<Vec<Value>> = specs
        .iter()
        .map(|spec| distinct_keys(rows, &spec.local_key))
        .collect();

    let lookups: Vec<_> = specs
        .iter()
        .zip(keys)
        .map(|(spec, keys)| lookup(store, spec, keys, options.query_timeout))
        .collect();
    let matches: Vec<HashMap<String, Record>> = stream::iter(lookups)
        .buffered(width)
        .try_collect()
        .await?;

    for (spec, found) in specs.iter().zip(&matches) {
        for row in rows.iter_mut() {
            let value = row
                .get(&spec.local_key)
                .and_then(join_key)
                .and_then(|key| found.get(&key))
                .map(|record| Value::Object(record.clone()))
                .unwrap_or(Value::Null);
            row.insert(spec.result_field.clone(), value);
        }
    }
    Ok(())
}

async fn lookup<S: Store>(
    store: &S,
    spec: &EnrichmentSpec,
    keys: Vec<Value>,
    timeout: Duration,
) -> Result<HashMap<String, Record>, FetchError> {
    if keys.is_empty() {
        return Ok(HashMap::new());
    }
    let select = spec.order.iter().cloned().fold(
        Select::new()
            .filter(Filter::is_in(spec.remote_key.clone(), keys))
            .projection(spec.lookup_projection()),
        Select::order,
    );
    let rows = run_stage(
        Stage::Enrich(spec.remote_collection.clone()),
        &spec.remote_collection,
        timeout,
        store.query(&spec.remote_collection, &select),
    )
    .await?;

    let mut by_key = HashMap::with_capacity(rows.len());
    for row in rows {
        let Some(key) = row.get(&spec.remote_key).and_then(join_key) else {
            continue;
        };
        match by_key.entry(key) {
            Entry::Occupied(entry) => {
                tracing::warn!(
                    collection = %spec.remote_collection,
                    field = %spec.remote_key,
                    key = %entry.key(),
                    "several records match enrichment key, keeping the first"
                );
            }
            Entry::Vacant(entry) => {
                entry.insert(row);
            }
        }
    }
    Ok(by_key)
}

fn distinct_keys(rows: &[Record], field: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| row.get(field))
        .filter(|value| join_key(value).is_some_and(|key| seen.insert(key)))
        .cloned()
        .collect()
}

/// Keys compare by their text form so `7` and `"7"` join.
fn join_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
