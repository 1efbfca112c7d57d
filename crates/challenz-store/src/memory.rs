use crate::filter::{check_identifier, validate_filters, Condition, Filter, Op, Order, Projection, Select};
use crate::{check_write, Record, Store, StoreError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

/// In-process tables. Rows keep insertion order, which is the "natural"
/// order returned when a query names no ordering.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `{ "<collection>": [ {row}, ... ], ... }`.
    pub fn from_json(seed: Value) -> Result<Self, StoreError> {
        let Value::Object(collections) = seed else {
            return Err(StoreError::Decode("seed must be a JSON object".into()));
        };
        let mut tables = HashMap::with_capacity(collections.len());
        for (name, rows) in collections {
            check_identifier(&name)?;
            let Value::Array(rows) = rows else {
                return Err(StoreError::Decode(format!(
                    "seed collection '{name}' must be an array"
                )));
            };
            let rows = rows
                .into_iter()
                .map(|row| match row {
                    Value::Object(record) => Ok(record),
                    other => Err(StoreError::Decode(format!(
                        "seed row in '{name}' is not an object: {other}"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            tables.insert(name, rows);
        }
        Ok(Self {
            tables: RwLock::new(tables),
        })
    }

    pub async fn load_seed(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Config(format!("reading seed {}: {e}", path.display())))?;
        let seed: Value = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Decode(format!("parsing seed {}: {e}", path.display())))?;
        let store = Self::from_json(seed)?;
        tracing::info!(path = %path.display(), "memory store seeded");
        Ok(store)
    }

    /// Create an empty collection if it does not exist yet.
    pub async fn create_collection(&self, name: &str) -> Result<(), StoreError> {
        check_identifier(name)?;
        self.tables
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }
}

impl Store for MemoryStore {
    async fn count(&self, collection: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        check_identifier(collection)?;
        validate_filters(filters)?;
        let tables = self.tables.read().await;
        let rows = table(&tables, collection)?;
        Ok(rows.iter().filter(|r| matches_all(r, filters)).count() as u64)
    }

    async fn query(&self, collection: &str, select: &Select) -> Result<Vec<Record>, StoreError> {
        check_identifier(collection)?;
        select.validate()?;
        let tables = self.tables.read().await;
        let rows = table(&tables, collection)?;

        let mut matched: Vec<&Record> = rows
            .iter()
            .filter(|r| matches_all(r, &select.filters))
            .collect();
        if !select.order.is_empty() {
            // stable sort keeps insertion order among equal keys
            matched.sort_by(|a, b| compare_rows(a, b, &select.order));
        }

        let iter = matched.into_iter();
        let page: Vec<&Record> = match select.range {
            Some(range) => iter
                .skip(usize::try_from(range.offset).unwrap_or(usize::MAX))
                .take(range.limit as usize)
                .collect(),
            None => iter.collect(),
        };
        Ok(page
            .into_iter()
            .map(|r| project(r, &select.projection))
            .collect())
    }

    async fn query_one(
        &self,
        collection: &str,
        filters: &[Filter],
        projection: &Projection,
    ) -> Result<Option<Record>, StoreError> {
        check_identifier(collection)?;
        validate_filters(filters)?;
        projection.validate()?;
        let tables = self.tables.read().await;
        let rows = table(&tables, collection)?;
        Ok(rows
            .iter()
            .find(|r| matches_all(r, filters))
            .map(|r| project(r, projection)))
    }

    async fn update(
        &self,
        collection: &str,
        filters: &[Filter],
        patch: &Record,
    ) -> Result<Vec<Record>, StoreError> {
        check_write(collection, filters, patch)?;
        let mut tables = self.tables.write().await;
        let rows = tables
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|r| matches_all(r, filters)) {
            for (key, value) in patch {
                row.insert(key.clone(), value.clone());
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn insert(
        &self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, StoreError> {
        check_identifier(collection)?;
        for record in &records {
            record.keys().try_for_each(|k| check_identifier(k))?;
        }
        let mut tables = self.tables.write().await;
        let rows = tables
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        rows.extend(records.iter().cloned());
        Ok(records)
    }
}

fn table<'a>(
    tables: &'a HashMap<String, Vec<Record>>,
    collection: &str,
) -> Result<&'a Vec<Record>, StoreError> {
    tables
        .get(collection)
        .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))
}

fn project(record: &Record, projection: &Projection) -> Record {
    match projection {
        Projection::All => record.clone(),
        Projection::Fields(fields) => fields
            .iter()
            .map(|f| (f.clone(), record.get(f).cloned().unwrap_or(Value::Null)))
            .collect(),
    }
}

fn matches_all(record: &Record, filters: &[Filter]) -> bool {
    filters.iter().all(|f| match f {
        Filter::Where(c) => matches(record, c),
        Filter::Or(cs) => cs.iter().any(|c| matches(record, c)),
    })
}

fn matches(record: &Record, cond: &Condition) -> bool {
    let field = record.get(&cond.field).unwrap_or(&Value::Null);
    match cond.op {
        Op::Eq => loose_eq(field, &cond.value),
        Op::Ilike => match (field, &cond.value) {
            (Value::Null, _) => false,
            (Value::String(text), Value::String(pattern)) => like(text, pattern),
            (other, Value::String(pattern)) => like(&other.to_string(), pattern),
            _ => false,
        },
        Op::Gte => matches!(
            compare_values(field, &cond.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Op::Lte => matches!(
            compare_values(field, &cond.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Op::In => match &cond.value {
            Value::Array(values) => values.iter().any(|v| loose_eq(field, v)),
            _ => false,
        },
    }
}

/// Equality with the same numeric coercion a SQL column would apply to a
/// textual parameter.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match compare_values(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::String(x), Value::String(y)) => match (parse_instant(x), parse_instant(y)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            as_number(a)?.partial_cmp(&as_number(b)?)
        }
        _ => None,
    }
}

/// RFC 3339 timestamps compare as instants, so `...59Z` and `...59.999Z`
/// or differing offsets order correctly.
fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    if raw.len() < 20 || raw.as_bytes().get(10) != Some(&b'T') {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Row ordering with nulls after every value, the PostgreSQL default for
/// ascending sorts.
fn compare_rows(a: &Record, b: &Record, order: &[Order]) -> Ordering {
    for o in order {
        let x = a.get(&o.field).unwrap_or(&Value::Null);
        let y = b.get(&o.field).unwrap_or(&Value::Null);
        let ordering = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => compare_values(x, y).unwrap_or(Ordering::Equal),
        };
        let ordering = if o.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Case-insensitive SQL `LIKE` matching.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    // dp[j]: pattern[..i] matches text[..j]
    let mut dp = vec![false; text.len() + 1];
    dp[0] = true;
    for &p in &pattern {
        let mut next = vec![false; text.len() + 1];
        if p == '%' {
            let mut seen = false;
            for j in 0..=text.len() {
                seen |= dp[j];
                next[j] = seen;
            }
        } else {
            for j in 1..=text.len() {
                next[j] = dp[j - 1] && (p == '_' || p == text[j - 1]);
            }
        }
        dp = next;
    }
    dp[text.len()]
}
