use crate::filter::{check_identifier, validate_filters, Condition, Filter, Op, Projection, Select};
use crate::{check_write, Record, Store, StoreError};
use serde_json::{Number, Value};
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Column, Row};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseEngine {
    Sqlite,
    Postgres,
}

impl DatabaseEngine {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }

    pub fn detect(database_url: &str) -> Result<Self, StoreError> {
        let normalized = database_url.trim().to_ascii_lowercase();
        if normalized.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else if normalized.starts_with("postgres://") || normalized.starts_with("postgresql://")
        {
            Ok(Self::Postgres)
        } else {
            Err(StoreError::Config(format!(
                "unsupported database URL scheme in '{database_url}'"
            )))
        }
    }

    fn placeholder(self, index: usize) -> String {
        match self {
            Self::Sqlite => format!("?{index}"),
            Self::Postgres => format!("${index}"),
        }
    }
}

/// Tables in a SQL database reached through sqlx's `Any` driver.
#[derive(Clone)]
pub struct SqlStore {
    pool: AnyPool,
    engine: DatabaseEngine,
}

impl SqlStore {
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        statement_timeout: Option<Duration>,
    ) -> Result<Self, StoreError> {
        let engine = DatabaseEngine::detect(database_url)?;

        // Required once before using sqlx::Any.
        sqlx::any::install_default_drivers();

        let statement_timeout_secs = statement_timeout.map(|d| d.as_secs().max(1));
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    match engine {
                        DatabaseEngine::Sqlite => {
                            sqlx::query("PRAGMA journal_mode = WAL;")
                                .execute(&mut *conn)
                                .await?;
                            sqlx::query("PRAGMA busy_timeout = 5000;")
                                .execute(&mut *conn)
                                .await?;
                        }
                        DatabaseEngine::Postgres => {
                            if let Some(secs) = statement_timeout_secs {
                                let sql = format!("SET statement_timeout = '{secs}s'");
                                sqlx::query(&sql).execute(&mut *conn).await?;
                            }
                            sqlx::query("SET timezone = 'UTC'")
                                .execute(&mut *conn)
                                .await?;
                        }
                    }
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;

        tracing::info!(engine = engine.as_str(), "sql store connected");
        Ok(Self { pool, engine })
    }

    pub fn from_pool(pool: AnyPool, engine: DatabaseEngine) -> Self {
        Self { pool, engine }
    }

    pub fn engine(&self) -> DatabaseEngine {
        self.engine
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Create the dashboard tables if they are missing.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        match self.engine {
            DatabaseEngine::Sqlite => sqlx::migrate!("./migrations").run(&self.pool).await,
            DatabaseEngine::Postgres => sqlx::migrate!("./migrations_pg").run(&self.pool).await,
        }
        .map_err(|e| StoreError::Sqlx(e.into()))?;
        tracing::info!("migrations: applied successfully");
        Ok(())
    }
}

impl Store for SqlStore {
    async fn count(&self, collection: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        check_identifier(collection)?;
        validate_filters(filters)?;
        let mut params = Vec::new();
        let where_sql = where_clause(self.engine, filters, &mut params);
        let sql = format!("SELECT COUNT(*) FROM {}{where_sql}", quote(collection));
        tracing::debug!(%sql, "sql count");
        let row = bind_all(sqlx::query(&sql), params)
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = row.try_get(0)?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn query(&self, collection: &str, select: &Select) -> Result<Vec<Record>, StoreError> {
        check_identifier(collection)?;
        select.validate()?;
        let mut params = Vec::new();
        let mut sql = format!(
            "SELECT {} FROM {}{}",
            columns(&select.projection),
            quote(collection),
            where_clause(self.engine, &select.filters, &mut params)
        );
        if !select.order.is_empty() {
            let terms: Vec<String> = select
                .order
                .iter()
                .map(|o| {
                    let dir = if o.descending { "DESC" } else { "ASC" };
                    format!("{} {dir}", quote(&o.field))
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        if let Some(range) = select.range {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", range.limit, range.offset));
        }
        tracing::debug!(%sql, "sql query");
        let rows = bind_all(sqlx::query(&sql), params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
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
        let mut params = Vec::new();
        let sql = format!(
            "SELECT {} FROM {}{} LIMIT 1",
            columns(projection),
            quote(collection),
            where_clause(self.engine, filters, &mut params)
        );
        let row = bind_all(sqlx::query(&sql), params)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn update(
        &self,
        collection: &str,
        filters: &[Filter],
        patch: &Record,
    ) -> Result<Vec<Record>, StoreError> {
        check_write(collection, filters, patch)?;
        let mut params: Vec<Value> = Vec::with_capacity(patch.len());
        let assignments: Vec<String> = patch
            .iter()
            .map(|(key, value)| {
                params.push(value.clone());
                format!("{} = {}", quote(key), self.engine.placeholder(params.len()))
            })
            .collect();
        let where_sql = where_clause(self.engine, filters, &mut params);
        let sql = format!(
            "UPDATE {} SET {}{where_sql} RETURNING *",
            quote(collection),
            assignments.join(", ")
        );
        tracing::debug!(%sql, "sql update");
        let rows = bind_all(sqlx::query(&sql), params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn insert(
        &self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, StoreError> {
        check_identifier(collection)?;
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(records.len());
        for record in records {
            if record.is_empty() {
                return Err(StoreError::InvalidFilter("cannot insert an empty row".into()));
            }
            record.keys().try_for_each(|k| check_identifier(k))?;
            let cols: Vec<String> = record.keys().map(|k| quote(k)).collect();
            let placeholders: Vec<String> = (1..=record.len())
                .map(|i| self.engine.placeholder(i))
                .collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
                quote(collection),
                cols.join(", "),
                placeholders.join(", ")
            );
            let params: Vec<Value> = record.into_iter().map(|(_, v)| v).collect();
            let row = bind_all(sqlx::query(&sql), params)
                .fetch_one(&mut *tx)
                .await?;
            inserted.push(row_to_record(&row)?);
        }
        tx.commit().await?;
        Ok(inserted)
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn columns(projection: &Projection) -> String {
    match projection {
        Projection::All => "*".to_string(),
        Projection::Fields(fields) => fields.iter().map(|f| quote(f)).collect::<Vec<_>>().join(", "),
    }
}

/// Renders ` WHERE ...` (or nothing) and appends the bound values to
/// `params`, numbering placeholders after whatever is already there.
fn where_clause(engine: DatabaseEngine, filters: &[Filter], params: &mut Vec<Value>) -> String {
    if filters.is_empty() {
        return String::new();
    }
    let terms: Vec<String> = filters
        .iter()
        .map(|f| match f {
            Filter::Where(c) => condition_sql(engine, c, params),
            Filter::Or(cs) => {
                let parts: Vec<String> = cs
                    .iter()
                    .map(|c| condition_sql(engine, c, params))
                    .collect();
                format!("({})", parts.join(" OR "))
            }
        })
        .collect();
    format!(" WHERE {}", terms.join(" AND "))
}

fn condition_sql(engine: DatabaseEngine, cond: &Condition, params: &mut Vec<Value>) -> String {
    let column = quote(&cond.field);
    let mut bind = |value: &Value| {
        params.push(value.clone());
        engine.placeholder(params.len())
    };
    match cond.op {
        Op::Eq if cond.value.is_null() => format!("{column} IS NULL"),
        Op::Eq => format!("{column} = {}", bind(&cond.value)),
        Op::Ilike => format!("LOWER({column}) LIKE LOWER({})", bind(&cond.value)),
        Op::Gte => format!("{column} >= {}", bind(&cond.value)),
        Op::Lte => format!("{column} <= {}", bind(&cond.value)),
        Op::In => {
            let values = cond.value.as_array().map(Vec::as_slice).unwrap_or_default();
            if values.is_empty() {
                return "1 = 0".to_string();
            }
            let placeholders: Vec<String> = values.iter().map(&mut bind).collect();
            format!("{column} IN ({})", placeholders.join(", "))
        }
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    params: Vec<Value>,
) -> Query<'q, Any, AnyArguments<'q>> {
    for value in params {
        query = match value {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => query.bind(s),
            other @ (Value::Array(_) | Value::Object(_)) => query.bind(other.to_string()),
        };
    }
    query
}

/// Decode a row without knowing its schema: each column is tried as
/// integer, float, text, then boolean.
fn row_to_record(row: &AnyRow) -> Result<Record, StoreError> {
    let mut record = Record::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let value = if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            v.and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            v.map(Value::String).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
            v.map(Value::Bool).unwrap_or(Value::Null)
        } else {
            return Err(StoreError::Decode(format!(
                "column '{}' has an unsupported type",
                column.name()
            )));
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Order, Range};
    use serde_json::json;

    async fn store() -> SqlStore {
        let store = SqlStore::connect("sqlite::memory:", 1, None)
            .await
            .expect("pool");
        sqlx::query(
            "CREATE TABLE products (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT,
                price REAL NOT NULL,
                stock INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(store.pool())
        .await
        .expect("create table");
        for (id, name, category, price, stock, created_at) in [
            ("p1", "Red Shoes", Some("shoes"), 49.5, 3, "2024-02-01"),
            ("p2", "Blue Hat", Some("hats"), 15.0, 0, "2024-02-03"),
            ("p3", "Green Shoes", None, 60.25, 12, "2024-02-02"),
        ] {
            sqlx::query(
                "INSERT INTO products (id, name, category, price, stock, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(id)
            .bind(name)
            .bind(category)
            .bind(price)
            .bind(stock as i64)
            .bind(created_at)
            .execute(store.pool())
            .await
            .expect("insert");
        }
        store
    }

    #[test]
    fn where_clause_numbers_placeholders_in_order() {
        let mut params = Vec::new();
        let sql = where_clause(
            DatabaseEngine::Postgres,
            &[
                Filter::eq("status", "open"),
                Filter::or(vec![
                    Condition::new("name", Op::Ilike, "%a%"),
                    Condition::new("email", Op::Ilike, "%a%"),
                ]),
                Filter::is_in("id", vec![json!("x"), json!("y")]),
                Filter::eq("deleted_at", Value::Null),
            ],
            &mut params,
        );
        assert_eq!(
            sql,
            " WHERE \"status\" = $1 AND (LOWER(\"name\") LIKE LOWER($2) OR LOWER(\"email\") LIKE LOWER($3)) AND \"id\" IN ($4, $5) AND \"deleted_at\" IS NULL"
        );
        assert_eq!(params.len(), 5);
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let mut params = Vec::new();
        let sql = where_clause(DatabaseEngine::Sqlite, &[Filter::is_in("id", vec![])], &mut params);
        assert_eq!(sql, " WHERE 1 = 0");
        assert!(params.is_empty());
    }

    #[test]
    fn detects_engine_from_url() {
        assert_eq!(DatabaseEngine::detect("sqlite::memory:").unwrap(), DatabaseEngine::Sqlite);
        assert_eq!(
            DatabaseEngine::detect("postgresql://u@h/db").unwrap(),
            DatabaseEngine::Postgres
        );
        assert!(DatabaseEngine::detect("mysql://h/db").is_err());
    }

    #[tokio::test]
    async fn count_and_query_with_filters() {
        let store = store().await;
        assert_eq!(store.count("products", &[]).await.unwrap(), 3);
        assert_eq!(
            store
                .count("products", &[Filter::ilike("name", "%SHOES%")])
                .await
                .unwrap(),
            2
        );

        let select = Select::new()
            .order(Order::desc("created_at"))
            .range(Range::new(0, 2));
        let rows = store.query("products", &select).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!("p2"));
        assert_eq!(rows[1]["id"], json!("p3"));
        assert_eq!(rows[1]["category"], Value::Null);
        assert_eq!(rows[1]["stock"], json!(12));
        assert_eq!(rows[1]["price"], json!(60.25));
    }

    #[tokio::test]
    async fn query_one_and_projection() {
        let store = store().await;
        let row = store
            .query_one("products", &[Filter::eq("id", "p1")], &Projection::fields(["name", "stock"]))
            .await
            .unwrap()
            .expect("row");
        assert_eq!(Value::Object(row), json!({"name": "Red Shoes", "stock": 3}));
        assert!(store
            .query_one("products", &[Filter::eq("id", "zzz")], &Projection::All)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn update_and_insert_return_rows() {
        let store = store().await;
        let mut patch = Record::new();
        patch.insert("stock".into(), json!(7));
        let updated = store
            .update("products", &[Filter::eq("id", "p2")], &patch)
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0]["stock"], json!(7));

        let none = store
            .update("products", &[Filter::eq("id", "missing")], &patch)
            .await
            .unwrap();
        assert!(none.is_empty());

        let mut row = Record::new();
        row.insert("id".into(), json!("p4"));
        row.insert("name".into(), json!("Cap"));
        row.insert("price".into(), json!(9));
        row.insert("stock".into(), json!(1));
        row.insert("created_at".into(), json!("2024-02-04"));
        let inserted = store.insert("products", vec![row]).await.unwrap();
        assert_eq!(inserted[0]["id"], json!("p4"));
        assert_eq!(store.count("products", &[]).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn migrations_create_dashboard_tables() {
        let store = SqlStore::connect("sqlite::memory:", 1, None)
            .await
            .expect("pool");
        store.run_migrations().await.expect("migrations");
        for table in ["users", "challenges", "products", "orders", "flash_sales", "returns", "reports"] {
            assert_eq!(store.count(table, &[]).await.unwrap(), 0, "{table}");
        }
    }

    #[tokio::test]
    async fn rejects_bad_identifiers_before_querying() {
        let store = store().await;
        assert!(matches!(
            store.count("products; DROP TABLE products", &[]).await,
            Err(StoreError::InvalidIdentifier(_))
        ));
    }
}
