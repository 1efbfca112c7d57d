use crate::filter::{check_identifier, validate_filters, Condition, Filter, Op, Projection, Select};
use crate::{check_write, Record, Store, StoreError};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct PostgrestConfig {
    /// Root of the table API, e.g. `https://<project>.supabase.co/rest/v1`.
    pub base_url: String,
    /// Service key sent as both `apikey` and bearer token.
    pub service_key: String,
    pub request_timeout: Option<Duration>,
}

/// Client for a hosted PostgREST-style table API.
#[derive(Debug, Clone)]
pub struct PostgrestStore {
    http: Client,
    base_url: String,
}

impl PostgrestStore {
    pub fn new(config: PostgrestConfig) -> Result<Self, StoreError> {
        if config.base_url.trim().is_empty() {
            return Err(StoreError::Config("rest_url is empty".into()));
        }
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.service_key)
            .map_err(|_| StoreError::Config("service key is not a valid header value".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_key))
            .map_err(|_| StoreError::Config("service key is not a valid header value".into()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let http = Client::builder()
            .timeout(config.request_timeout.unwrap_or(DEFAULT_TIMEOUT))
            .user_agent("Challenz-Admin/0.3")
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: Method, collection: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.base_url, collection))
    }
}

impl Store for PostgrestStore {
    async fn count(&self, collection: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        check_identifier(collection)?;
        validate_filters(filters)?;
        let resp = self
            .request(Method::HEAD, collection)
            .header("Prefer", "count=exact")
            .query(&filter_params(filters))
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let header = resp
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StoreError::Decode("count response has no Content-Range".into()))?;
        parse_content_range_total(header)
    }

    async fn query(&self, collection: &str, select: &Select) -> Result<Vec<Record>, StoreError> {
        check_identifier(collection)?;
        select.validate()?;
        let resp = self
            .request(Method::GET, collection)
            .query(&select_params(select))
            .send()
            .await?;
        decode_rows(check_status(resp).await?).await
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
        let mut params = filter_params(filters);
        params.push(("select".into(), select_list(projection)));
        params.push(("limit".into(), "1".into()));
        let resp = self
            .request(Method::GET, collection)
            .query(&params)
            .send()
            .await?;
        let rows = decode_rows(check_status(resp).await?).await?;
        Ok(rows.into_iter().next())
    }

    async fn update(
        &self,
        collection: &str,
        filters: &[Filter],
        patch: &Record,
    ) -> Result<Vec<Record>, StoreError> {
        check_write(collection, filters, patch)?;
        let resp = self
            .request(Method::PATCH, collection)
            .header("Prefer", "return=representation")
            .query(&filter_params(filters))
            .json(patch)
            .send()
            .await?;
        decode_rows(check_status(resp).await?).await
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
        let resp = self
            .request(Method::POST, collection)
            .header("Prefer", "return=representation")
            .json(&records)
            .send()
            .await?;
        decode_rows(check_status(resp).await?).await
    }
}

async fn check_status(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    Err(StoreError::Backend {
        status: status.as_u16(),
        message,
    })
}

async fn decode_rows(resp: Response) -> Result<Vec<Record>, StoreError> {
    let body: Value = resp
        .json()
        .await
        .map_err(|e| StoreError::Decode(format!("invalid row payload: {e}")))?;
    let Value::Array(items) = body else {
        return Err(StoreError::Decode("expected a JSON array of rows".into()));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record),
            other => Err(StoreError::Decode(format!("row is not an object: {other}"))),
        })
        .collect()
}

/// Total from `Content-Range: 0-9/25` or `*/0`.
fn parse_content_range_total(header: &str) -> Result<u64, StoreError> {
    header
        .rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse().ok())
        .ok_or_else(|| StoreError::Decode(format!("unparseable Content-Range '{header}'")))
}

fn select_params(select: &Select) -> Vec<(String, String)> {
    let mut params = filter_params(&select.filters);
    params.push(("select".into(), select_list(&select.projection)));
    if !select.order.is_empty() {
        let order = select
            .order
            .iter()
            .map(|o| {
                let dir = if o.descending { "desc" } else { "asc" };
                format!("{}.{dir}", o.field)
            })
            .collect::<Vec<_>>()
            .join(",");
        params.push(("order".into(), order));
    }
    if let Some(range) = select.range {
        params.push(("offset".into(), range.offset.to_string()));
        params.push(("limit".into(), range.limit.to_string()));
    }
    params
}

fn select_list(projection: &Projection) -> String {
    match projection {
        Projection::All => "*".to_string(),
        Projection::Fields(fields) => fields.join(","),
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| match f {
            Filter::Where(c) => (c.field.clone(), operand(c)),
            Filter::Or(cs) => {
                let parts: Vec<String> = cs
                    .iter()
                    .map(|c| format!("{}.{}", c.field, operand(c)))
                    .collect();
                ("or".to_string(), format!("({})", parts.join(",")))
            }
        })
        .collect()
}

/// Right-hand side of a PostgREST filter, e.g. `eq.active` or `in.(a,b)`.
fn operand(cond: &Condition) -> String {
    match (cond.op, &cond.value) {
        (Op::Eq, Value::Null) => "is.null".to_string(),
        (Op::In, Value::Array(values)) => {
            let items: Vec<String> = values.iter().map(|v| quote_value(&literal(v))).collect();
            format!("in.({})", items.join(","))
        }
        (op, value) => format!("{}.{}", op.as_str(), quote_value(&literal(value))),
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Values containing list delimiters must be double-quoted.
fn quote_value(raw: &str) -> String {
    if raw.chars().any(|c| matches!(c, ',' | '(' | ')' | '"' | '\\' | ':')) {
        let escaped = raw.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        raw.to_string()
    }
}
