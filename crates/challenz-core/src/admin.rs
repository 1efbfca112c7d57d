use crate::error::CoreError;
use crate::fetcher::{run_stage, FetchOptions, Stage};
use challenz_models::{
    collections, ChallengeStatus, FlashSaleStatus, NewFlashSale, ReportStatus, ReturnStatus,
    StockUpdate, StockUpdateOutcome, UnknownVariant, UserStatus,
};
use challenz_store::{Condition, Filter, Op, Projection, Record, Store};
use challenz_util::format_timestamp;
use challenz_util::validation::{validate_in_range, validate_title};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;

pub const MAX_BULK_STOCK_UPDATES: usize = 500;
pub const MAX_FLASH_SALE_DISCOUNT: i64 = 90;
const MAX_TITLE_LEN: usize = 200;

/// Collections whose `status` column can be changed from the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTarget {
    User,
    Return,
    Report,
}

impl StatusTarget {
    pub fn collection(self) -> &'static str {
        match self {
            StatusTarget::User => collections::USERS,
            StatusTarget::Return => collections::RETURNS,
            StatusTarget::Report => collections::REPORTS,
        }
    }

    /// Normalized status text, or an error naming the accepted values.
    pub fn parse_status(self, raw: &str) -> Result<&'static str, UnknownVariant> {
        Ok(match self {
            StatusTarget::User => raw.parse::<UserStatus>()?.as_str(),
            StatusTarget::Return => raw.parse::<ReturnStatus>()?.as_str(),
            StatusTarget::Report => raw.parse::<ReportStatus>()?.as_str(),
        })
    }
}

/// Set `status` on one row and return the row as written.
pub async fn update_status<S: Store>(
    store: &S,
    target: StatusTarget,
    id: &str,
    raw_status: &str,
    options: &FetchOptions,
) -> Result<Record, CoreError> {
    let status = target.parse_status(raw_status)?;
    let collection = target.collection();

    let mut patch = Record::new();
    patch.insert("status".into(), Value::from(status));
    patch.insert("updated_at".into(), Value::from(now()));

    let rows = run_stage(
        Stage::Update(collection.to_string()),
        collection,
        options.query_timeout,
        store.update(collection, &[Filter::eq("id", id)], &patch),
    )
    .await?;
    let row = rows.into_iter().next().ok_or(CoreError::NotFound)?;
    tracing::info!(collection, id, status, "status updated");
    Ok(row)
}

/// Apply stock levels in request order, stopping at the first failure.
///
/// Updates are not transactional: rows listed in `applied` stay written when
/// a later one fails. Negative values are rejected before anything is
/// written.
pub async fn bulk_update_stock<S: Store>(
    store: &S,
    updates: &[StockUpdate],
    options: &FetchOptions,
) -> Result<StockUpdateOutcome, CoreError> {
    if updates.is_empty() {
        return Err(CoreError::BadRequest("no stock updates supplied".into()));
    }
    if updates.len() > MAX_BULK_STOCK_UPDATES {
        return Err(CoreError::BadRequest(format!(
            "at most {MAX_BULK_STOCK_UPDATES} stock updates per request"
        )));
    }
    if let Some(bad) = updates.iter().find(|u| u.stock < 0) {
        return Err(CoreError::BadRequest(format!(
            "stock for product '{}' must not be negative",
            bad.id
        )));
    }
    if let Some(bad) = updates.iter().find(|u| u.id.trim().is_empty()) {
        return Err(CoreError::BadRequest(format!(
            "stock update with stock {} has an empty product id",
            bad.stock
        )));
    }

    let mut outcome = StockUpdateOutcome::default();
    for update in updates {
        let mut patch = Record::new();
        patch.insert("stock".into(), Value::from(update.stock));
        patch.insert("updated_at".into(), Value::from(now()));

        let result = run_stage(
            Stage::Update(collections::PRODUCTS.to_string()),
            collections::PRODUCTS,
            options.query_timeout,
            store.update(collections::PRODUCTS, &[Filter::eq("id", update.id.as_str())], &patch),
        )
        .await;
        match result {
            Ok(rows) if rows.is_empty() => {
                outcome.failed_id = Some(update.id.clone());
                outcome.error = Some(format!("product '{}' not found", update.id));
                break;
            }
            Ok(_) => outcome.applied.push(update.id.clone()),
            Err(err) => {
                tracing::error!(product_id = %update.id, error = %err, "stock update failed");
                outcome.failed_id = Some(update.id.clone());
                outcome.error = Some("stock update failed".into());
                break;
            }
        }
    }

    if outcome.is_complete() {
        tracing::info!(count = outcome.applied.len(), "stock levels updated");
    } else {
        tracing::warn!(
            applied = outcome.applied.len(),
            failed_id = outcome.failed_id.as_deref().unwrap_or_default(),
            "bulk stock update stopped early"
        );
    }
    Ok(outcome)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: u64,
    pub active_challenges: u64,
    pub open_reports: u64,
    pub pending_returns: u64,
    pub live_flash_sales: u64,
}

pub async fn dashboard_stats<S: Store>(
    store: &S,
    options: &FetchOptions,
) -> Result<DashboardStats, CoreError> {
    let timeout = options.query_timeout;
    let active = [Filter::eq("status", ChallengeStatus::Active.as_str())];
    let open = [Filter::eq("status", ReportStatus::Open.as_str())];
    let pending = [Filter::eq("status", ReturnStatus::Pending.as_str())];
    let live = flash_sale_status_filters(FlashSaleStatus::Live, Utc::now());

    let (total_users, active_challenges, open_reports, pending_returns, live_flash_sales) = tokio::try_join!(
        run_stage(Stage::Count, collections::USERS, timeout, store.count(collections::USERS, &[])),
        run_stage(Stage::Count, collections::CHALLENGES, timeout, store.count(collections::CHALLENGES, &active)),
        run_stage(Stage::Count, collections::REPORTS, timeout, store.count(collections::REPORTS, &open)),
        run_stage(Stage::Count, collections::RETURNS, timeout, store.count(collections::RETURNS, &pending)),
        run_stage(Stage::Count, collections::FLASH_SALES, timeout, store.count(collections::FLASH_SALES, &live)),
    )?;

    Ok(DashboardStats {
        total_users,
        active_challenges,
        open_reports,
        pending_returns,
        live_flash_sales,
    })
}

/// The status a sale has at `now`. Stored `ended` and `cancelled` are
/// final; otherwise the sale window decides. Rows without a readable
/// window keep their stored status.
pub fn flash_sale_status_at(row: &Record, now: DateTime<Utc>) -> Option<FlashSaleStatus> {
    let stored: FlashSaleStatus = row.get("status")?.as_str()?.parse().ok()?;
    if matches!(stored, FlashSaleStatus::Ended | FlashSaleStatus::Cancelled) {
        return Some(stored);
    }
    let starts_at = row_timestamp(row, "starts_at");
    let ends_at = row_timestamp(row, "ends_at");
    Some(match (starts_at, ends_at) {
        (_, Some(end)) if now > end => FlashSaleStatus::Ended,
        (Some(start), _) if now < start => FlashSaleStatus::Scheduled,
        (Some(_), Some(_)) => FlashSaleStatus::Live,
        _ => stored,
    })
}

/// Rewrite `status` on each row to the value [`flash_sale_status_at`] derives.
pub fn refresh_flash_sale_statuses(rows: &mut [Record], now: DateTime<Utc>) {
    for row in rows {
        if let Some(status) = flash_sale_status_at(row, now) {
            row.insert("status".into(), Value::from(status.as_str()));
        }
    }
}

/// Store filters selecting the sales whose status at `now` is `status`.
pub fn flash_sale_status_filters(status: FlashSaleStatus, now: DateTime<Utc>) -> Vec<Filter> {
    let open = || {
        Filter::is_in(
            "status",
            vec![
                Value::from(FlashSaleStatus::Scheduled.as_str()),
                Value::from(FlashSaleStatus::Live.as_str()),
            ],
        )
    };
    let at = format_timestamp(&now);
    match status {
        FlashSaleStatus::Live => vec![
            open(),
            Filter::lte("starts_at", at.clone()),
            Filter::gte("ends_at", at),
        ],
        FlashSaleStatus::Scheduled => vec![
            open(),
            Filter::gte("starts_at", format_timestamp(&(now + Duration::milliseconds(1)))),
        ],
        FlashSaleStatus::Ended => vec![
            Filter::is_in(
                "status",
                vec![
                    Value::from(FlashSaleStatus::Scheduled.as_str()),
                    Value::from(FlashSaleStatus::Live.as_str()),
                    Value::from(FlashSaleStatus::Ended.as_str()),
                ],
            ),
            Filter::or(vec![
                Condition::new("status", Op::Eq, FlashSaleStatus::Ended.as_str()),
                Condition::new(
                    "ends_at",
                    Op::Lte,
                    format_timestamp(&(now - Duration::milliseconds(1))),
                ),
            ]),
        ],
        FlashSaleStatus::Cancelled => {
            vec![Filter::eq("status", FlashSaleStatus::Cancelled.as_str())]
        }
    }
}

fn row_timestamp(row: &Record, field: &str) -> Option<DateTime<Utc>> {
    let raw = row.get(field)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Validate and insert a flash sale. The product must exist and the sale
/// must not already be over.
pub async fn create_flash_sale<S: Store>(
    store: &S,
    sale: NewFlashSale,
    options: &FetchOptions,
) -> Result<Record, CoreError> {
    validate_title("title", &sale.title, MAX_TITLE_LEN)?;
    validate_in_range(
        "discount_percent",
        i64::from(sale.discount_percent),
        1,
        MAX_FLASH_SALE_DISCOUNT,
    )?;
    if sale.starts_at >= sale.ends_at {
        return Err(CoreError::BadRequest(
            "starts_at must be before ends_at".into(),
        ));
    }
    let now = Utc::now();
    if sale.ends_at <= now {
        return Err(CoreError::BadRequest("ends_at is in the past".into()));
    }

    let product = run_stage(
        Stage::Lookup,
        collections::PRODUCTS,
        options.query_timeout,
        store.query_one(
            collections::PRODUCTS,
            &[Filter::eq("id", sale.product_id.as_str())],
            &Projection::fields(["id"]),
        ),
    )
    .await?;
    if product.is_none() {
        return Err(CoreError::BadRequest(format!(
            "product '{}' does not exist",
            sale.product_id
        )));
    }

    let status = if sale.starts_at <= now {
        FlashSaleStatus::Live
    } else {
        FlashSaleStatus::Scheduled
    };
    let id = uuid::Uuid::new_v4().to_string();

    let mut record = Record::new();
    record.insert("id".into(), Value::from(id.clone()));
    record.insert("product_id".into(), Value::from(sale.product_id));
    record.insert("title".into(), Value::from(sale.title.trim()));
    record.insert("discount_percent".into(), Value::from(sale.discount_percent));
    record.insert("status".into(), Value::from(status.as_str()));
    record.insert(
        "region".into(),
        sale.region
            .map(|r| Value::from(r.trim()))
            .unwrap_or(Value::Null),
    );
    record.insert("starts_at".into(), Value::from(format_timestamp(&sale.starts_at)));
    record.insert("ends_at".into(), Value::from(format_timestamp(&sale.ends_at)));
    record.insert("created_at".into(), Value::from(format_timestamp(&now)));

    let inserted = run_stage(
        Stage::Insert(collections::FLASH_SALES.to_string()),
        collections::FLASH_SALES,
        options.query_timeout,
        store.insert(collections::FLASH_SALES, vec![record]),
    )
    .await?;
    let row = inserted
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::Internal("insert returned no rows".into()))?;
    tracing::info!(flash_sale_id = %id, status = status.as_str(), "flash sale created");
    Ok(row)
}

fn now() -> String {
    format_timestamp(&Utc::now())
}
