//! Revenue is aggregated from real orders. Engagement and content
//! performance have no backing data yet; they return generated sample series
//! marked `"sample": true` so the dashboard can render its charts.

use crate::error::CoreError;
use crate::fetcher::{run_stage, FetchOptions, Stage};
use challenz_models::collections;
use challenz_store::{Filter, Order, Projection, Record, Select, Store};
use challenz_util::format_timestamp;
use challenz_util::validation::validate_in_range;
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_ENGAGEMENT_DAYS: i64 = 7;
pub const MAX_ENGAGEMENT_DAYS: i64 = 90;

const CONTENT_CATEGORIES: &[&str] = &["fitness", "dance", "cooking", "comedy", "art", "music"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRevenue {
    pub date: String,
    pub revenue: f64,
    pub orders: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueReport {
    pub total_revenue: f64,
    pub order_count: u64,
    pub average_order_value: f64,
    pub daily: Vec<DailyRevenue>,
}

pub async fn revenue<S: Store>(
    store: &S,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    options: &FetchOptions,
) -> Result<RevenueReport, CoreError> {
    let mut select = Select::new()
        .order(Order::asc("created_at"))
        .projection(Projection::fields(["total", "created_at"]));
    if let Some(start) = start {
        select = select.filter(Filter::gte("created_at", format_timestamp(&start)));
    }
    if let Some(end) = end {
        select = select.filter(Filter::lte("created_at", format_timestamp(&end)));
    }

    let orders = run_stage(
        Stage::Data,
        collections::ORDERS,
        options.query_timeout,
        store.query(collections::ORDERS, &select),
    )
    .await?;
    Ok(aggregate_revenue(&orders))
}

fn aggregate_revenue(orders: &[Record]) -> RevenueReport {
    let mut by_day: BTreeMap<String, (f64, u64)> = BTreeMap::new();
    let mut total = 0.0;
    for order in orders {
        let amount = order.get("total").and_then(as_amount).unwrap_or(0.0);
        total += amount;
        let day = order
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(|ts| ts.get(..10))
            .unwrap_or("unknown")
            .to_string();
        let entry = by_day.entry(day).or_default();
        entry.0 += amount;
        entry.1 += 1;
    }

    let count = orders.len() as u64;
    RevenueReport {
        total_revenue: round2(total),
        order_count: count,
        average_order_value: if count == 0 {
            0.0
        } else {
            round2(total / count as f64)
        },
        daily: by_day
            .into_iter()
            .map(|(date, (revenue, orders))| DailyRevenue {
                date,
                revenue: round2(revenue),
                orders,
            })
            .collect(),
    }
}

/// Numeric columns may arrive as JSON numbers or, from some backends, as
/// decimal strings.
fn as_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementDay {
    pub date: String,
    pub active_users: u32,
    pub new_challenges: u32,
    pub submissions: u32,
    pub likes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagementReport {
    pub sample: bool,
    pub days: Vec<EngagementDay>,
}

/// Sample engagement series covering the last `days` days, oldest first.
pub async fn engagement(days: Option<i64>, delay: Duration) -> Result<EngagementReport, CoreError> {
    let days = days.unwrap_or(DEFAULT_ENGAGEMENT_DAYS);
    validate_in_range("days", days, 1, MAX_ENGAGEMENT_DAYS)?;
    tokio::time::sleep(delay).await;
    Ok(sample_engagement(&mut rand::thread_rng(), Utc::now(), days))
}

fn sample_engagement(rng: &mut impl Rng, today: DateTime<Utc>, days: i64) -> EngagementReport {
    let days = (0..days)
        .rev()
        .map(|back| {
            let active_users = rng.gen_range(800..2_500);
            EngagementDay {
                date: (today - TimeDelta::days(back)).format("%Y-%m-%d").to_string(),
                active_users,
                new_challenges: rng.gen_range(5..60),
                submissions: rng.gen_range(active_users / 10..active_users / 3),
                likes: rng.gen_range(active_users..active_users * 6),
            }
        })
        .collect();
    EngagementReport { sample: true, days }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPerformance {
    pub category: String,
    pub views: u32,
    pub completions: u32,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentPerformanceReport {
    pub sample: bool,
    pub categories: Vec<CategoryPerformance>,
}

/// Sample per-category performance, best completion rate first.
pub async fn content_performance(delay: Duration) -> ContentPerformanceReport {
    tokio::time::sleep(delay).await;
    sample_content_performance(&mut rand::thread_rng())
}

fn sample_content_performance(rng: &mut impl Rng) -> ContentPerformanceReport {
    let mut categories: Vec<CategoryPerformance> = CONTENT_CATEGORIES
        .iter()
        .map(|category| {
            let views = rng.gen_range(1_000..50_000);
            let completions = rng.gen_range(views / 20..views / 2);
            CategoryPerformance {
                category: (*category).to_string(),
                views,
                completions,
                completion_rate: round2(f64::from(completions) / f64::from(views) * 100.0),
            }
        })
        .collect();
    categories.sort_by(|a, b| b.completion_rate.total_cmp(&a.completion_rate));
    ContentPerformanceReport {
        sample: true,
        categories,
    }
}
