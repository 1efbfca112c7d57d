use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of a flash sale creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFlashSale {
    pub product_id: String,
    pub title: String,
    /// Percentage off the list price, 1..=90.
    pub discount_percent: u8,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub region: Option<String>,
}
