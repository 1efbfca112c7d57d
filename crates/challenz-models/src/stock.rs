use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdate {
    pub id: String,
    pub stock: i64,
}

/// Result of a bulk stock update. Updates run in request order and stop at
/// the first failure; anything already in `applied` stays written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StockUpdateOutcome {
    pub applied: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StockUpdateOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed_id.is_none()
    }
}
