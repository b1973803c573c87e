use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Informational monthly budget assigned to newly issued keys, in whole
/// currency units. Reported alongside stats, never enforced.
pub const DEFAULT_MONTHLY_BUDGET: i64 = 5000;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SentinelKey {
    pub id: i64,
    pub project_id: i64,
    pub secret: String,
    pub status: KeyStatus,
    pub monthly_budget: i64,
    pub created_at: DateTime<Utc>,
}

impl SentinelKey {
    pub fn is_active(&self) -> bool {
        self.status == KeyStatus::Active
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum KeyStatus {
    Active,
    Revoked,
}
