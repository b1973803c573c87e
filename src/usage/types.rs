use std::fmt::Display;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One metered API call. Append-only: rows are never updated or repaired,
/// only inserted whole or rejected whole. The timestamp is assigned by the
/// server at acceptance, never taken from the client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: i64,
    pub project_id: i64,
    pub key_id: i64,
    pub quantity: Decimal,
    pub cost: Decimal,
    pub metadata: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Derived monthly aggregate for one project. Never stored; recomputed per
/// query by folding over the events in [period_start, period_end).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonthlyStats {
    pub project_id: i64,
    pub year: i32,
    pub month: u32,
    pub total_usage: Decimal,
    pub total_cost: Decimal,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

#[derive(Debug)]
pub enum UsageError {
    /// Malformed metric or metadata; the call had no side effect.
    Validation(String),
    /// Store unavailable or write failed; retryable by the caller.
    Storage(String),
}

impl Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UsageError::Validation(reason) => write!(f, "validation error: {}", reason),
            UsageError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl From<String> for UsageError {
    fn from(error: String) -> Self {
        UsageError::Storage(error)
    }
}
