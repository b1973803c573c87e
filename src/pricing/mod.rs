use std::collections::HashMap;

use rust_decimal::Decimal;
use serde_json::Value;

/// Pure pricing function injected into the usage recorder. Implementations
/// must be deterministic: the same quantity and metadata always yield the
/// same cost, with no rounding applied here (presentation rounds, the core
/// does not).
pub trait CostPolicy: Send + Sync + 'static {
    fn cost(&self, quantity: Decimal, metadata: Option<&Value>) -> Decimal;
}

/// Flat rate per metered unit.
pub struct PerUnitRate {
    rate: Decimal,
}

impl PerUnitRate {
    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }
}

impl CostPolicy for PerUnitRate {
    fn cost(&self, quantity: Decimal, _metadata: Option<&Value>) -> Decimal {
        quantity * self.rate
    }
}

/// Per-model rates selected by the `model` metadata field, with a fallback
/// rate for unknown or absent models.
pub struct ModelRateTable {
    rates: HashMap<String, Decimal>,
    fallback: Decimal,
}

impl ModelRateTable {
    pub fn new(rates: HashMap<String, Decimal>, fallback: Decimal) -> Self {
        Self { rates, fallback }
    }

    fn rate_for(&self, metadata: Option<&Value>) -> Decimal {
        metadata
            .and_then(|meta| meta.get("model"))
            .and_then(|model| model.as_str())
            .and_then(|model| self.rates.get(model).copied())
            .unwrap_or(self.fallback)
    }
}

impl CostPolicy for ModelRateTable {
    fn cost(&self, quantity: Decimal, metadata: Option<&Value>) -> Decimal {
        quantity * self.rate_for(metadata)
    }
}
