use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use super::storage::EventStore;
use super::types::{MonthlyStats, UsageError};

/// On-demand monthly statistics over the event log. Nothing is cached or
/// stored; totals are an exact decimal fold over the events in the month.
pub struct Aggregator {
    events: Arc<dyn EventStore>,
}

impl Aggregator {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self { events }
    }

    /// Totals for `project_id` in the given calendar month.
    ///
    /// Caller contract: `project_id` must already be authorization-checked
    /// against the requesting owner; this method does not re-derive
    /// ownership. An empty month yields zero totals, not an error.
    pub async fn monthly_stats(
        &self,
        project_id: i64,
        year: i32,
        month: u32,
    ) -> Result<MonthlyStats, UsageError> {
        let (period_start, period_end) = month_bounds(year, month).ok_or_else(|| {
            UsageError::Validation(format!("invalid month: {}-{}", year, month))
        })?;

        let events = self
            .events
            .list_in_range(project_id, period_start, period_end)
            .await
            .map_err(|e| UsageError::Storage(e.to_string()))?;

        let mut total_usage = Decimal::ZERO;
        let mut total_cost = Decimal::ZERO;
        for event in &events {
            total_usage += event.quantity;
            total_cost += event.cost;
        }

        Ok(MonthlyStats {
            project_id,
            year,
            month,
            total_usage,
            total_cost,
            period_start,
            period_end,
        })
    }
}

/// Half-open month window: [first instant of the month, first instant of the
/// next month). None for out-of-range year/month combinations.
pub fn month_bounds(year: i32, month: u32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?
        .and_hms_opt(0, 0, 0)?
        .and_utc();
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)?
        .and_hms_opt(0, 0, 0)?
        .and_utc();
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityStore;
    use crate::storage::memory::InMemoryStore;
    use crate::usage::types::UsageEvent;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn event_at(project_id: i64, ts: DateTime<Utc>, quantity: &str, cost: &str) -> UsageEvent {
        UsageEvent {
            id: 0,
            project_id,
            key_id: 1,
            quantity: dec(quantity),
            cost: dec(cost),
            metadata: None,
            timestamp: ts,
        }
    }

    async fn seed_project(store: &InMemoryStore) -> i64 {
        let owner = store.create_owner("dev@example.com", "hash").await.unwrap();
        let project = store.create_project(owner.id, "checkout").await.unwrap();
        project.id
    }

    #[test]
    fn test_month_bounds() {
        let (start, end) = month_bounds(2024, 3).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());

        // December rolls into the next year
        let (start, end) = month_bounds(2024, 12).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());

        assert!(month_bounds(2024, 0).is_none());
        assert!(month_bounds(2024, 13).is_none());
    }

    #[tokio::test]
    async fn test_empty_month_yields_zeros() {
        let store = Arc::new(InMemoryStore::new());
        let project_id = seed_project(&store).await;
        let aggregator = Aggregator::new(store.clone());

        let stats = aggregator.monthly_stats(project_id, 2024, 3).await.unwrap();
        assert_eq!(stats.total_usage, Decimal::ZERO);
        assert_eq!(stats.total_cost, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_invalid_month_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let aggregator = Aggregator::new(store);

        assert!(matches!(
            aggregator.monthly_stats(1, 2024, 13).await,
            Err(UsageError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_month_boundary_attribution() {
        let store = Arc::new(InMemoryStore::new());
        let project_id = seed_project(&store).await;

        // Exactly the first instant of March: belongs to March.
        let march_first = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        store
            .insert(&event_at(project_id, march_first, "10", "0.02"))
            .await
            .unwrap();

        // Last millisecond of leap-year February: belongs to February.
        let feb_last = Utc
            .with_ymd_and_hms(2024, 2, 29, 23, 59, 59)
            .unwrap()
            .checked_add_signed(chrono::Duration::milliseconds(999))
            .unwrap();
        store
            .insert(&event_at(project_id, feb_last, "5", "0.01"))
            .await
            .unwrap();

        let aggregator = Aggregator::new(store.clone());

        let march = aggregator.monthly_stats(project_id, 2024, 3).await.unwrap();
        assert_eq!(march.total_usage, dec("10"));
        assert_eq!(march.total_cost, dec("0.02"));

        let february = aggregator.monthly_stats(project_id, 2024, 2).await.unwrap();
        assert_eq!(february.total_usage, dec("5"));
        assert_eq!(february.total_cost, dec("0.01"));
    }

    #[tokio::test]
    async fn test_stats_match_event_fold_regardless_of_insert_order() {
        let ts = |day, hour| Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap();
        let batches: [&[(u32, u32, &str, &str)]; 2] = [
            &[(1, 0, "50", "0.10"), (15, 12, "75", "0.15"), (31, 23, "25", "0.05")],
            &[(31, 23, "25", "0.05"), (1, 0, "50", "0.10"), (15, 12, "75", "0.15")],
        ];

        for batch in batches {
            let store = Arc::new(InMemoryStore::new());
            let project_id = seed_project(&store).await;
            for &(day, hour, quantity, cost) in batch {
                store
                    .insert(&event_at(project_id, ts(day, hour), quantity, cost))
                    .await
                    .unwrap();
            }

            let aggregator = Aggregator::new(store.clone());
            let stats = aggregator.monthly_stats(project_id, 2024, 3).await.unwrap();

            let (start, end) = month_bounds(2024, 3).unwrap();
            let events = store.list_in_range(project_id, start, end).await.unwrap();
            let usage_fold: Decimal = events.iter().map(|e| e.quantity).sum();
            let cost_fold: Decimal = events.iter().map(|e| e.cost).sum();

            assert_eq!(stats.total_usage, usage_fold);
            assert_eq!(stats.total_cost, cost_fold);
            assert_eq!(stats.total_usage, dec("150"));
            assert_eq!(stats.total_cost, dec("0.30"));
        }
    }

    #[tokio::test]
    async fn test_other_projects_are_excluded() {
        let store = Arc::new(InMemoryStore::new());
        let project_a = seed_project(&store).await;
        let owner = store.create_owner("other@example.com", "hash").await.unwrap();
        let project_b = store.create_project(owner.id, "search").await.unwrap();

        let ts = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();
        store.insert(&event_at(project_a, ts, "100", "0.20")).await.unwrap();
        store.insert(&event_at(project_b.id, ts, "999", "1.99")).await.unwrap();

        let aggregator = Aggregator::new(store.clone());
        let stats = aggregator.monthly_stats(project_a, 2024, 3).await.unwrap();
        assert_eq!(stats.total_usage, dec("100"));
        assert_eq!(stats.total_cost, dec("0.20"));
    }
}
