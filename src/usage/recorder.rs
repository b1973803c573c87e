use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::info;

use crate::identity::Project;
use crate::pricing::CostPolicy;

use super::storage::EventStore;
use super::types::{UsageError, UsageEvent};

/// Accepts usage reports for an already-authenticated project, prices them
/// through the injected cost policy, and persists exactly one immutable
/// event per successful call.
pub struct Recorder {
    events: Arc<dyn EventStore>,
    policy: Arc<dyn CostPolicy>,
}

impl Recorder {
    pub fn new(events: Arc<dyn EventStore>, policy: Arc<dyn CostPolicy>) -> Self {
        Self { events, policy }
    }

    /// Validates the raw metric, computes the cost, stamps the server-side
    /// acceptance time, and awaits the insert so the event is durable before
    /// the call returns. Validation failures leave no row behind. Client
    /// retries are not deduplicated.
    pub async fn record(
        &self,
        project: &Project,
        key_id: i64,
        raw_metric: f64,
        metadata: Option<Value>,
    ) -> Result<UsageEvent, UsageError> {
        let quantity = validate_metric(raw_metric)?;
        let cost = self.policy.cost(quantity, metadata.as_ref());

        let event = UsageEvent {
            id: 0,
            project_id: project.id,
            key_id,
            quantity,
            cost,
            metadata,
            timestamp: Utc::now(),
        };

        let stored = self
            .events
            .insert(&event)
            .await
            .map_err(|e| UsageError::Storage(e.to_string()))?;

        info!(
            event_id = stored.id,
            project_id = project.id,
            cost = %stored.cost,
            "recorded usage event"
        );
        Ok(stored)
    }
}

/// The metric arrives as a JSON number; only finite, non-negative values are
/// accepted, and accepted values are carried as exact decimals from here on.
pub fn validate_metric(raw_metric: f64) -> Result<Decimal, UsageError> {
    if !raw_metric.is_finite() {
        return Err(UsageError::Validation(
            "usage metric must be a finite number".to_string(),
        ));
    }
    if raw_metric < 0.0 {
        return Err(UsageError::Validation(
            "usage metric must be non-negative".to_string(),
        ));
    }
    Decimal::try_from(raw_metric)
        .map_err(|_| UsageError::Validation("usage metric out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityStore;
    use crate::pricing::PerUnitRate;
    use crate::storage::memory::InMemoryStore;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    async fn setup_recorder(rate: &str) -> (Recorder, Arc<InMemoryStore>, Project) {
        let store = Arc::new(InMemoryStore::new());
        let owner = store.create_owner("dev@example.com", "hash").await.unwrap();
        let project = store.create_project(owner.id, "checkout").await.unwrap();
        let recorder = Recorder::new(store.clone(), Arc::new(PerUnitRate::new(dec(rate))));
        (recorder, store, project)
    }

    async fn stored_events(store: &InMemoryStore, project_id: i64) -> Vec<UsageEvent> {
        store
            .list_in_range(
                project_id,
                Utc::now() - Duration::days(1),
                Utc::now() + Duration::days(1),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_record_computes_exact_cost() {
        let (recorder, store, project) = setup_recorder("0.002").await;

        let event = recorder
            .record(&project, 1, 1000.0, None)
            .await
            .unwrap();
        assert_eq!(event.quantity, dec("1000"));
        assert_eq!(event.cost, dec("2.00"));
        assert_eq!(event.project_id, project.id);
        assert!(event.id > 0);

        let events = stored_events(&store, project.id).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].cost, dec("2.00"));
    }

    #[tokio::test]
    async fn test_repeated_identical_calls_no_drift() {
        let (recorder, _store, project) = setup_recorder("0.000007").await;

        let first = recorder
            .record(&project, 1, 123456.0, None)
            .await
            .unwrap();
        for _ in 0..5 {
            let next = recorder
                .record(&project, 1, 123456.0, None)
                .await
                .unwrap();
            assert_eq!(next.cost, first.cost);
            assert_eq!(next.quantity, first.quantity);
        }
    }

    #[tokio::test]
    async fn test_negative_metric_rejected_without_side_effect() {
        let (recorder, store, project) = setup_recorder("0.002").await;

        let result = recorder.record(&project, 1, -1.0, None).await;
        assert!(matches!(result, Err(UsageError::Validation(_))));
        assert!(stored_events(&store, project.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_non_finite_metric_rejected_without_side_effect() {
        let (recorder, store, project) = setup_recorder("0.002").await;

        for raw in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let result = recorder.record(&project, 1, raw, None).await;
            assert!(matches!(result, Err(UsageError::Validation(_))));
        }
        assert!(stored_events(&store, project.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_zero_metric_is_valid() {
        let (recorder, store, project) = setup_recorder("0.002").await;

        let event = recorder.record(&project, 1, 0.0, None).await.unwrap();
        assert_eq!(event.quantity, Decimal::ZERO);
        assert_eq!(event.cost, Decimal::ZERO);
        assert_eq!(stored_events(&store, project.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_metadata_is_persisted() {
        let (recorder, store, project) = setup_recorder("0.002").await;

        let meta = json!({"model": "atlas-mini", "endpoint": "/v1/chat"});
        recorder
            .record(&project, 1, 10.0, Some(meta.clone()))
            .await
            .unwrap();

        let events = stored_events(&store, project.id).await;
        assert_eq!(events[0].metadata.as_ref(), Some(&meta));
    }

    #[tokio::test]
    async fn test_timestamp_is_server_assigned() {
        let (recorder, _store, project) = setup_recorder("0.002").await;

        let before = Utc::now();
        let event = recorder.record(&project, 1, 1.0, None).await.unwrap();
        let after = Utc::now();
        assert!(event.timestamp >= before && event.timestamp <= after);
    }
}
