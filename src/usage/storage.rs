use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::UsageEvent;

/// Append-only store for usage events.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Persists one event and returns it with its assigned id. The write is
    /// durable when this returns Ok.
    async fn insert(&self, event: &UsageEvent) -> Result<UsageEvent>;

    /// Events for a project with `from <= timestamp < to`, ascending.
    async fn list_in_range(
        &self,
        project_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>>;
}
