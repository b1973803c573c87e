use anyhow::Result;
use async_trait::async_trait;

use super::types::{KeyStatus, SentinelKey};

/// Durable store for sentinel keys. Secrets are unique store-wide; lookup is
/// an exact match against that unique index.
#[async_trait]
pub trait KeyStore: Send + Sync + 'static {
    async fn create(&self, project_id: i64, secret: &str, monthly_budget: i64)
        -> Result<SentinelKey>;
    async fn get(&self, key_id: i64) -> Result<Option<SentinelKey>>;
    async fn get_by_secret(&self, secret: &str) -> Result<Option<SentinelKey>>;
    async fn list_by_project(&self, project_id: i64) -> Result<Vec<SentinelKey>>;
    /// Single authoritative flag flip; all subsequent reads observe it.
    async fn set_status(&self, key_id: i64, status: KeyStatus) -> Result<()>;
}
