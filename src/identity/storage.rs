use anyhow::Result;
use async_trait::async_trait;

use super::types::{Owner, Project};

/// Store for owners and projects. Deletions cascade explicitly: the
/// implementation removes dependent usage events, sentinel keys, and projects
/// in that order inside a single transaction.
#[async_trait]
pub trait IdentityStore: Send + Sync + 'static {
    async fn create_owner(&self, email: &str, password_hash: &str) -> Result<Owner>;
    async fn find_owner_by_email(&self, email: &str) -> Result<Option<Owner>>;
    async fn get_owner(&self, owner_id: i64) -> Result<Option<Owner>>;
    async fn delete_owner(&self, owner_id: i64) -> Result<()>;

    async fn create_project(&self, owner_id: i64, name: &str) -> Result<Project>;
    async fn get_project(&self, project_id: i64) -> Result<Option<Project>>;
    async fn list_projects(&self, owner_id: i64) -> Result<Vec<Project>>;
    async fn delete_project(&self, project_id: i64) -> Result<()>;
}
