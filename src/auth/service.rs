use std::sync::Arc;

use anyhow::Result;
use rand::{distributions::Alphanumeric, Rng};
use tracing::{info, warn};

use crate::identity::{IdentityStore, Owner, Project};

use super::error::AuthError;
use super::storage::KeyStore;
use super::types::{KeyStatus, SentinelKey, DEFAULT_MONTHLY_BUDGET};

const SECRET_PREFIX: &str = "sentinel_pk_";
const SECRET_LEN: usize = 32;

/// A usage-report caller that presented a valid sentinel key: the key itself
/// plus the project and owner it resolves to.
pub struct Principal {
    pub key: SentinelKey,
    pub project: Project,
    pub owner: Owner,
}

/// Request-time authentication gate for the usage-reporting surface. Turns a
/// raw key header into a verified identity, or rejects the call. Stateless
/// per call; user-facing endpoints use the JWT session gate instead.
pub struct Gate {
    keys: Arc<dyn KeyStore>,
    identity: Arc<dyn IdentityStore>,
}

impl Gate {
    pub fn new(keys: Arc<dyn KeyStore>, identity: Arc<dyn IdentityStore>) -> Self {
        Self { keys, identity }
    }

    fn generate_secret() -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SECRET_LEN)
            .map(char::from)
            .collect();
        format!("{}{}", SECRET_PREFIX, token)
    }

    pub async fn issue_key(&self, project_id: i64) -> Result<SentinelKey> {
        let secret = Self::generate_secret();
        let key = self
            .keys
            .create(project_id, &secret, DEFAULT_MONTHLY_BUDGET)
            .await?;
        info!(key_id = key.id, project_id, "issued sentinel key");
        Ok(key)
    }

    pub async fn revoke_key(&self, key_id: i64) -> Result<()> {
        self.keys.set_status(key_id, KeyStatus::Revoked).await?;
        info!(key_id, "revoked sentinel key");
        Ok(())
    }

    /// First active key of a project, if any.
    pub async fn active_key(&self, project_id: i64) -> Result<Option<SentinelKey>> {
        let keys = self.keys.list_by_project(project_id).await?;
        Ok(keys.into_iter().find(SentinelKey::is_active))
    }

    /// Resolves a raw key header into the verified (key, project, owner)
    /// identity. An absent or empty header is rejected before any store
    /// access. Unknown and revoked keys are distinct here (and in the logs)
    /// but must be surfaced identically to the caller.
    pub async fn authenticate(&self, raw_key: Option<&str>) -> Result<Principal, AuthError> {
        let raw_key = raw_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(AuthError::MissingKey)?;

        let key = self
            .keys
            .get_by_secret(raw_key)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?
            .ok_or(AuthError::InvalidKey)?;

        if !key.is_active() {
            warn!(key_id = key.id, "revoked sentinel key presented");
            return Err(AuthError::Revoked);
        }

        // A project or owner deleted since the key was issued reads as an
        // invalid key, never a crash.
        let project = self
            .identity
            .get_project(key.project_id)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?
            .ok_or(AuthError::InvalidKey)?;

        let owner = self
            .identity
            .get_owner(project.owner_id)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?
            .ok_or(AuthError::InvalidKey)?;

        Ok(Principal { key, project, owner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;

    async fn setup_gate() -> (Gate, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let gate = Gate::new(store.clone(), store.clone());
        (gate, store)
    }

    async fn seed_project(store: &InMemoryStore) -> Project {
        let owner = store.create_owner("dev@example.com", "hash").await.unwrap();
        store.create_project(owner.id, "checkout").await.unwrap()
    }

    #[tokio::test]
    async fn test_issue_then_authenticate() {
        let (gate, store) = setup_gate().await;
        let project = seed_project(&store).await;

        let key = gate.issue_key(project.id).await.unwrap();
        assert!(key.secret.starts_with("sentinel_pk_"));
        assert!(key.secret.len() > 32);
        assert_eq!(key.status, KeyStatus::Active);
        assert_eq!(key.monthly_budget, DEFAULT_MONTHLY_BUDGET);

        let principal = gate.authenticate(Some(&key.secret)).await.unwrap();
        assert_eq!(principal.key.id, key.id);
        assert_eq!(principal.project.id, project.id);
        assert_eq!(principal.owner.id, project.owner_id);
    }

    #[tokio::test]
    async fn test_issued_secrets_are_unique() {
        let (gate, store) = setup_gate().await;
        let project = seed_project(&store).await;

        let a = gate.issue_key(project.id).await.unwrap();
        let b = gate.issue_key(project.id).await.unwrap();
        assert_ne!(a.secret, b.secret);
    }

    #[tokio::test]
    async fn test_missing_key_rejected_without_lookup() {
        let (gate, _store) = setup_gate().await;

        assert!(matches!(
            gate.authenticate(None).await,
            Err(AuthError::MissingKey)
        ));
        assert!(matches!(
            gate.authenticate(Some("")).await,
            Err(AuthError::MissingKey)
        ));
        assert!(matches!(
            gate.authenticate(Some("   ")).await,
            Err(AuthError::MissingKey)
        ));
    }

    #[tokio::test]
    async fn test_unknown_key_rejected() {
        let (gate, _store) = setup_gate().await;

        assert!(matches!(
            gate.authenticate(Some("sentinel_pk_doesnotexist")).await,
            Err(AuthError::InvalidKey)
        ));
    }

    #[tokio::test]
    async fn test_revoked_key_never_authenticates_again() {
        let (gate, store) = setup_gate().await;
        let project = seed_project(&store).await;

        let key = gate.issue_key(project.id).await.unwrap();
        assert!(gate.authenticate(Some(&key.secret)).await.is_ok());

        gate.revoke_key(key.id).await.unwrap();
        for _ in 0..3 {
            assert!(matches!(
                gate.authenticate(Some(&key.secret)).await,
                Err(AuthError::Revoked)
            ));
        }
    }

    #[tokio::test]
    async fn test_deleted_project_reads_as_invalid_key() {
        let (gate, store) = setup_gate().await;
        let project = seed_project(&store).await;
        let key = gate.issue_key(project.id).await.unwrap();

        store.delete_project(project.id).await.unwrap();

        match gate.authenticate(Some(&key.secret)).await {
            // the cascade removed the key too; any rejection is fine, but it
            // must never succeed or panic
            Err(AuthError::InvalidKey) | Err(AuthError::Revoked) => {}
            other => panic!("expected rejection, got {:?}", other.map(|p| p.key.id)),
        }
    }

    #[tokio::test]
    async fn test_active_key_skips_revoked() {
        let (gate, store) = setup_gate().await;
        let project = seed_project(&store).await;

        let first = gate.issue_key(project.id).await.unwrap();
        gate.revoke_key(first.id).await.unwrap();
        let second = gate.issue_key(project.id).await.unwrap();

        let active = gate.active_key(project.id).await.unwrap().unwrap();
        assert_eq!(active.id, second.id);
    }
}
