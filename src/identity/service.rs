use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use scrypt::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use scrypt::Scrypt;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::error::IdentityError;
use super::storage::IdentityStore;
use super::types::{Owner, Project};

const SESSION_LIFETIME_MINUTES: i64 = 30;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: i64,
    pub email: String,
    pub iat: u64,
    pub exp: u64,
    pub jti: String,
}

/// Owner accounts, project ownership, and the JWT session gate used by the
/// user-facing endpoints. The usage-reporting surface authenticates with
/// sentinel keys instead (`auth::Gate`).
pub struct IdentityService {
    store: Arc<dyn IdentityStore>,
    session_secret: String,
}

impl IdentityService {
    pub fn new(store: Arc<dyn IdentityStore>, session_secret: String) -> Self {
        Self {
            store,
            session_secret,
        }
    }

    pub async fn signup(&self, email: &str, password: &str) -> Result<Owner, IdentityError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(IdentityError::InvalidCredentials);
        }
        let existing = self
            .store
            .find_owner_by_email(email)
            .await
            .map_err(|e| IdentityError::Storage(e.to_string()))?;
        if existing.is_some() {
            return Err(IdentityError::EmailTaken);
        }

        let password_hash = hash_password(password)?;
        let owner = self
            .store
            .create_owner(email, &password_hash)
            .await
            .map_err(|e| IdentityError::Storage(e.to_string()))?;
        info!(owner_id = owner.id, "created owner account");
        Ok(owner)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<String, IdentityError> {
        let owner = self
            .store
            .find_owner_by_email(email)
            .await
            .map_err(|e| IdentityError::Storage(e.to_string()))?
            .ok_or(IdentityError::InvalidCredentials)?;

        if !verify_password(password, &owner.password_hash) {
            return Err(IdentityError::InvalidCredentials);
        }

        self.issue_session(&owner)
    }

    fn issue_session(&self, owner: &Owner) -> Result<String, IdentityError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: owner.id,
            email: owner.email.clone(),
            iat: now.timestamp() as u64,
            exp: (now + Duration::minutes(SESSION_LIFETIME_MINUTES)).timestamp() as u64,
            jti: Uuid::new_v4().to_string(),
        };

        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.session_secret.as_bytes()),
        )
        .map_err(|e| IdentityError::Storage(e.to_string()))
    }

    /// Resolves a `Bearer <token>` header value to the owner it names.
    /// Expired, malformed, or orphaned tokens all answer the same way.
    pub async fn authorize(&self, bearer: Option<&str>) -> Result<Owner, IdentityError> {
        let token = bearer
            .and_then(|value| value.split_whitespace().last())
            .filter(|token| !token.is_empty())
            .ok_or(IdentityError::InvalidCredentials)?;

        let data = jsonwebtoken::decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.session_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| IdentityError::InvalidCredentials)?;

        self.store
            .get_owner(data.claims.sub)
            .await
            .map_err(|e| IdentityError::Storage(e.to_string()))?
            .ok_or(IdentityError::InvalidCredentials)
    }

    /// Ownership check for everything project-scoped. A project owned by
    /// someone else answers exactly like a missing one.
    pub async fn project_for_owner(
        &self,
        owner: &Owner,
        project_id: i64,
    ) -> Result<Project, IdentityError> {
        let project = self
            .store
            .get_project(project_id)
            .await
            .map_err(|e| IdentityError::Storage(e.to_string()))?
            .ok_or(IdentityError::NotFound)?;

        if project.owner_id != owner.id {
            return Err(IdentityError::NotFound);
        }
        Ok(project)
    }

    pub async fn create_project(
        &self,
        owner: &Owner,
        name: &str,
    ) -> Result<Project, IdentityError> {
        let project = self
            .store
            .create_project(owner.id, name)
            .await
            .map_err(|e| IdentityError::Storage(e.to_string()))?;
        info!(project_id = project.id, owner_id = owner.id, "created project");
        Ok(project)
    }

    pub async fn list_projects(&self, owner: &Owner) -> Result<Vec<Project>, IdentityError> {
        self.store
            .list_projects(owner.id)
            .await
            .map_err(|e| IdentityError::Storage(e.to_string()))
    }

    pub async fn delete_project(
        &self,
        owner: &Owner,
        project_id: i64,
    ) -> Result<Project, IdentityError> {
        let project = self.project_for_owner(owner, project_id).await?;
        self.store
            .delete_project(project.id)
            .await
            .map_err(|e| IdentityError::Storage(e.to_string()))?;
        info!(project_id = project.id, "deleted project and its data");
        Ok(project)
    }

    pub async fn delete_owner(&self, owner: &Owner) -> Result<(), IdentityError> {
        self.store
            .delete_owner(owner.id)
            .await
            .map_err(|e| IdentityError::Storage(e.to_string()))?;
        info!(owner_id = owner.id, "deleted owner and all associated data");
        Ok(())
    }
}

fn hash_password(password: &str) -> Result<String, IdentityError> {
    let salt = SaltString::generate(&mut OsRng);
    Scrypt
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| IdentityError::Storage(e.to_string()))
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .and_then(|parsed| Scrypt.verify_password(password.as_bytes(), &parsed))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;

    async fn setup_service() -> (IdentityService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let service = IdentityService::new(store.clone(), "test-secret".to_string());
        (service, store)
    }

    #[tokio::test]
    async fn test_signup_login_authorize() {
        let (service, _store) = setup_service().await;

        let owner = service.signup("dev@example.com", "hunter22").await.unwrap();
        assert_eq!(owner.email, "dev@example.com");
        // the raw password never lands in the store
        assert_ne!(owner.password_hash, "hunter22");

        let token = service.login("dev@example.com", "hunter22").await.unwrap();
        let bearer = format!("Bearer {}", token);
        let resolved = service.authorize(Some(&bearer)).await.unwrap();
        assert_eq!(resolved.id, owner.id);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let (service, _store) = setup_service().await;

        service.signup("dev@example.com", "hunter22").await.unwrap();
        assert!(matches!(
            service.signup("dev@example.com", "other").await,
            Err(IdentityError::EmailTaken)
        ));
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let (service, _store) = setup_service().await;

        service.signup("dev@example.com", "hunter22").await.unwrap();
        assert!(matches!(
            service.login("dev@example.com", "wrong").await,
            Err(IdentityError::InvalidCredentials)
        ));
        assert!(matches!(
            service.login("nobody@example.com", "hunter22").await,
            Err(IdentityError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_expired_session_rejected() {
        let (service, _store) = setup_service().await;
        let owner = service.signup("dev@example.com", "hunter22").await.unwrap();

        let now = Utc::now();
        let claims = SessionClaims {
            sub: owner.id,
            email: owner.email.clone(),
            iat: (now - Duration::hours(2)).timestamp() as u64,
            exp: (now - Duration::hours(1)).timestamp() as u64,
            jti: Uuid::new_v4().to_string(),
        };
        let stale = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret("test-secret".as_bytes()),
        )
        .unwrap();

        let bearer = format!("Bearer {}", stale);
        assert!(matches!(
            service.authorize(Some(&bearer)).await,
            Err(IdentityError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_foreign_project_answers_like_missing() {
        let (service, _store) = setup_service().await;

        let alice = service.signup("alice@example.com", "pw-alice").await.unwrap();
        let bob = service.signup("bob@example.com", "pw-bob").await.unwrap();
        let project = service.create_project(&alice, "checkout").await.unwrap();

        assert!(matches!(
            service.project_for_owner(&bob, project.id).await,
            Err(IdentityError::NotFound)
        ));
        assert!(matches!(
            service.project_for_owner(&bob, 999_999).await,
            Err(IdentityError::NotFound)
        ));
        assert!(service.project_for_owner(&alice, project.id).await.is_ok());
    }
}
