use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::storage::KeyStore;
use crate::auth::types::{KeyStatus, SentinelKey};
use crate::identity::storage::IdentityStore;
use crate::identity::types::{Owner, Project};
use crate::usage::storage::EventStore;
use crate::usage::types::UsageEvent;

#[derive(Default)]
struct Inner {
    owners: HashMap<i64, Owner>,
    projects: HashMap<i64, Project>,
    keys: HashMap<i64, SentinelKey>,
    events: Vec<UsageEvent>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// One in-memory store behind all three store traits, for deterministic
/// tests. A single struct so cascade deletes can span owners, projects,
/// keys, and events the same way the sqlite transaction does.
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|e| anyhow!(e.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|e| anyhow!(e.to_string()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyStore for InMemoryStore {
    async fn create(
        &self,
        project_id: i64,
        secret: &str,
        monthly_budget: i64,
    ) -> Result<SentinelKey> {
        let mut inner = self.write()?;
        if inner.keys.values().any(|key| key.secret == secret) {
            bail!("sentinel key secret already exists");
        }
        let key = SentinelKey {
            id: inner.next_id(),
            project_id,
            secret: secret.to_string(),
            status: KeyStatus::Active,
            monthly_budget,
            created_at: Utc::now(),
        };
        inner.keys.insert(key.id, key.clone());
        Ok(key)
    }

    async fn get(&self, key_id: i64) -> Result<Option<SentinelKey>> {
        Ok(self.read()?.keys.get(&key_id).cloned())
    }

    async fn get_by_secret(&self, secret: &str) -> Result<Option<SentinelKey>> {
        Ok(self
            .read()?
            .keys
            .values()
            .find(|key| key.secret == secret)
            .cloned())
    }

    async fn list_by_project(&self, project_id: i64) -> Result<Vec<SentinelKey>> {
        let mut keys: Vec<SentinelKey> = self
            .read()?
            .keys
            .values()
            .filter(|key| key.project_id == project_id)
            .cloned()
            .collect();
        keys.sort_by_key(|key| key.id);
        Ok(keys)
    }

    async fn set_status(&self, key_id: i64, status: KeyStatus) -> Result<()> {
        let mut inner = self.write()?;
        match inner.keys.get_mut(&key_id) {
            Some(key) => {
                key.status = status;
                Ok(())
            }
            None => bail!("sentinel key not found"),
        }
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn insert(&self, event: &UsageEvent) -> Result<UsageEvent> {
        let mut inner = self.write()?;
        let mut stored = event.clone();
        stored.id = inner.next_id();
        inner.events.push(stored.clone());
        Ok(stored)
    }

    async fn list_in_range(
        &self,
        project_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>> {
        let mut events: Vec<UsageEvent> = self
            .read()?
            .events
            .iter()
            .filter(|event| {
                event.project_id == project_id && event.timestamp >= from && event.timestamp < to
            })
            .cloned()
            .collect();
        events.sort_by_key(|event| event.timestamp);
        Ok(events)
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn create_owner(&self, email: &str, password_hash: &str) -> Result<Owner> {
        let mut inner = self.write()?;
        if inner.owners.values().any(|owner| owner.email == email) {
            bail!("owner email already exists");
        }
        let owner = Owner {
            id: inner.next_id(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        inner.owners.insert(owner.id, owner.clone());
        Ok(owner)
    }

    async fn find_owner_by_email(&self, email: &str) -> Result<Option<Owner>> {
        Ok(self
            .read()?
            .owners
            .values()
            .find(|owner| owner.email == email)
            .cloned())
    }

    async fn get_owner(&self, owner_id: i64) -> Result<Option<Owner>> {
        Ok(self.read()?.owners.get(&owner_id).cloned())
    }

    async fn delete_owner(&self, owner_id: i64) -> Result<()> {
        let mut inner = self.write()?;
        let project_ids: Vec<i64> = inner
            .projects
            .values()
            .filter(|project| project.owner_id == owner_id)
            .map(|project| project.id)
            .collect();

        inner
            .events
            .retain(|event| !project_ids.contains(&event.project_id));
        inner
            .keys
            .retain(|_, key| !project_ids.contains(&key.project_id));
        inner
            .projects
            .retain(|_, project| project.owner_id != owner_id);
        inner.owners.remove(&owner_id);
        Ok(())
    }

    async fn create_project(&self, owner_id: i64, name: &str) -> Result<Project> {
        let mut inner = self.write()?;
        let project = Project {
            id: inner.next_id(),
            owner_id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        inner.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, project_id: i64) -> Result<Option<Project>> {
        Ok(self.read()?.projects.get(&project_id).cloned())
    }

    async fn list_projects(&self, owner_id: i64) -> Result<Vec<Project>> {
        let mut projects: Vec<Project> = self
            .read()?
            .projects
            .values()
            .filter(|project| project.owner_id == owner_id)
            .cloned()
            .collect();
        projects.sort_by_key(|project| project.id);
        Ok(projects)
    }

    async fn delete_project(&self, project_id: i64) -> Result<()> {
        let mut inner = self.write()?;
        inner.events.retain(|event| event.project_id != project_id);
        inner.keys.retain(|_, key| key.project_id != project_id);
        inner.projects.remove(&project_id);
        Ok(())
    }
}
