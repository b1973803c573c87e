use std::str::FromStr;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::auth::storage::KeyStore;
use crate::auth::types::{KeyStatus, SentinelKey};
use crate::identity::storage::IdentityStore;
use crate::identity::types::{Owner, Project};
use crate::usage::storage::EventStore;
use crate::usage::types::UsageEvent;

/// Sqlite-backed store for owners, projects, sentinel keys, and usage
/// events. One store over one pool so cascade deletes run in a single
/// transaction. Timestamps are RFC 3339 UTC text; decimal columns are text
/// and re-parsed, keeping quantities and costs exact.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("Initializing SQLite store at {}", database_url);
        let pool = SqlitePool::connect(database_url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS owners (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sentinel_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL,
                secret TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                monthly_budget INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS usage_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL,
                key_id INTEGER NOT NULL,
                quantity TEXT NOT NULL,
                cost TEXT NOT NULL,
                metadata TEXT,
                timestamp TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_usage_events_project_time
             ON usage_events (project_id, timestamp)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    fn row_to_owner(&self, row: sqlx::sqlite::SqliteRow) -> Result<Owner> {
        Ok(Owner {
            id: row.get("id"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            created_at: DateTime::parse_from_rfc3339(row.get("created_at"))?.with_timezone(&Utc),
        })
    }

    fn row_to_project(&self, row: sqlx::sqlite::SqliteRow) -> Result<Project> {
        Ok(Project {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            name: row.get("name"),
            created_at: DateTime::parse_from_rfc3339(row.get("created_at"))?.with_timezone(&Utc),
        })
    }

    fn row_to_key(&self, row: sqlx::sqlite::SqliteRow) -> Result<SentinelKey> {
        Ok(SentinelKey {
            id: row.get("id"),
            project_id: row.get("project_id"),
            secret: row.get("secret"),
            status: status_from_str(row.get("status"))?,
            monthly_budget: row.get("monthly_budget"),
            created_at: DateTime::parse_from_rfc3339(row.get("created_at"))?.with_timezone(&Utc),
        })
    }

    fn row_to_event(&self, row: sqlx::sqlite::SqliteRow) -> Result<UsageEvent> {
        let quantity: String = row.get("quantity");
        let cost: String = row.get("cost");
        let metadata: Option<String> = row.get("metadata");

        Ok(UsageEvent {
            id: row.get("id"),
            project_id: row.get("project_id"),
            key_id: row.get("key_id"),
            quantity: Decimal::from_str(&quantity)?,
            cost: Decimal::from_str(&cost)?,
            metadata: metadata.map(|m| serde_json::from_str(&m)).transpose()?,
            timestamp: DateTime::parse_from_rfc3339(row.get("timestamp"))?.with_timezone(&Utc),
        })
    }
}

fn status_as_str(status: KeyStatus) -> &'static str {
    match status {
        KeyStatus::Active => "active",
        KeyStatus::Revoked => "revoked",
    }
}

fn status_from_str(status: &str) -> Result<KeyStatus> {
    match status {
        "active" => Ok(KeyStatus::Active),
        "revoked" => Ok(KeyStatus::Revoked),
        other => bail!("unknown key status: {}", other),
    }
}

#[async_trait]
impl KeyStore for SqliteStore {
    async fn create(
        &self,
        project_id: i64,
        secret: &str,
        monthly_budget: i64,
    ) -> Result<SentinelKey> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO sentinel_keys (project_id, secret, status, monthly_budget, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(project_id)
        .bind(secret)
        .bind(status_as_str(KeyStatus::Active))
        .bind(monthly_budget)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(SentinelKey {
            id: result.last_insert_rowid(),
            project_id,
            secret: secret.to_string(),
            status: KeyStatus::Active,
            monthly_budget,
            created_at,
        })
    }

    async fn get(&self, key_id: i64) -> Result<Option<SentinelKey>> {
        let row = sqlx::query("SELECT * FROM sentinel_keys WHERE id = ?")
            .bind(key_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(self.row_to_key(row)?),
            None => None,
        })
    }

    async fn get_by_secret(&self, secret: &str) -> Result<Option<SentinelKey>> {
        let row = sqlx::query("SELECT * FROM sentinel_keys WHERE secret = ?")
            .bind(secret)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(self.row_to_key(row)?),
            None => None,
        })
    }

    async fn list_by_project(&self, project_id: i64) -> Result<Vec<SentinelKey>> {
        let rows = sqlx::query(
            "SELECT * FROM sentinel_keys WHERE project_id = ? ORDER BY created_at ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(self.row_to_key(row)?);
        }
        Ok(keys)
    }

    async fn set_status(&self, key_id: i64, status: KeyStatus) -> Result<()> {
        let result = sqlx::query("UPDATE sentinel_keys SET status = ? WHERE id = ?")
            .bind(status_as_str(status))
            .bind(key_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            bail!("sentinel key not found");
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn insert(&self, event: &UsageEvent) -> Result<UsageEvent> {
        let metadata = event
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO usage_events (project_id, key_id, quantity, cost, metadata, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.project_id)
        .bind(event.key_id)
        .bind(event.quantity.to_string())
        .bind(event.cost.to_string())
        .bind(metadata)
        .bind(event.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let mut stored = event.clone();
        stored.id = result.last_insert_rowid();
        Ok(stored)
    }

    async fn list_in_range(
        &self,
        project_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>> {
        // RFC 3339 UTC strings compare lexicographically in time order, so
        // the half-open window maps straight onto text comparison.
        let rows = sqlx::query(
            r#"
            SELECT * FROM usage_events
            WHERE project_id = ? AND timestamp >= ? AND timestamp < ?
            ORDER BY timestamp ASC
            "#,
        )
        .bind(project_id)
        .bind(from.to_rfc3339())
        .bind(to.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::new();
        for row in rows {
            events.push(self.row_to_event(row)?);
        }
        Ok(events)
    }
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn create_owner(&self, email: &str, password_hash: &str) -> Result<Owner> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO owners (email, password_hash, created_at) VALUES (?, ?, ?)",
        )
        .bind(email)
        .bind(password_hash)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Owner {
            id: result.last_insert_rowid(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at,
        })
    }

    async fn find_owner_by_email(&self, email: &str) -> Result<Option<Owner>> {
        let row = sqlx::query("SELECT * FROM owners WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(self.row_to_owner(row)?),
            None => None,
        })
    }

    async fn get_owner(&self, owner_id: i64) -> Result<Option<Owner>> {
        let row = sqlx::query("SELECT * FROM owners WHERE id = ?")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(self.row_to_owner(row)?),
            None => None,
        })
    }

    async fn delete_owner(&self, owner_id: i64) -> Result<()> {
        // Dependents go first, inside one transaction: events, keys,
        // projects, then the owner row itself.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM usage_events
            WHERE project_id IN (SELECT id FROM projects WHERE owner_id = ?)
            "#,
        )
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM sentinel_keys
            WHERE project_id IN (SELECT id FROM projects WHERE owner_id = ?)
            "#,
        )
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM projects WHERE owner_id = ?")
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM owners WHERE id = ?")
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn create_project(&self, owner_id: i64, name: &str) -> Result<Project> {
        let created_at = Utc::now();
        let result =
            sqlx::query("INSERT INTO projects (owner_id, name, created_at) VALUES (?, ?, ?)")
                .bind(owner_id)
                .bind(name)
                .bind(created_at.to_rfc3339())
                .execute(&self.pool)
                .await?;

        Ok(Project {
            id: result.last_insert_rowid(),
            owner_id,
            name: name.to_string(),
            created_at,
        })
    }

    async fn get_project(&self, project_id: i64) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(self.row_to_project(row)?),
            None => None,
        })
    }

    async fn list_projects(&self, owner_id: i64) -> Result<Vec<Project>> {
        let rows = sqlx::query("SELECT * FROM projects WHERE owner_id = ? ORDER BY created_at ASC")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        let mut projects = Vec::new();
        for row in rows {
            projects.push(self.row_to_project(row)?);
        }
        Ok(projects)
    }

    async fn delete_project(&self, project_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM usage_events WHERE project_id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM sentinel_keys WHERE project_id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
