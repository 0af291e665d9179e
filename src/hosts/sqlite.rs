//! SQLite implementation of the host store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;

use super::{CandidateFilter, HostStore};
use crate::errors::StoreError;
use crate::models::{DistroModel, HostEvent, HostModel, HostStatus};

#[derive(Debug, Clone)]
pub struct SqliteHostStore {
    pool: SqlitePool,
}

impl SqliteHostStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `database_url` and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        // WAL lets reconciliation read while other lifecycle jobs write
        let options = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(45));
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        info!("Connected to host database: {}", database_url);

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database, mostly for tests and dry runs
    pub async fn in_memory() -> Result<Self, StoreError> {
        // Every connection to :memory: gets its own database, so keep exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("Host database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert_host(&self, host: &HostModel) -> Result<(), StoreError> {
        let distro = serde_json::to_string(&host.distro).map_err(|source| StoreError::Distro {
            host_id: host.id.clone(),
            source,
        })?;
        sqlx::query(
            "INSERT INTO host (id, provider, status, distro, termination_time) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&host.id)
        .bind(&host.provider)
        .bind(host.status.as_str())
        .bind(distro)
        .bind(host.termination_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_host(&self, host_id: &str) -> Result<Option<HostModel>, StoreError> {
        let row = sqlx::query(
            "SELECT id, provider, status, distro, termination_time FROM host WHERE id = ?",
        )
        .bind(host_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| host_from_row(&r)).transpose()
    }

    /// Every host regardless of status, in insertion order
    pub async fn list_hosts(&self) -> Result<Vec<HostModel>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, provider, status, distro, termination_time FROM host ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(host_from_row).collect()
    }

    pub async fn list_events(&self, host_id: &str) -> Result<Vec<HostEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT host_id, timestamp, previous_status, new_status, reason
            FROM host_event
            WHERE host_id = ?
            ORDER BY id
            "#,
        )
        .bind(host_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<HostEvent, StoreError> {
                let host_id: String = row.try_get("host_id")?;
                Ok(HostEvent {
                    timestamp: row.try_get("timestamp")?,
                    previous_status: parse_status(&host_id, row.try_get("previous_status")?)?,
                    new_status: parse_status(&host_id, row.try_get("new_status")?)?,
                    reason: row.try_get("reason")?,
                    host_id,
                })
            })
            .collect()
    }
}

#[async_trait]
impl HostStore for SqliteHostStore {
    async fn find_candidate_hosts(
        &self,
        filter: &CandidateFilter,
    ) -> Result<Vec<HostModel>, StoreError> {
        if filter.statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, provider, status, distro, termination_time FROM host WHERE status IN (",
        );
        let mut statuses = query.separated(", ");
        for status in &filter.statuses {
            statuses.push_bind(status.as_str());
        }
        statuses.push_unseparated(")");
        if let Some(provider) = &filter.provider {
            query.push(" AND provider = ").push_bind(provider);
        }
        query.push(" ORDER BY rowid");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(host_from_row).collect()
    }

    async fn conditional_update_status(
        &self,
        host_id: &str,
        expected: HostStatus,
        new_status: HostStatus,
    ) -> Result<bool, StoreError> {
        let termination_time: Option<DateTime<Utc>> =
            (new_status == HostStatus::Terminated).then(Utc::now);
        let result = sqlx::query(
            r#"
            UPDATE host
            SET status = ?, termination_time = COALESCE(?, termination_time)
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(new_status.as_str())
        .bind(termination_time)
        .bind(host_id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn log_event(&self, event: &HostEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO host_event (host_id, timestamp, previous_status, new_status, reason)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.host_id)
        .bind(event.timestamp)
        .bind(event.previous_status.as_str())
        .bind(event.new_status.as_str())
        .bind(&event.reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn parse_status(host_id: &str, status: String) -> Result<HostStatus, StoreError> {
    HostStatus::from_str(&status).map_err(|_| StoreError::InvalidStatus {
        host_id: host_id.to_string(),
        status,
    })
}

fn host_from_row(row: &SqliteRow) -> Result<HostModel, StoreError> {
    let id: String = row.try_get("id")?;
    let status = parse_status(&id, row.try_get("status")?)?;
    let distro_json: String = row.try_get("distro")?;
    let distro: DistroModel =
        serde_json::from_str(&distro_json).map_err(|source| StoreError::Distro {
            host_id: id.clone(),
            source,
        })?;

    Ok(HostModel {
        provider: row.try_get("provider")?,
        status,
        distro,
        termination_time: row.try_get("termination_time")?,
        id,
    })
}
