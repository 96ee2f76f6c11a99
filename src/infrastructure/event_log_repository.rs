//! SQLite implementation of the event log (`system_logs` table)

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::BTreeMap;

use crate::domain::events::{EventEntry, EventKind, EventLevel, EventStats};
use crate::domain::repositories::EventLog;

#[derive(Clone)]
pub struct SqliteEventLog {
    pool: SqlitePool,
}

impl SqliteEventLog {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn grouped_counts(&self, column: &str) -> Result<BTreeMap<String, u64>> {
        let sql = format!("SELECT {column} AS name, COUNT(*) AS total FROM system_logs GROUP BY {column}");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<(String, u64)> {
                let name: String = row.try_get("name")?;
                let total: i64 = row.try_get("total")?;
                Ok((name, u64::try_from(total).unwrap_or_default()))
            })
            .collect()
    }
}

fn start_of_today() -> DateTime<Utc> {
    let now = Utc::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map_or(now, |midnight| midnight.and_utc())
}

#[async_trait]
impl EventLog for SqliteEventLog {
    async fn append(
        &self,
        kind: EventKind,
        level: EventLevel,
        module: &str,
        message: &str,
        details: Option<serde_json::Value>,
    ) -> Result<()> {
        let details = details.map(|value| value.to_string());
        sqlx::query(
            r#"
            INSERT INTO system_logs (log_type, level, module, message, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(kind.as_str())
        .bind(level.as_str())
        .bind(module)
        .bind(message)
        .bind(details)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to append event")?;
        Ok(())
    }

    async fn recent(&self, kind: Option<EventKind>, limit: u32) -> Result<Vec<EventEntry>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, log_type, level, module, message, details, created_at FROM system_logs",
        );
        if let Some(kind) = kind {
            builder.push(" WHERE log_type = ").push_bind(kind.as_str());
        }
        builder.push(" ORDER BY id DESC LIMIT ").push_bind(i64::from(limit));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<EventEntry> {
                let kind: String = row.try_get("log_type")?;
                let level: String = row.try_get("level")?;
                let details: Option<String> = row.try_get("details")?;
                Ok(EventEntry {
                    id: row.try_get("id")?,
                    kind: kind.parse().map_err(anyhow::Error::msg)?,
                    level: level.parse().map_err(anyhow::Error::msg)?,
                    module: row.try_get("module")?,
                    message: row.try_get("message")?,
                    details: details.and_then(|raw| serde_json::from_str(&raw).ok()),
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn purge_older_than(&self, days: u32) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let result = sqlx::query("DELETE FROM system_logs WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<EventStats> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM system_logs")
            .fetch_one(&self.pool)
            .await?;
        let today: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM system_logs WHERE created_at >= ?")
            .bind(start_of_today())
            .fetch_one(&self.pool)
            .await?;

        Ok(EventStats {
            total: u64::try_from(total).unwrap_or_default(),
            today: u64::try_from(today).unwrap_or_default(),
            by_kind: self.grouped_counts("log_type").await?,
            by_level: self.grouped_counts("level").await?,
        })
    }
}
