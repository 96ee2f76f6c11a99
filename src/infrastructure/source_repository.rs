//! SQLite implementation of the source registry and category bindings

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::domain::repositories::{CategoryBindings, SourceRegistry};
use crate::domain::source::{NewSource, SourceDescriptor, WireFormat};

#[derive(Clone)]
pub struct SqliteSourceRegistry {
    pool: SqlitePool,
}

impl SqliteSourceRegistry {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn source_from_row(row: &SqliteRow) -> Result<SourceDescriptor> {
    let api_type: String = row.try_get("api_type")?;
    Ok(SourceDescriptor {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        base_url: row.try_get("url")?,
        format: api_type.parse().unwrap_or(WireFormat::Json),
        is_active: row.try_get("is_active")?,
        sort_order: row.try_get("sort_order")?,
        note: row.try_get("note")?,
    })
}

const SELECT_SOURCES: &str =
    "SELECT id, name, url, api_type, is_active, sort_order, note FROM collect_sources";

#[async_trait]
impl SourceRegistry for SqliteSourceRegistry {
    async fn list_active(&self) -> Result<Vec<SourceDescriptor>> {
        let rows = sqlx::query(&format!("{SELECT_SOURCES} WHERE is_active = 1 ORDER BY sort_order, id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(source_from_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<SourceDescriptor>> {
        let rows = sqlx::query(&format!("{SELECT_SOURCES} ORDER BY sort_order, id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(source_from_row).collect()
    }

    async fn get(&self, id: i64) -> Result<Option<SourceDescriptor>> {
        let row = sqlx::query(&format!("{SELECT_SOURCES} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(source_from_row).transpose()
    }

    async fn create(&self, source: &NewSource) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO collect_sources (name, url, api_type, is_active, sort_order, note)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&source.name)
        .bind(&source.base_url)
        .bind(source.format.as_str())
        .bind(source.is_active)
        .bind(source.sort_order)
        .bind(&source.note)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create source {}", source.name))?;
        Ok(result.last_insert_rowid())
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE collect_sources SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn category_bindings(&self, source_id: i64) -> Result<CategoryBindings> {
        let rows = sqlx::query(
            "SELECT remote_type_id, local_type_id FROM category_bindings WHERE source_id = ?",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> Result<(i64, i64)> {
                Ok((row.try_get("remote_type_id")?, row.try_get("local_type_id")?))
            })
            .collect()
    }

    async fn bind_category(&self, source_id: i64, remote_type_id: i64, local_type_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO category_bindings (source_id, remote_type_id, local_type_id)
            VALUES (?, ?, ?)
            ON CONFLICT (source_id, remote_type_id) DO UPDATE SET local_type_id = excluded.local_type_id
            "#,
        )
        .bind(source_id)
        .bind(remote_type_id)
        .bind(local_type_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to bind category {remote_type_id} of source {source_id}"))?;
        Ok(())
    }
}
