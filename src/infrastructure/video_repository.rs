//! SQLite implementation of the video store
//!
//! Column lists for insert/update are generated from `VideoFields::COLUMNS`
//! once at construction. `update` never writes the localization columns;
//! those belong to `set_localization` alone.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::domain::repositories::VideoRepository;
use crate::domain::video::{NewVideo, VideoFields, VideoFilter, VideoRecord};

#[derive(Clone)]
pub struct SqliteVideoRepository {
    pool: SqlitePool,
    insert_sql: String,
    update_sql: String,
}

impl SqliteVideoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        let field_columns = VideoFields::COLUMNS;

        let mut insert_columns = vec!["vod_id", "vod_name", "type_id", "type_name"];
        insert_columns.extend_from_slice(field_columns);
        insert_columns.extend_from_slice(&["is_localized", "local_pic", "created_at", "updated_at"]);
        let placeholders = vec!["?"; insert_columns.len()].join(", ");
        let insert_sql = format!(
            "INSERT INTO videos ({}) VALUES ({placeholders})",
            insert_columns.join(", ")
        );

        let mut assignments = vec!["vod_id = ?", "vod_name = ?", "type_id = ?", "type_name = ?"]
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        assignments.extend(field_columns.iter().map(|column| format!("{column} = ?")));
        assignments.push("updated_at = ?".to_string());
        let update_sql = format!("UPDATE videos SET {} WHERE id = ?", assignments.join(", "));

        Self {
            pool,
            insert_sql,
            update_sql,
        }
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &VideoFilter) {
        builder.push(" WHERE 1 = 1");
        if let Some(type_id) = filter.type_id {
            builder.push(" AND type_id = ").push_bind(type_id);
        }
        if let Some(type_name) = &filter.type_name {
            builder.push(" AND type_name = ").push_bind(type_name.clone());
        }
        if let Some(localized) = filter.localized {
            builder.push(" AND is_localized = ").push_bind(localized);
        }
    }
}

#[async_trait]
impl VideoRepository for SqliteVideoRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<VideoRecord>> {
        let row = sqlx::query("SELECT * FROM videos WHERE vod_name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(VideoRecord::from_row).transpose()?)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<VideoRecord>> {
        let row = sqlx::query("SELECT * FROM videos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(VideoRecord::from_row).transpose()?)
    }

    async fn create(&self, video: &NewVideo) -> Result<i64> {
        let now = Utc::now();
        let query = sqlx::query(&self.insert_sql)
            .bind(video.vod_id)
            .bind(&video.vod_name)
            .bind(video.type_id)
            .bind(&video.type_name);
        let result = video
            .fields
            .bind_to(query)
            .bind(false)
            .bind("")
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to insert video {}", video.vod_name))?;
        Ok(result.last_insert_rowid())
    }

    async fn update(&self, video: &VideoRecord) -> Result<()> {
        let query = sqlx::query(&self.update_sql)
            .bind(video.vod_id)
            .bind(&video.vod_name)
            .bind(video.type_id)
            .bind(&video.type_name);
        video
            .fields
            .bind_to(query)
            .bind(Utc::now())
            .bind(video.id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to update video {}", video.vod_name))?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM videos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, filter: &VideoFilter) -> Result<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM videos");
        Self::push_filter(&mut builder, filter);
        let count = builder.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn list(&self, filter: &VideoFilter) -> Result<Vec<VideoRecord>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM videos");
        Self::push_filter(&mut builder, filter);
        builder.push(" ORDER BY id");
        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(VideoRecord::from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn ids_with_remote_poster(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM videos WHERE TRIM(vod_pic) != '' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn list_localized(&self) -> Result<Vec<VideoRecord>> {
        self.list(&VideoFilter {
            localized: Some(true),
            ..VideoFilter::default()
        })
        .await
    }

    async fn set_localization(&self, id: i64, localized: bool, local_pic: &str) -> Result<()> {
        sqlx::query("UPDATE videos SET is_localized = ?, local_pic = ?, updated_at = ? WHERE id = ?")
            .bind(localized)
            .bind(local_pic)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to update localization of video {id}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use tempfile::TempDir;

    async fn repository() -> Result<(TempDir, SqliteVideoRepository)> {
        let dir = tempfile::tempdir()?;
        let url = format!("sqlite:{}", dir.path().join("videos.db").display());
        let db = DatabaseConnection::new(&url).await?;
        db.migrate().await?;
        Ok((dir, SqliteVideoRepository::new(db.pool().clone())))
    }

    fn new_video(name: &str, type_name: &str) -> NewVideo {
        NewVideo {
            vod_id: 77,
            vod_name: name.to_string(),
            type_id: 6,
            type_name: type_name.to_string(),
            fields: VideoFields {
                vod_pic: format!("https://img.example/{name}.jpg"),
                vod_hits: 12,
                ..VideoFields::default()
            },
        }
    }

    #[tokio::test]
    async fn create_then_find_round_trips_fields() -> Result<()> {
        let (_dir, repo) = repository().await?;
        let id = repo.create(&new_video("Alpha", "Drama")).await?;

        let stored = repo.find_by_name("Alpha").await?.expect("stored video");
        assert_eq!(stored.id, id);
        assert_eq!(stored.vod_id, 77);
        assert_eq!(stored.fields.vod_hits, 12);
        assert_eq!(stored.fields.vod_status, 1);
        assert!(!stored.is_localized);
        assert_eq!(repo.find_by_id(id).await?.map(|v| v.vod_name), Some("Alpha".into()));
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected_by_the_store() -> Result<()> {
        let (_dir, repo) = repository().await?;
        repo.create(&new_video("Alpha", "Drama")).await?;
        assert!(repo.create(&new_video("Alpha", "Drama")).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn update_and_filters() -> Result<()> {
        let (_dir, repo) = repository().await?;
        let a = repo.create(&new_video("Alpha", "Drama")).await?;
        repo.create(&new_video("Beta", "Comedy")).await?;

        let mut alpha = repo.find_by_id(a).await?.expect("alpha");
        alpha.fields.vod_actor = "Someone".into();
        repo.update(&alpha).await?;
        repo.set_localization(a, true, "poster_1_deadbeef.jpg").await?;

        let alpha = repo.find_by_id(a).await?.expect("alpha");
        assert_eq!(alpha.fields.vod_actor, "Someone");
        assert_eq!(alpha.local_pic, "poster_1_deadbeef.jpg");

        assert_eq!(repo.count(&VideoFilter::default()).await?, 2);
        assert_eq!(repo.count(&VideoFilter::category_name("Drama")).await?, 1);
        assert_eq!(repo.list_localized().await?.len(), 1);
        assert_eq!(repo.ids_with_remote_poster().await?.len(), 2);

        assert!(repo.delete(a).await?);
        assert!(!repo.delete(a).await?);
        assert_eq!(repo.count(&VideoFilter::default()).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn update_keeps_localization_written_after_the_read() -> Result<()> {
        let (_dir, repo) = repository().await?;
        let id = repo.create(&new_video("Alpha", "Drama")).await?;

        let mut stale = repo.find_by_id(id).await?.expect("alpha");
        repo.set_localization(id, true, "poster_1_deadbeef.jpg").await?;
        stale.fields.vod_remarks = "HD".into();
        repo.update(&stale).await?;

        let stored = repo.find_by_id(id).await?.expect("alpha");
        assert_eq!(stored.fields.vod_remarks, "HD");
        assert!(stored.is_localized);
        assert_eq!(stored.local_pic, "poster_1_deadbeef.jpg");
        Ok(())
    }
}
