//! `CollectorService`: the control surface hosts talk to
//!
//! Owns the job registry and the localization manager. Control calls return
//! without waiting for background work.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::application::catalog_client::{CatalogClient, CatalogError, SourceProbe};
use crate::application::context::{CollectorContext, UpsertLocks};
use crate::application::image_localizer::{
    LocalizationError, LocalizationManager, LocalizationStatus, VerifyReport, remove_poster,
};
use crate::application::job_registry::{JobRegistry, RegistryError};
use crate::domain::collection::{Category, CollectionParams, PageResult};
use crate::domain::events::{EventEntry, EventKind, EventLevel, EventStats};
use crate::domain::job::JobSnapshot;
use crate::domain::services::RequestOptions;
use crate::domain::source::{NewSource, SourceDescriptor, WireFormat};
use crate::domain::video::{VideoFilter, VideoRecord};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::event_log_repository::SqliteEventLog;
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::source_repository::SqliteSourceRegistry;
use crate::infrastructure::video_repository::SqliteVideoRepository;

const MODULE: &str = "collector_service";

/// Counts removed by `clear_videos`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearReport {
    pub records: u64,
    pub images: u64,
}

pub struct CollectorService {
    ctx: CollectorContext,
    catalog: CatalogClient,
    jobs: JobRegistry,
    localizer: LocalizationManager,
}

impl CollectorService {
    /// Opens the SQLite store and HTTP client described by `config`.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        let database_url = config.database.database_url();
        let db = DatabaseConnection::with_config(&database_url, &config.database).await?;
        db.migrate().await.context("Failed to migrate database")?;
        let pool = db.pool().clone();

        let http = Arc::new(HttpClient::new(&config.http)?);
        let ctx = CollectorContext {
            videos: Arc::new(SqliteVideoRepository::new(pool.clone())),
            events: Arc::new(SqliteEventLog::new(pool.clone())),
            sources: Arc::new(SqliteSourceRegistry::new(pool)),
            transport: http.clone(),
            images: http,
            upsert_locks: Arc::new(UpsertLocks::new(config.collector.upsert_lock_stripes)),
            collector: config.collector.clone(),
            localizer: config.localizer.clone(),
        };
        info!(database = %database_url, "Collector service ready");
        Ok(Self::new(ctx))
    }

    pub fn new(ctx: CollectorContext) -> Self {
        Self {
            catalog: CatalogClient::new(ctx.transport.clone(), ctx.collector.retry_base_delay()),
            jobs: JobRegistry::new(ctx.clone()),
            localizer: LocalizationManager::new(ctx.clone()),
            ctx,
        }
    }

    pub const fn context(&self) -> &CollectorContext {
        &self.ctx
    }

    /// Params seeded from the configured defaults
    pub fn default_params(&self) -> CollectionParams {
        CollectionParams {
            workers: self.ctx.collector.default_workers,
            timeout_secs: self.ctx.collector.default_timeout_secs,
            max_retries: self.ctx.collector.default_max_retries,
            ..CollectionParams::default()
        }
    }

    fn default_request_options(&self) -> RequestOptions {
        RequestOptions::new(
            Duration::from_secs(self.ctx.collector.default_timeout_secs),
            self.ctx.collector.default_max_retries,
        )
    }

    async fn source(&self, source_id: i64) -> Result<SourceDescriptor> {
        self.ctx
            .sources
            .get(source_id)
            .await?
            .ok_or_else(|| anyhow!("source {source_id} does not exist"))
    }

    // Collection jobs

    pub async fn start_job(&self, source_id: i64, params: CollectionParams) -> Result<u64, RegistryError> {
        self.jobs.start(source_id, params).await
    }

    pub async fn stop_job(&self, job_id: u64) -> bool {
        self.jobs.stop(job_id).await
    }

    pub async fn job_status(&self, job_id: u64) -> Option<JobSnapshot> {
        self.jobs.status(job_id).await
    }

    pub async fn all_job_statuses(&self) -> Vec<JobSnapshot> {
        self.jobs.status_all().await
    }

    pub async fn cleanup_finished_jobs(&self) -> usize {
        self.jobs.cleanup().await
    }

    pub async fn wait_for_job(&self, job_id: u64) -> Option<JobSnapshot> {
        self.jobs.wait(job_id).await
    }

    // Poster localization

    pub async fn start_localization(&self) -> Result<(), LocalizationError> {
        self.localizer.start().await
    }

    pub async fn stop_localization(&self) -> Result<(), LocalizationError> {
        self.localizer.stop().await
    }

    pub async fn localization_status(&self) -> LocalizationStatus {
        self.localizer.status().await
    }

    pub async fn last_localization_result(&self) -> Option<LocalizationStatus> {
        self.localizer.last_result().await
    }

    pub async fn wait_for_localization(&self) -> Option<LocalizationStatus> {
        self.localizer.wait().await
    }

    pub async fn verify_localization(&self) -> Result<VerifyReport, LocalizationError> {
        self.localizer.verify().await
    }

    // Source inspection

    pub async fn probe_source(&self, base_url: &str, format: WireFormat) -> Result<SourceProbe, CatalogError> {
        self.catalog.probe(base_url, format).await
    }

    pub async fn list_categories(&self, source_id: i64) -> Result<Vec<Category>> {
        let source = self.source(source_id).await?;
        Ok(self
            .catalog
            .fetch_categories(&source.base_url, source.format, self.default_request_options())
            .await?)
    }

    pub async fn search_source(
        &self,
        source_id: i64,
        keyword: &str,
        page: u32,
        category_id: Option<i64>,
    ) -> Result<PageResult> {
        let source = self.source(source_id).await?;
        Ok(self
            .catalog
            .search(
                &source.base_url,
                source.format,
                keyword,
                page,
                category_id,
                self.default_request_options(),
            )
            .await?)
    }

    // Sources

    pub async fn sources(&self) -> Result<Vec<SourceDescriptor>> {
        self.ctx.sources.list_all().await
    }

    pub async fn add_source(&self, source: &NewSource) -> Result<i64> {
        self.ctx.sources.create(source).await
    }

    pub async fn set_source_active(&self, source_id: i64, active: bool) -> Result<bool> {
        self.ctx.sources.set_active(source_id, active).await
    }

    pub async fn bind_category(&self, source_id: i64, remote_type_id: i64, local_type_id: i64) -> Result<()> {
        self.ctx
            .sources
            .bind_category(source_id, remote_type_id, local_type_id)
            .await
    }

    // Catalog maintenance

    pub async fn videos(&self, filter: &VideoFilter) -> Result<Vec<VideoRecord>> {
        self.ctx.videos.list(filter).await
    }

    pub async fn count_videos(&self, filter: &VideoFilter) -> Result<u64> {
        self.ctx.videos.count(filter).await
    }

    /// Public picture URL of `video`
    pub fn picture_url(&self, video: &VideoRecord) -> String {
        video.picture_url(&self.ctx.localizer.public_prefix, &self.ctx.localizer.placeholder_url)
    }

    /// Removes a video and its local poster. Returns false when no such
    /// video exists.
    pub async fn delete_video(&self, id: i64) -> Result<bool> {
        let Some(video) = self.ctx.videos.find_by_id(id).await? else {
            return Ok(false);
        };
        let image_removed = remove_poster(&self.ctx.localizer, &video.local_pic).await;
        let deleted = self.ctx.videos.delete(id).await?;

        self.ctx
            .log_event(
                EventKind::System,
                EventLevel::Info,
                MODULE,
                &format!("Deleted video: {}", video.vod_name),
                Some(json!({"id": id, "vod_name": video.vod_name, "image_removed": image_removed})),
            )
            .await;
        Ok(deleted)
    }

    /// Removes every video, or every video of one category name, together
    /// with their local posters.
    pub async fn clear_videos(&self, category: Option<&str>) -> Result<ClearReport> {
        let filter = category.map_or_else(VideoFilter::default, VideoFilter::category_name);
        let mut report = ClearReport::default();
        for video in self.ctx.videos.list(&filter).await? {
            if remove_poster(&self.ctx.localizer, &video.local_pic).await {
                report.images += 1;
            }
            if self.ctx.videos.delete(video.id).await? {
                report.records += 1;
            }
        }

        info!(records = report.records, images = report.images, category, "Cleared videos");
        self.ctx
            .log_event(
                EventKind::System,
                EventLevel::Warning,
                MODULE,
                &format!("Cleared {} video(s)", report.records),
                Some(json!({"category": category, "records": report.records, "images": report.images})),
            )
            .await;
        Ok(report)
    }

    // Event log

    pub async fn recent_events(&self, kind: Option<EventKind>, limit: u32) -> Result<Vec<EventEntry>> {
        self.ctx.events.recent(kind, limit).await
    }

    pub async fn purge_events_older_than(&self, days: u32) -> Result<u64> {
        let removed = self.ctx.events.purge_older_than(days).await?;
        info!(days, removed, "Purged old events");
        Ok(removed)
    }

    pub async fn event_stats(&self) -> Result<EventStats> {
        self.ctx.events.stats().await
    }

    /// Stops every background pipeline and waits for them to wind down.
    pub async fn shutdown(&self) {
        self.jobs.shutdown().await;
        if self.localizer.stop().await.is_ok() {
            self.localizer.wait().await;
        }
        info!("Collector service stopped");
    }
}
