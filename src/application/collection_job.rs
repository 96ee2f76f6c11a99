//! One collection run against one source
//!
//! The start page is fetched inline to learn the page count; remaining pages
//! go to a bounded worker pool. Counters, the duplicate streak and the recent
//! error list live behind one mutex shared by all workers.
//!
//! Cancellation is cooperative. Manual stop is checked between records, the
//! duplicate threshold between pages, and neither aborts a request already in
//! flight.

use chrono::Utc;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::catalog_client::{CatalogClient, CatalogQuery};
use crate::application::context::CollectorContext;
use crate::application::upserter::{UpsertOrigin, UpsertOutcome, upsert_record};
use crate::domain::collection::{CollectionParams, PageResult};
use crate::domain::events::{EventKind, EventLevel};
use crate::domain::job::{JobSnapshot, JobStatus};
use crate::domain::repositories::CategoryBindings;
use crate::domain::services::RequestOptions;
use crate::domain::source::{SourceDescriptor, WireFormat};

const MODULE: &str = "collection_job";
/// Errors included in the "job finished" event
const SUMMARY_ERRORS: usize = 10;

#[derive(Debug)]
struct JobProgress {
    status: JobStatus,
    success: u64,
    skip: u64,
    failed: u64,
    duplicate_streak: u32,
    current_page: u32,
    total_pages: u32,
    errors: VecDeque<String>,
    started_at: Option<chrono::DateTime<Utc>>,
    finished_at: Option<chrono::DateTime<Utc>>,
}

impl JobProgress {
    fn new() -> Self {
        Self {
            status: JobStatus::Idle,
            success: 0,
            skip: 0,
            failed: 0,
            duplicate_streak: 0,
            current_page: 0,
            total_pages: 0,
            errors: VecDeque::new(),
            started_at: None,
            finished_at: None,
        }
    }

    fn push_error(&mut self, message: String, limit: usize) {
        self.errors.push_back(message);
        while self.errors.len() > limit.max(1) {
            self.errors.pop_front();
        }
    }

    /// Applies one outcome and returns the streak afterwards.
    fn record(&mut self, outcome: &UpsertOutcome, error_limit: usize) -> u32 {
        match outcome {
            UpsertOutcome::Created => {
                self.success += 1;
                self.duplicate_streak = 0;
            }
            UpsertOutcome::Updated | UpsertOutcome::Skipped => {
                self.skip += 1;
                self.duplicate_streak = self.duplicate_streak.saturating_add(1);
            }
            UpsertOutcome::Failed(reason) => {
                self.failed += 1;
                self.push_error(reason.clone(), error_limit);
            }
        }
        self.duplicate_streak
    }
}

/// Per-page counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PageReport {
    success: u64,
    skip: u64,
    failed: u64,
}

pub struct CollectionJob {
    id: u64,
    ctx: CollectorContext,
    source: SourceDescriptor,
    params: CollectionParams,
    bindings: CategoryBindings,
    cancel: CancellationToken,
    done: CancellationToken,
    manual_stop: AtomicBool,
    threshold_stop: AtomicBool,
    progress: Mutex<JobProgress>,
}

impl CollectionJob {
    pub fn new(
        id: u64,
        ctx: CollectorContext,
        source: SourceDescriptor,
        params: CollectionParams,
        bindings: CategoryBindings,
    ) -> Self {
        Self {
            id,
            ctx,
            source,
            params: params.sanitized(),
            bindings,
            cancel: CancellationToken::new(),
            done: CancellationToken::new(),
            manual_stop: AtomicBool::new(false),
            threshold_stop: AtomicBool::new(false),
            progress: Mutex::new(JobProgress::new()),
        }
    }

    pub const fn id(&self) -> u64 {
        self.id
    }

    fn format(&self) -> WireFormat {
        self.params.format.unwrap_or(self.source.format)
    }

    fn request_options(&self) -> RequestOptions {
        RequestOptions::new(Duration::from_secs(self.params.timeout_secs), self.params.max_retries)
    }

    fn threshold(&self) -> u32 {
        self.ctx.collector.duplicate_threshold
    }

    pub async fn snapshot(&self) -> JobSnapshot {
        let progress = self.progress.lock().await;
        JobSnapshot {
            id: self.id,
            source_id: self.source.id,
            source_name: self.source.name.clone(),
            status: progress.status,
            success: progress.success,
            skip: progress.skip,
            failed: progress.failed,
            duplicate_streak: progress.duplicate_streak,
            current_page: progress.current_page,
            total_pages: progress.total_pages,
            errors: progress.errors.iter().cloned().collect(),
            params: self.params.clone(),
            started_at: progress.started_at,
            finished_at: progress.finished_at,
        }
    }

    pub async fn status(&self) -> JobStatus {
        self.progress.lock().await.status
    }

    /// Requests a manual stop. Returns false when the job already ended.
    pub async fn stop(&self) -> bool {
        if self.status().await.is_terminal() {
            return false;
        }
        info!(job_id = self.id, "Manual stop requested");
        self.manual_stop.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        true
    }

    /// Resolves once the job reached a terminal state.
    pub async fn wait(&self) {
        self.done.cancelled().await;
    }

    /// Drives the job to a terminal state.
    pub async fn run(self: Arc<Self>) {
        {
            let mut progress = self.progress.lock().await;
            progress.status = JobStatus::Running;
            progress.started_at = Some(Utc::now());
            progress.current_page = self.params.start_page;
        }
        info!(job_id = self.id, source = %self.source.name, "Collection job started");
        self.ctx
            .log_event(
                EventKind::Collect,
                EventLevel::Info,
                MODULE,
                &format!("Collection started: {}", self.source.name),
                Some(json!({
                    "job_id": self.id,
                    "source_id": self.source.id,
                    "url": self.source.base_url,
                    "format": self.format(),
                    "params": self.params,
                })),
            )
            .await;

        if !self.cancel.is_cancelled() {
            self.collect_all().await;
        }
        self.finish().await;
    }

    async fn collect_all(self: &Arc<Self>) {
        let client = CatalogClient::new(self.ctx.transport.clone(), self.ctx.collector.retry_base_delay());
        let start = self.params.start_page;

        let first = match self.fetch(&client, start).await {
            Ok(page) => page,
            Err(message) => {
                error!(job_id = self.id, "First page failed: {message}");
                self.progress
                    .lock()
                    .await
                    .push_error(message, self.ctx.collector.max_recent_errors);
                return;
            }
        };

        let pagecount = first.pagecount;
        let end = self.params.end_page.map_or(pagecount, |end| end.min(pagecount));
        self.progress.lock().await.total_pages = end;
        info!(job_id = self.id, pagecount, end, "Discovered page count");

        self.process_page(start, first).await;

        if self.cancel.is_cancelled() || pagecount <= 1 || start >= end {
            return;
        }
        self.dispatch(client, (start + 1)..=end).await;
    }

    /// Hands pages to the worker pool until they run out or the job is
    /// cancelled, then waits for the dispatched ones.
    async fn dispatch(self: &Arc<Self>, client: CatalogClient, pages: std::ops::RangeInclusive<u32>) {
        let semaphore = Arc::new(Semaphore::new(self.params.workers));
        let mut tasks = JoinSet::new();

        for page in pages {
            let permit = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!(job_id = self.id, "Worker pool closed: {e}");
                        break;
                    }
                },
            };
            if self.cancel.is_cancelled() {
                break;
            }

            let job = Arc::clone(self);
            let client = client.clone();
            tasks.spawn(async move {
                let _permit = permit;
                job.collect_page(&client, page).await;
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(job_id = self.id, "Page worker panicked: {e}");
            }
        }
    }

    async fn fetch(&self, client: &CatalogClient, page: u32) -> Result<PageResult, String> {
        let query = CatalogQuery::for_page(&self.params, self.format(), page);
        client
            .fetch_page(&self.source.base_url, &query, self.request_options())
            .await
            .map_err(|e| format!("page {page}: {e}"))
    }

    async fn collect_page(&self, client: &CatalogClient, page: u32) {
        self.progress.lock().await.current_page = page;
        match self.fetch(client, page).await {
            Ok(result) => self.process_page(page, result).await,
            Err(message) => {
                warn!(job_id = self.id, page, "Page failed: {message}");
                {
                    let mut progress = self.progress.lock().await;
                    progress.failed += 1;
                    progress.push_error(message.clone(), self.ctx.collector.max_recent_errors);
                }
                self.ctx
                    .log_event(
                        EventKind::Collect,
                        EventLevel::Error,
                        MODULE,
                        &format!("Page {page} failed"),
                        Some(json!({"job_id": self.id, "page": page, "error": message})),
                    )
                    .await;
            }
        }
    }

    async fn process_page(&self, page: u32, result: PageResult) {
        let threshold = self.threshold();
        if self.progress.lock().await.duplicate_streak >= threshold {
            self.request_threshold_stop().await;
            return;
        }

        let origin = UpsertOrigin {
            source: &self.source,
            page,
        };
        let mut report = PageReport::default();
        let mut streak = 0;
        for record in &result.list {
            if self.manual_stop.load(Ordering::SeqCst) {
                break;
            }
            let outcome =
                upsert_record(&self.ctx, record, &self.bindings, self.params.update_existing, origin).await;
            match outcome {
                UpsertOutcome::Created => report.success += 1,
                UpsertOutcome::Updated | UpsertOutcome::Skipped => report.skip += 1,
                UpsertOutcome::Failed(_) => report.failed += 1,
            }
            streak = self
                .progress
                .lock()
                .await
                .record(&outcome, self.ctx.collector.max_recent_errors);
        }

        info!(
            job_id = self.id,
            page,
            success = report.success,
            skip = report.skip,
            failed = report.failed,
            "Page collected"
        );
        self.ctx
            .log_event(
                EventKind::Collect,
                EventLevel::Info,
                MODULE,
                &format!("Page {page} collected"),
                Some(json!({
                    "job_id": self.id,
                    "page": page,
                    "success": report.success,
                    "skip": report.skip,
                    "failed": report.failed,
                })),
            )
            .await;

        if streak >= threshold {
            self.request_threshold_stop().await;
        }
    }

    /// Only the first caller logs and cancels.
    async fn request_threshold_stop(&self) {
        if self.threshold_stop.swap(true, Ordering::SeqCst) {
            return;
        }
        let streak = self.progress.lock().await.duplicate_streak;
        let threshold = self.threshold();
        warn!(job_id = self.id, streak, threshold, "Duplicate threshold reached, stopping");
        self.ctx
            .log_event(
                EventKind::Collect,
                EventLevel::Warning,
                MODULE,
                "Collection auto-stopped: too many consecutive duplicates",
                Some(json!({
                    "job_id": self.id,
                    "reason": "duplicate_threshold",
                    "streak": streak,
                    "threshold": threshold,
                })),
            )
            .await;
        self.cancel.cancel();
    }

    async fn finish(&self) {
        let status = if self.manual_stop.load(Ordering::SeqCst) {
            JobStatus::StoppedManual
        } else if self.threshold_stop.load(Ordering::SeqCst) {
            JobStatus::StoppedThreshold
        } else {
            JobStatus::Finished
        };

        let snapshot = {
            let mut progress = self.progress.lock().await;
            progress.status = status;
            progress.finished_at = Some(Utc::now());
            drop(progress);
            self.snapshot().await
        };

        if status == JobStatus::StoppedManual {
            self.ctx
                .log_event(
                    EventKind::Collect,
                    EventLevel::Warning,
                    MODULE,
                    "Collection stopped by user",
                    Some(json!({"job_id": self.id, "page": snapshot.current_page})),
                )
                .await;
        }

        info!(
            job_id = self.id,
            status = status.as_str(),
            success = snapshot.success,
            skip = snapshot.skip,
            failed = snapshot.failed,
            "Collection job finished"
        );
        let first_errors: Vec<&String> = snapshot.errors.iter().take(SUMMARY_ERRORS).collect();
        self.ctx
            .log_event(
                EventKind::Collect,
                EventLevel::Info,
                MODULE,
                &format!("Collection finished: {}", self.source.name),
                Some(json!({
                    "job_id": self.id,
                    "status": status,
                    "success": snapshot.success,
                    "skip": snapshot.skip,
                    "failed": snapshot.failed,
                    "errors": first_errors,
                })),
            )
            .await;

        self.done.cancel();
    }
}
