//! Poster localization: downloads remote poster images next to the store
//!
//! Only one run may be active per `LocalizationManager`. Each record gets a
//! deterministic file name, so an interrupted run picks up where it stopped
//! without downloading anything twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::application::context::CollectorContext;
use crate::domain::constants::localization;
use crate::domain::events::{EventKind, EventLevel};
use crate::infrastructure::config::LocalizerConfig;
use crate::infrastructure::retry_manager::RetryPolicy;

const MODULE: &str = "image_localizer";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocalizationError {
    #[error("a localization run is already in progress")]
    AlreadyRunning,

    #[error("no localization run is in progress")]
    NotRunning,

    #[error("poster store failure: {0}")]
    Store(String),
}

/// Live or final state of a localization run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizationStatus {
    pub is_running: bool,
    pub total: u64,
    pub processed: u64,
    pub success: u64,
    pub failed: u64,
    pub skip: u64,
    pub current_video: String,
    pub stopped: bool,
    /// First errors of the run
    pub errors: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub total: u64,
    pub valid: u64,
    pub fixed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ItemOutcome {
    Success,
    Skip,
    Failed(String),
}

struct LocalizationRun {
    cancel: CancellationToken,
    done: CancellationToken,
    status: Mutex<LocalizationStatus>,
}

impl LocalizationRun {
    fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            done: CancellationToken::new(),
            status: Mutex::new(LocalizationStatus {
                is_running: true,
                started_at: Some(Utc::now()),
                ..LocalizationStatus::default()
            }),
        }
    }

    async fn record(&self, outcome: ItemOutcome, error_limit: usize) {
        let mut status = self.status.lock().await;
        status.processed += 1;
        match outcome {
            ItemOutcome::Success => status.success += 1,
            ItemOutcome::Skip => status.skip += 1,
            ItemOutcome::Failed(message) => {
                status.failed += 1;
                if status.errors.len() < error_limit {
                    status.errors.push(message);
                }
            }
        }
    }
}

/// `poster_{id}_{hash8}.{ext}` where the hash covers the remote URL
pub fn poster_filename(record_id: i64, remote_url: &str) -> String {
    let hash = blake3::hash(remote_url.as_bytes()).to_hex();
    format!(
        "poster_{record_id}_{}.{}",
        &hash[..localization::URL_HASH_CHARS],
        poster_extension(remote_url)
    )
}

fn poster_extension(remote_url: &str) -> String {
    let path = Url::parse(remote_url).map_or_else(|_| remote_url.to_string(), |url| url.path().to_string());
    Path::new(&path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| localization::ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| localization::FALLBACK_EXTENSION.to_string())
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Deletes a localized poster; returns whether a file was removed.
pub async fn remove_poster(config: &LocalizerConfig, local_pic: &str) -> bool {
    if local_pic.trim().is_empty() {
        return false;
    }
    let path = config.poster_dir.join(local_pic);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to remove poster {}: {e}", path.display());
            false
        }
    }
}

pub struct LocalizationManager {
    ctx: CollectorContext,
    active: Mutex<Option<Arc<LocalizationRun>>>,
    last_result: Arc<Mutex<Option<LocalizationStatus>>>,
}

impl LocalizationManager {
    pub fn new(ctx: CollectorContext) -> Self {
        Self {
            ctx,
            active: Mutex::new(None),
            last_result: Arc::new(Mutex::new(None)),
        }
    }

    fn poster_dir(&self) -> &Path {
        &self.ctx.localizer.poster_dir
    }

    /// Starts a run in the background; rejected while another is active.
    pub async fn start(&self) -> Result<(), LocalizationError> {
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|run| !run.done.is_cancelled()) {
            return Err(LocalizationError::AlreadyRunning);
        }

        tokio::fs::create_dir_all(self.poster_dir())
            .await
            .map_err(|e| LocalizationError::Store(format!("{}: {e}", self.poster_dir().display())))?;
        let ids = self
            .ctx
            .videos
            .ids_with_remote_poster()
            .await
            .map_err(|e| LocalizationError::Store(format!("{e:#}")))?;

        let run = Arc::new(LocalizationRun::new());
        run.status.lock().await.total = ids.len() as u64;
        *active = Some(Arc::clone(&run));
        drop(active);

        info!(total = ids.len(), "Poster localization started");
        let ctx = self.ctx.clone();
        let last_result = Arc::clone(&self.last_result);
        tokio::spawn(async move {
            execute(&ctx, &run, ids).await;
            let final_status = run.status.lock().await.clone();
            *last_result.lock().await = Some(final_status);
            run.done.cancel();
        });
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), LocalizationError> {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(run) if !run.done.is_cancelled() => {
                info!("Poster localization stop requested");
                run.cancel.cancel();
                Ok(())
            }
            _ => Err(LocalizationError::NotRunning),
        }
    }

    /// Live status of the active run, else the last completed one
    pub async fn status(&self) -> LocalizationStatus {
        let run = self.active.lock().await.clone();
        match run {
            Some(run) => run.status.lock().await.clone(),
            None => self.last_result().await.unwrap_or_default(),
        }
    }

    pub async fn last_result(&self) -> Option<LocalizationStatus> {
        self.last_result.lock().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|run| !run.done.is_cancelled())
    }

    /// Waits for the active run, if any, and returns its final status.
    pub async fn wait(&self) -> Option<LocalizationStatus> {
        let run = self.active.lock().await.clone()?;
        run.done.cancelled().await;
        Some(run.status.lock().await.clone())
    }

    /// Clears the localized flag of every record whose file is gone.
    pub async fn verify(&self) -> Result<VerifyReport, LocalizationError> {
        let records = self
            .ctx
            .videos
            .list_localized()
            .await
            .map_err(|e| LocalizationError::Store(format!("{e:#}")))?;

        let mut report = VerifyReport {
            total: records.len() as u64,
            ..VerifyReport::default()
        };
        for record in records {
            let present = !record.local_pic.is_empty() && file_exists(&self.poster_dir().join(&record.local_pic)).await;
            if present {
                report.valid += 1;
                continue;
            }
            match self.ctx.videos.set_localization(record.id, false, "").await {
                Ok(()) => {
                    debug!(id = record.id, local_pic = %record.local_pic, "Cleared stale localization flag");
                    report.fixed += 1;
                }
                Err(e) => error!(id = record.id, "Failed to clear localization flag: {e:#}"),
            }
        }

        info!(total = report.total, valid = report.valid, fixed = report.fixed, "Localization verified");
        self.ctx
            .log_event(
                EventKind::Download,
                EventLevel::Info,
                MODULE,
                &format!(
                    "Localization verified: total {}, valid {}, fixed {}",
                    report.total, report.valid, report.fixed
                ),
                Some(json!(report)),
            )
            .await;
        Ok(report)
    }
}

async fn execute(ctx: &CollectorContext, run: &Arc<LocalizationRun>, ids: Vec<i64>) {
    let semaphore = Arc::new(Semaphore::new(ctx.localizer.workers.max(1)));
    let mut tasks = JoinSet::new();

    for id in ids {
        let permit = tokio::select! {
            biased;
            () = run.cancel.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Download pool closed: {e}");
                    break;
                }
            },
        };
        if run.cancel.is_cancelled() {
            break;
        }

        let ctx = ctx.clone();
        let run = Arc::clone(run);
        tasks.spawn(async move {
            let _permit = permit;
            let outcome = localize_one(&ctx, &run, id).await;
            run.record(outcome, ctx.localizer.max_recent_errors).await;
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Download worker panicked: {e}");
        }
    }

    let status = {
        let mut status = run.status.lock().await;
        status.is_running = false;
        status.stopped = run.cancel.is_cancelled();
        status.finished_at = Some(Utc::now());
        status.clone()
    };
    info!(
        success = status.success,
        failed = status.failed,
        skip = status.skip,
        stopped = status.stopped,
        "Poster localization finished"
    );
    ctx.log_event(
        EventKind::Download,
        EventLevel::Info,
        MODULE,
        &format!(
            "Poster localization finished: success {}, failed {}, skip {}",
            status.success, status.failed, status.skip
        ),
        Some(json!({
            "total": status.total,
            "processed": status.processed,
            "stopped": status.stopped,
        })),
    )
    .await;
}

async fn localize_one(ctx: &CollectorContext, run: &LocalizationRun, id: i64) -> ItemOutcome {
    let poster_dir = &ctx.localizer.poster_dir;
    let record = match ctx.videos.find_by_id(id).await {
        Ok(Some(record)) => record,
        Ok(None) => return ItemOutcome::Failed(format!("video {id} no longer exists")),
        Err(e) => return ItemOutcome::Failed(format!("video {id}: {e:#}")),
    };

    if record.is_localized {
        if !record.local_pic.is_empty() && file_exists(&poster_dir.join(&record.local_pic)).await {
            return ItemOutcome::Skip;
        }
        debug!(id, "Localized poster missing on disk, downloading again");
        if let Err(e) = ctx.videos.set_localization(id, false, "").await {
            return ItemOutcome::Failed(format!("video {id}: {e:#}"));
        }
    }

    let Some(remote) = record.remote_picture() else {
        return ItemOutcome::Skip;
    };
    run.status.lock().await.current_video.clone_from(&record.vod_name);

    let filename = poster_filename(id, remote);
    let dest: PathBuf = poster_dir.join(&filename);
    if !file_exists(&dest).await {
        let policy = RetryPolicy::linear(ctx.localizer.max_retries, ctx.localizer.retry_step());
        let timeout = ctx.localizer.timeout();
        let downloaded = policy
            .run(remote, |_| ctx.images.download(remote, &dest, timeout))
            .await;
        if let Err(e) = downloaded {
            let message = format!("Poster download failed: {} (ID: {id})", record.vod_name);
            ctx.log_event(
                EventKind::Download,
                EventLevel::Warning,
                MODULE,
                &message,
                Some(json!({"id": id, "url": remote, "error": e.to_string()})),
            )
            .await;
            return ItemOutcome::Failed(format!("{message}: {e}"));
        }
    }

    match ctx.videos.set_localization(id, true, &filename).await {
        Ok(()) => ItemOutcome::Success,
        Err(e) => {
            let message = format!("Failed to record poster of video {id}: {e:#}");
            ctx.log_event(EventKind::Download, EventLevel::Error, MODULE, &message, None)
                .await;
            ItemOutcome::Failed(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://img.example/a/b/poster.JPG", "jpg")]
    #[case("https://img.example/p.webp?size=large", "webp")]
    #[case("http://img.example/p.jpeg", "jpeg")]
    #[case("https://img.example/p.bmp", "jpg")]
    #[case("https://img.example/no-extension", "jpg")]
    fn extension_is_allow_listed(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(poster_extension(url), expected);
    }

    #[test]
    fn filename_is_deterministic() {
        let url = "https://img.example/p.png";
        let name = poster_filename(7, url);
        assert_eq!(name, poster_filename(7, url));
        assert!(name.starts_with("poster_7_"));
        assert!(name.ends_with(".png"));
        // poster_7_ + 8 hex chars + .png
        assert_eq!(name.len(), "poster_7_".len() + 8 + ".png".len());
        assert_ne!(name, poster_filename(7, "https://img.example/q.png"));
    }

    #[tokio::test]
    async fn remove_poster_ignores_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = LocalizerConfig {
            poster_dir: dir.path().to_path_buf(),
            ..LocalizerConfig::default()
        };
        std::fs::write(dir.path().join("poster_1_abcdef12.jpg"), b"img").unwrap();
        assert!(remove_poster(&config, "poster_1_abcdef12.jpg").await);
        assert!(!remove_poster(&config, "poster_1_abcdef12.jpg").await);
        assert!(!remove_poster(&config, "").await);
    }
}
