//! In-memory registry of collection jobs
//!
//! Ids are assigned monotonically. Entries stay until `cleanup` removes the
//! terminal ones.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::application::collection_job::CollectionJob;
use crate::application::context::CollectorContext;
use crate::domain::collection::CollectionParams;
use crate::domain::job::JobSnapshot;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("source {0} does not exist")]
    UnknownSource(i64),

    #[error("source {0} is not active")]
    InactiveSource(i64),

    #[error("failed to load source {source_id}: {message}")]
    Store { source_id: i64, message: String },
}

pub struct JobRegistry {
    ctx: CollectorContext,
    next_id: AtomicU64,
    jobs: RwLock<HashMap<u64, Arc<CollectionJob>>>,
}

impl JobRegistry {
    pub fn new(ctx: CollectorContext) -> Self {
        Self {
            ctx,
            next_id: AtomicU64::new(1),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Validates the source, launches the job in the background and returns
    /// its id without waiting.
    pub async fn start(&self, source_id: i64, params: CollectionParams) -> Result<u64, RegistryError> {
        let store_error = |e: anyhow::Error| RegistryError::Store {
            source_id,
            message: format!("{e:#}"),
        };
        let source = self
            .ctx
            .sources
            .get(source_id)
            .await
            .map_err(store_error)?
            .ok_or(RegistryError::UnknownSource(source_id))?;
        if !source.is_active {
            return Err(RegistryError::InactiveSource(source_id));
        }
        let bindings = self
            .ctx
            .sources
            .category_bindings(source_id)
            .await
            .map_err(store_error)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let job = Arc::new(CollectionJob::new(id, self.ctx.clone(), source, params, bindings));
        self.jobs.write().await.insert(id, Arc::clone(&job));

        info!(job_id = id, source_id, "Launching collection job");
        tokio::spawn(job.run());
        Ok(id)
    }

    /// Signals a running job; false for unknown or already terminal ids.
    pub async fn stop(&self, id: u64) -> bool {
        let job = self.jobs.read().await.get(&id).cloned();
        match job {
            Some(job) => job.stop().await,
            None => false,
        }
    }

    pub async fn status(&self, id: u64) -> Option<JobSnapshot> {
        let job = self.jobs.read().await.get(&id).cloned()?;
        Some(job.snapshot().await)
    }

    /// Snapshots of every registered job, ordered by id
    pub async fn status_all(&self) -> Vec<JobSnapshot> {
        let mut jobs: Vec<Arc<CollectionJob>> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.id());
        let mut snapshots = Vec::with_capacity(jobs.len());
        for job in jobs {
            snapshots.push(job.snapshot().await);
        }
        snapshots
    }

    /// Removes terminal jobs and returns how many were dropped.
    pub async fn cleanup(&self) -> usize {
        let jobs: Vec<Arc<CollectionJob>> = self.jobs.read().await.values().cloned().collect();
        let mut finished = Vec::new();
        for job in jobs {
            if job.status().await.is_terminal() {
                finished.push(job.id());
            }
        }

        let mut registry = self.jobs.write().await;
        let mut removed = 0;
        for id in &finished {
            if registry.remove(id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Cleaned up finished jobs");
        }
        removed
    }

    /// Waits for a job to reach a terminal state and returns its final
    /// snapshot.
    pub async fn wait(&self, id: u64) -> Option<JobSnapshot> {
        let job = self.jobs.read().await.get(&id).cloned()?;
        job.wait().await;
        Some(job.snapshot().await)
    }

    /// Stops every job and waits for all of them to finish.
    pub async fn shutdown(&self) {
        let jobs: Vec<Arc<CollectionJob>> = self.jobs.read().await.values().cloned().collect();
        for job in &jobs {
            job.stop().await;
        }
        for job in &jobs {
            job.wait().await;
        }
    }
}
