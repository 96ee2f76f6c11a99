//! Shared collaborators handed to every background task
//!
//! `CollectorContext` is cloned into each job and localization run; it owns
//! no mutable state apart from the upsert lock stripes.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

use crate::domain::events::{EventKind, EventLevel};
use crate::domain::repositories::{EventLog, SourceRegistry, VideoRepository};
use crate::domain::services::{CatalogTransport, ImageFetcher};
use crate::infrastructure::config::{CollectorConfig, LocalizerConfig};

#[derive(Clone)]
pub struct CollectorContext {
    pub videos: Arc<dyn VideoRepository>,
    pub events: Arc<dyn EventLog>,
    pub sources: Arc<dyn SourceRegistry>,
    pub transport: Arc<dyn CatalogTransport>,
    pub images: Arc<dyn ImageFetcher>,
    pub upsert_locks: Arc<UpsertLocks>,
    pub collector: CollectorConfig,
    pub localizer: LocalizerConfig,
}

impl CollectorContext {
    /// Appends to the event log. Failures are reported through `tracing`
    /// and never reach the caller.
    pub async fn log_event(
        &self,
        kind: EventKind,
        level: EventLevel,
        module: &str,
        message: &str,
        details: Option<Value>,
    ) {
        if let Err(e) = self.events.append(kind, level, module, message, details).await {
            warn!(module, "Failed to append {kind} event: {e:#}");
        }
    }
}

/// Striped mutexes keyed by a hash of the video name.
///
/// Two records with the same name always land on the same stripe, so their
/// find-then-create sequences never interleave.
pub struct UpsertLocks {
    stripes: Vec<Mutex<()>>,
}

impl UpsertLocks {
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn stripe_for(&self, name: &str) -> usize {
        let hash = blake3::hash(name.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_bytes()[..8]);
        (u64::from_le_bytes(prefix) % self.stripes.len() as u64) as usize
    }

    pub async fn lock(&self, name: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_for(name)].lock().await
    }

    pub fn len(&self) -> usize {
        self.stripes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stripes.is_empty()
    }
}

impl Default for UpsertLocks {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_same_stripe() {
        let locks = UpsertLocks::new(16);
        assert_eq!(locks.stripe_for("Alpha"), locks.stripe_for("Alpha"));
        assert!(locks.stripe_for("Beta") < 16);
    }

    #[test]
    fn zero_stripes_falls_back_to_one() {
        let locks = UpsertLocks::new(0);
        assert_eq!(locks.len(), 1);
        assert_eq!(locks.stripe_for("anything"), 0);
    }

    #[tokio::test]
    async fn lock_is_exclusive_per_stripe() {
        let locks = UpsertLocks::new(1);
        let guard = locks.lock("Alpha").await;
        assert!(locks.stripes[0].try_lock().is_err());
        drop(guard);
        assert!(locks.stripes[0].try_lock().is_ok());
    }
}
