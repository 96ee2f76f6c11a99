//! Repository interfaces for the catalog store, event log and source registry
//!
//! SQLite implementations live in `infrastructure`; hosts with their own
//! storage implement these traits instead.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::events::{EventEntry, EventKind, EventLevel, EventStats};
use crate::domain::source::{NewSource, SourceDescriptor};
use crate::domain::video::{NewVideo, VideoFilter, VideoRecord};

/// Remote category id to local category id
pub type CategoryBindings = HashMap<i64, i64>;

#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<VideoRecord>>;
    async fn find_by_id(&self, id: i64) -> Result<Option<VideoRecord>>;
    /// Inserts and returns the new row id
    async fn create(&self, video: &NewVideo) -> Result<i64>;
    /// Writes the catalog columns only; localization state is left as stored
    async fn update(&self, video: &VideoRecord) -> Result<()>;
    /// Returns whether a row was removed
    async fn delete(&self, id: i64) -> Result<bool>;
    async fn count(&self, filter: &VideoFilter) -> Result<u64>;
    async fn list(&self, filter: &VideoFilter) -> Result<Vec<VideoRecord>>;

    /// Row ids of records carrying a non-empty remote poster URL
    async fn ids_with_remote_poster(&self) -> Result<Vec<i64>>;
    /// Records currently flagged as localized
    async fn list_localized(&self) -> Result<Vec<VideoRecord>>;
    async fn set_localization(&self, id: i64, localized: bool, local_pic: &str) -> Result<()>;
}

#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(
        &self,
        kind: EventKind,
        level: EventLevel,
        module: &str,
        message: &str,
        details: Option<serde_json::Value>,
    ) -> Result<()>;

    /// Newest first
    async fn recent(&self, kind: Option<EventKind>, limit: u32) -> Result<Vec<EventEntry>>;
    /// Removes entries older than `days` and returns how many were deleted
    async fn purge_older_than(&self, days: u32) -> Result<u64>;
    async fn stats(&self) -> Result<EventStats>;
}

#[async_trait]
pub trait SourceRegistry: Send + Sync {
    async fn list_active(&self) -> Result<Vec<SourceDescriptor>>;
    async fn list_all(&self) -> Result<Vec<SourceDescriptor>>;
    async fn get(&self, id: i64) -> Result<Option<SourceDescriptor>>;
    async fn create(&self, source: &NewSource) -> Result<i64>;
    async fn set_active(&self, id: i64, active: bool) -> Result<bool>;

    async fn category_bindings(&self, source_id: i64) -> Result<CategoryBindings>;
    async fn bind_category(&self, source_id: i64, remote_type_id: i64, local_type_id: i64) -> Result<()>;
}
