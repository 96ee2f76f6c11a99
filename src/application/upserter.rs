//! Create-or-update of one normalized record
//!
//! The find/create/update sequence for a name runs under that name's lock
//! stripe. The outcome is written to the event log after the store write.

use serde_json::json;
use tracing::{debug, warn};

use crate::application::context::CollectorContext;
use crate::application::normalizer::{NormalizeError, normalize};
use crate::domain::collection::RawRecord;
use crate::domain::events::{EventKind, EventLevel};
use crate::domain::repositories::CategoryBindings;
use crate::domain::source::SourceDescriptor;

const MODULE: &str = "upserter";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    /// Existing record refreshed from the new sighting
    Updated,
    /// Existing record left untouched
    Skipped,
    Failed(String),
}

impl UpsertOutcome {
    /// Tag written to the event log
    pub const fn result_tag(&self) -> &'static str {
        match self {
            Self::Created => "success",
            Self::Updated => "skip-update",
            Self::Skipped => "skip",
            Self::Failed(_) => "failed",
        }
    }

    /// Updates and skips both count as duplicates
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Updated | Self::Skipped)
    }
}

/// Where a record came from, for event details
#[derive(Debug, Clone, Copy)]
pub struct UpsertOrigin<'a> {
    pub source: &'a SourceDescriptor,
    pub page: u32,
}

pub async fn upsert_record(
    ctx: &CollectorContext,
    record: &RawRecord,
    bindings: &CategoryBindings,
    update_existing: bool,
    origin: UpsertOrigin<'_>,
) -> UpsertOutcome {
    let video = match normalize(record, bindings) {
        Ok(video) => video,
        Err(NormalizeError::BlankName) => {
            let message = "Record skipped: blank vod_name";
            warn!(source = %origin.source.name, page = origin.page, "{message}");
            ctx.log_event(
                EventKind::Collect,
                EventLevel::Error,
                MODULE,
                message,
                Some(json!({
                    "source_id": origin.source.id,
                    "source": origin.source.name,
                    "page": origin.page,
                    "vod_id": record.text("vod_id"),
                    "result": "failed",
                })),
            )
            .await;
            return UpsertOutcome::Failed(format!("page {}: {message}", origin.page));
        }
    };

    let (vod_name, vod_id, type_id, type_name) = (
        video.vod_name.clone(),
        video.vod_id,
        video.type_id,
        video.type_name.clone(),
    );

    let outcome = {
        let _guard = ctx.upsert_locks.lock(&vod_name).await;
        match ctx.videos.find_by_name(&vod_name).await {
            Ok(None) => match ctx.videos.create(&video.into_new_video()).await {
                Ok(_) => UpsertOutcome::Created,
                Err(e) => UpsertOutcome::Failed(format!("{vod_name}: {e:#}")),
            },
            Ok(Some(mut existing)) if update_existing => {
                video.patch.apply_to(&mut existing.fields);
                if video.type_id != 0 {
                    existing.type_id = video.type_id;
                }
                if !video.type_name.is_empty() {
                    existing.type_name = video.type_name;
                }
                match ctx.videos.update(&existing).await {
                    Ok(()) => UpsertOutcome::Updated,
                    Err(e) => UpsertOutcome::Failed(format!("{vod_name}: {e:#}")),
                }
            }
            Ok(Some(_)) => UpsertOutcome::Skipped,
            Err(e) => UpsertOutcome::Failed(format!("{vod_name}: {e:#}")),
        }
    };

    let (level, message) = match &outcome {
        UpsertOutcome::Created => (EventLevel::Info, format!("Collected video: {vod_name}")),
        UpsertOutcome::Updated => (EventLevel::Info, format!("Updated video: {vod_name}")),
        UpsertOutcome::Skipped => (EventLevel::Debug, format!("Skipped existing video: {vod_name}")),
        UpsertOutcome::Failed(reason) => {
            warn!(source = %origin.source.name, page = origin.page, "Upsert failed: {reason}");
            (EventLevel::Error, format!("Failed to save video: {vod_name}"))
        }
    };
    debug!(page = origin.page, result = outcome.result_tag(), "{message}");

    ctx.log_event(
        EventKind::Collect,
        level,
        MODULE,
        &message,
        Some(json!({
            "vod_name": vod_name,
            "vod_id": vod_id,
            "type_id": type_id,
            "type_name": type_name,
            "source_id": origin.source.id,
            "source": origin.source.name,
            "page": origin.page,
            "result": outcome.result_tag(),
        })),
    )
    .await;

    outcome
}
