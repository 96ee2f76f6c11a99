//! Collection job state as seen by callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::collection::CollectionParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Running,
    Finished,
    StoppedManual,
    StoppedThreshold,
}

impl JobStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Finished | Self::StoppedManual | Self::StoppedThreshold
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::StoppedManual => "stopped_manual",
            Self::StoppedThreshold => "stopped_threshold",
        }
    }
}

/// Point-in-time copy of a job's progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: u64,
    pub source_id: i64,
    pub source_name: String,
    pub status: JobStatus,
    pub success: u64,
    pub skip: u64,
    pub failed: u64,
    pub duplicate_streak: u32,
    pub current_page: u32,
    pub total_pages: u32,
    /// Most recent errors, oldest first
    pub errors: Vec<String>,
    pub params: CollectionParams,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    pub const fn processed(&self) -> u64 {
        self.success + self.skip + self.failed
    }
}
