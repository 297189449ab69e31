//! Engine models
//!
//! Rust structs for habits, completions, upload jobs, and derived
//! statistics. All models use serde for serialization to a host UI and
//! to the remote record store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A user-defined recurring action being tracked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Habit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    /// Display color as a hex string, e.g. "#7C3AED"
    pub color: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

/// A timestamped record that a habit was performed, with photo evidence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitCompletion {
    pub id: Uuid,
    pub habit_id: Uuid,
    pub user_id: Uuid,
    pub completed_at: DateTime<Utc>,
    /// Public URL of the back-camera photo
    pub image_url: String,
    /// Public URL of the front-camera photo, when one was captured
    pub front_image_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a completion; the record store assigns `id` and
/// `created_at`
#[derive(Debug, Clone, Serialize)]
pub struct NewHabitCompletion {
    pub habit_id: Uuid,
    pub user_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub image_url: String,
    pub front_image_url: Option<String>,
    pub notes: Option<String>,
}

/// Derived per-habit statistics. Never persisted; recomputed from scratch
/// on authoritative refresh and incrementally patched on optimistic
/// inserts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HabitStats {
    /// Consecutive calendar days ending today or yesterday
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Raw completion count, same-day duplicates included
    pub total_completions: u32,
    /// Placeholder metric, always 0.0
    pub completion_rate: f64,
    pub last_completed: Option<DateTime<Utc>>,
}

/// Status of a background upload job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploading,
    Completed,
    Error,
}

/// Bookkeeping for one background upload job.
///
/// Keyed by `habit_id` with a single in-flight job per habit; `job_id`
/// distinguishes a job from its successor under the same key so stale
/// pipelines can be detected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    pub job_id: Uuid,
    pub habit_id: Uuid,
    pub status: UploadStatus,
    /// Progress through the pipeline checkpoints, 0-100
    pub progress: u8,
    pub back_image: PathBuf,
    pub front_image: Option<PathBuf>,
    pub error: Option<String>,
    /// The inserted completion, set once the job reaches `Completed`.
    /// This is what the reconciliation layer merges into the cache.
    pub completion: Option<HabitCompletion>,
    pub started_at: DateTime<Utc>,
}
