//! Engine configuration
//!
//! Central location for tuning constants, resource limits, and the
//! host-adjustable [`EngineConfig`].

use std::time::Duration;

// ===== Image Preparation =====

/// Default width cap for prepared photos in pixels.
/// Captured images wider than this are downsized; narrower images are
/// never upscaled.
pub const DEFAULT_MAX_IMAGE_WIDTH: u32 = 1080;

/// Default JPEG re-encode quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

// ===== Upload Pipeline =====

/// Per-stage timeout for remote calls in the upload pipeline.
/// A stage that exceeds this is treated as failed; the job never hangs
/// in `uploading` indefinitely.
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 30;

/// Progress checkpoint: job bookkeeping created.
pub const PROGRESS_CREATED: u8 = 0;
/// Progress checkpoint: entering the prepare/upload phase.
pub const PROGRESS_PREPARING: u8 = 10;
/// Progress checkpoint: back-camera image persisted remotely.
pub const PROGRESS_BACK_UPLOADED: u8 = 50;
/// Progress checkpoint: front-camera image stage finished.
pub const PROGRESS_FRONT_UPLOADED: u8 = 80;
/// Progress checkpoint: completion record durably inserted.
pub const PROGRESS_COMPLETE: u8 = 100;

// ===== Events =====

/// Buffered events per subscriber before old events are dropped.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ===== Remote Storage =====

/// Object storage bucket holding completion photos.
pub const PHOTO_BUCKET: &str = "habit-photos";

/// Record store table holding completion rows.
pub const COMPLETIONS_TABLE: &str = "habit_completions";

/// Record store table holding habit rows.
pub const HABITS_TABLE: &str = "habits";

/// Host-adjustable engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Width cap for prepared photos in pixels.
    pub max_image_width: u32,
    /// JPEG re-encode quality (1-100).
    pub jpeg_quality: u8,
    /// Timeout applied to each remote stage of an upload job.
    pub stage_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_image_width: DEFAULT_MAX_IMAGE_WIDTH,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            stage_timeout: Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS),
        }
    }
}
