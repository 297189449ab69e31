//! Upload orchestrator
//!
//! Drives one background job per habit: prepare photos, upload each,
//! insert the completion record. Job bookkeeping lives in a keyed store
//! mutated only under its lock; consumers observe jobs through snapshots
//! and the event stream, never through thrown errors.
//!
//! One in-flight job per habit, last writer wins: starting a new upload
//! for a busy key replaces the bookkeeping and aborts the superseded
//! task. Every checkpoint write re-validates that the writing pipeline is
//! still the current job for its key, so a stale pipeline can never
//! resurrect overwritten state.

use crate::config::{
    EngineConfig, PROGRESS_BACK_UPLOADED, PROGRESS_COMPLETE, PROGRESS_CREATED,
    PROGRESS_FRONT_UPLOADED, PROGRESS_PREPARING,
};
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::media::ImagePreparer;
use crate::models::{HabitCompletion, NewHabitCompletion, UploadJob, UploadStatus};
use crate::remote::{ObjectStore, RecordStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Clone)]
pub struct UploadService {
    object_store: Arc<dyn ObjectStore>,
    record_store: Arc<dyn RecordStore>,
    preparer: ImagePreparer,
    jobs: Arc<RwLock<HashMap<Uuid, UploadJob>>>,
    handles: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
    events: EventBus,
    stage_timeout: Duration,
}

impl UploadService {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        record_store: Arc<dyn RecordStore>,
        events: EventBus,
        config: &EngineConfig,
    ) -> Self {
        Self {
            object_store,
            record_store,
            preparer: ImagePreparer::new(config.max_image_width, config.jpeg_quality),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            handles: Arc::new(Mutex::new(HashMap::new())),
            events,
            stage_timeout: config.stage_timeout,
        }
    }

    /// Start a background upload job for a habit.
    ///
    /// Returns the new job id immediately; the pipeline runs in a spawned
    /// task and reports through job snapshots and the event stream. An
    /// in-flight job for the same habit is superseded, not queued.
    pub async fn start_upload(
        &self,
        habit_id: Uuid,
        user_id: Uuid,
        back_image: PathBuf,
        front_image: Option<PathBuf>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Uuid {
        let job_id = Uuid::new_v4();
        let job = UploadJob {
            job_id,
            habit_id,
            status: UploadStatus::Uploading,
            progress: PROGRESS_CREATED,
            back_image: back_image.clone(),
            front_image: front_image.clone(),
            error: None,
            completion: None,
            started_at: Utc::now(),
        };

        {
            let mut jobs = self.jobs.write().await;
            if let Some(previous) = jobs.insert(habit_id, job) {
                tracing::info!(
                    "Superseding upload job {} for habit {}",
                    previous.job_id,
                    habit_id
                );
            }
        }

        // A superseded pipeline must not keep racing the new one
        {
            let mut handles = self.handles.lock().await;
            if let Some(previous) = handles.remove(&habit_id) {
                previous.abort();
            }
        }

        tracing::info!("Upload job {} started for habit {}", job_id, habit_id);
        self.events.emit_lossy(EngineEvent::UploadProgress {
            habit_id,
            job_id,
            progress: PROGRESS_CREATED,
            timestamp: Utc::now(),
        });

        let service = self.clone();
        let handle = tokio::spawn(async move {
            let result = service
                .run_pipeline(job_id, habit_id, user_id, back_image, front_image, completed_at)
                .await;
            if let Err(e) = result {
                service.fail_job(habit_id, job_id, e).await;
            }
        });

        self.handles.lock().await.insert(habit_id, handle);
        job_id
    }

    /// Remove a job's bookkeeping.
    ///
    /// Idempotent, safe on unknown habits, callable mid-flight: the
    /// underlying task is not cancelled, but once the entry is gone its
    /// checkpoint writes are ignored and it stops at the next one.
    pub async fn clear_upload(&self, habit_id: Uuid) {
        let removed = self.jobs.write().await.remove(&habit_id);
        match removed {
            Some(job) => tracing::info!("Cleared upload job {} for habit {}", job.job_id, habit_id),
            None => tracing::debug!("clear_upload: no job for habit {}", habit_id),
        }

        // Detach the handle; the task itself keeps running
        self.handles.lock().await.remove(&habit_id);
    }

    /// Snapshot of the job for a habit
    pub async fn job(&self, habit_id: Uuid) -> Option<UploadJob> {
        self.jobs.read().await.get(&habit_id).cloned()
    }

    /// Snapshot of all jobs
    pub async fn jobs(&self) -> Vec<UploadJob> {
        self.jobs.read().await.values().cloned().collect()
    }

    async fn run_pipeline(
        &self,
        job_id: Uuid,
        habit_id: Uuid,
        user_id: Uuid,
        back_image: PathBuf,
        front_image: Option<PathBuf>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if !self.checkpoint(habit_id, job_id, PROGRESS_PREPARING).await {
            return Ok(());
        }

        let prepared = self.preparer.prepare(&back_image).await?;
        let path = prepared.object_path(user_id);
        let image_url = self
            .stage(
                self.object_store
                    .put(&path, prepared.bytes, prepared.content_type),
                "back image upload",
            )
            .await?;

        if !self.checkpoint(habit_id, job_id, PROGRESS_BACK_UPLOADED).await {
            return Ok(());
        }

        let front_image_url = match front_image {
            Some(front) => {
                let prepared = self.preparer.prepare(&front).await?;
                let path = prepared.object_path(user_id);
                let url = self
                    .stage(
                        self.object_store
                            .put(&path, prepared.bytes, prepared.content_type),
                        "front image upload",
                    )
                    .await?;
                Some(url)
            }
            None => None,
        };

        if !self.checkpoint(habit_id, job_id, PROGRESS_FRONT_UPLOADED).await {
            return Ok(());
        }

        let row = NewHabitCompletion {
            habit_id,
            user_id,
            completed_at: completed_at.unwrap_or_else(Utc::now),
            image_url,
            front_image_url,
            notes: None,
        };
        let completion = self
            .stage(self.record_store.insert_completion(row), "completion insert")
            .await?;

        self.complete_job(habit_id, job_id, completion).await;
        Ok(())
    }

    /// Run one remote stage under the bounded timeout. Each stage is
    /// attempted exactly once; a timeout is a stage failure.
    async fn stage<T>(
        &self,
        fut: impl Future<Output = Result<T>>,
        context: &str,
    ) -> Result<T> {
        match tokio::time::timeout(self.stage_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Upload(format!(
                "{} timed out after {:?}",
                context, self.stage_timeout
            ))),
        }
    }

    /// Write a progress checkpoint. Returns false when this job is no
    /// longer current for the habit (superseded or cleared); the pipeline
    /// must then stop without touching any more state.
    async fn checkpoint(&self, habit_id: Uuid, job_id: Uuid, progress: u8) -> bool {
        {
            let mut jobs = self.jobs.write().await;
            match jobs.get_mut(&habit_id) {
                Some(job) if job.job_id == job_id => job.progress = progress,
                _ => {
                    tracing::debug!(
                        "Upload job {} for habit {} is stale, stopping",
                        job_id,
                        habit_id
                    );
                    return false;
                }
            }
        }

        self.events.emit_lossy(EngineEvent::UploadProgress {
            habit_id,
            job_id,
            progress,
            timestamp: Utc::now(),
        });
        true
    }

    async fn complete_job(&self, habit_id: Uuid, job_id: Uuid, completion: HabitCompletion) {
        {
            let mut jobs = self.jobs.write().await;
            match jobs.get_mut(&habit_id) {
                Some(job) if job.job_id == job_id => {
                    job.progress = PROGRESS_COMPLETE;
                    job.status = UploadStatus::Completed;
                    job.completion = Some(completion.clone());
                }
                _ => {
                    tracing::debug!(
                        "Upload job {} for habit {} finished after being superseded, ignoring",
                        job_id,
                        habit_id
                    );
                    return;
                }
            }
        }

        tracing::info!("Upload job {} completed for habit {}", job_id, habit_id);
        self.events.emit_lossy(EngineEvent::UploadProgress {
            habit_id,
            job_id,
            progress: PROGRESS_COMPLETE,
            timestamp: Utc::now(),
        });
        self.events.emit_lossy(EngineEvent::UploadCompleted {
            habit_id,
            job_id,
            completion,
            timestamp: Utc::now(),
        });
    }

    /// Flip the job to `Error`, freezing progress at the last reached
    /// checkpoint. Images already persisted remotely stay where they are.
    async fn fail_job(&self, habit_id: Uuid, job_id: Uuid, error: EngineError) {
        let message = error.to_string();

        {
            let mut jobs = self.jobs.write().await;
            match jobs.get_mut(&habit_id) {
                Some(job) if job.job_id == job_id => {
                    job.status = UploadStatus::Error;
                    job.error = Some(message.clone());
                }
                _ => return,
            }
        }

        tracing::error!("Upload job {} for habit {} failed: {}", job_id, habit_id, message);
        self.events.emit_lossy(EngineEvent::UploadFailed {
            habit_id,
            job_id,
            message,
            timestamp: Utc::now(),
        });
    }
}
