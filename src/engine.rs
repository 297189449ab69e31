//! Engine facade and wiring
//!
//! Owns every service, the event bus, and the background reconciliation
//! task. Hosts construct one `HabitEngine` over their store clients and
//! drive the whole flow through it.

use crate::config::{EngineConfig, EVENT_CHANNEL_CAPACITY};
use crate::error::Result;
use crate::events::{EngineEvent, EventBus};
use crate::models::{Habit, HabitCompletion, HabitStats, UploadJob};
use crate::remote::{ObjectStore, RecordStore};
use crate::services::{CompletionsService, Reconciler, UploadService};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub struct HabitEngine {
    uploads: UploadService,
    completions: CompletionsService,
    reconciler: Arc<Reconciler>,
    events: EventBus,
    reconcile_task: JoinHandle<()>,
}

impl HabitEngine {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        record_store: Arc<dyn RecordStore>,
        config: EngineConfig,
    ) -> Self {
        let events = EventBus::new(EVENT_CHANNEL_CAPACITY);
        let completions = CompletionsService::new(
            Arc::clone(&object_store),
            Arc::clone(&record_store),
            events.clone(),
        );
        let uploads = UploadService::new(object_store, record_store, events.clone(), &config);
        let reconciler = Arc::new(Reconciler::new(completions.clone()));

        // Completed jobs merge into the cache exactly once, however often
        // consumers observe them
        let reconcile_task = tokio::spawn(reconcile_loop(
            uploads.clone(),
            Arc::clone(&reconciler),
            events.subscribe(),
        ));

        tracing::info!("Habit engine initialized");

        Self {
            uploads,
            completions,
            reconciler,
            events,
            reconcile_task,
        }
    }

    /// Subscribe to the engine's event stream
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Start a background upload job for a habit; see [`UploadService`]
    pub async fn start_upload(
        &self,
        habit_id: Uuid,
        user_id: Uuid,
        back_image: PathBuf,
        front_image: Option<PathBuf>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Uuid {
        self.uploads
            .start_upload(habit_id, user_id, back_image, front_image, completed_at)
            .await
    }

    /// Remove a habit's upload bookkeeping and its reconciliation guard
    pub async fn clear_upload(&self, habit_id: Uuid) {
        self.uploads.clear_upload(habit_id).await;
        self.reconciler.forget(habit_id).await;
    }

    /// Snapshot of the upload job for a habit
    pub async fn upload_job(&self, habit_id: Uuid) -> Option<UploadJob> {
        self.uploads.job(habit_id).await
    }

    /// Snapshot of all upload jobs
    pub async fn upload_jobs(&self) -> Vec<UploadJob> {
        self.uploads.jobs().await
    }

    /// Observe the habit's current job and merge it if completed and not
    /// merged yet. Safe to call repeatedly; see [`Reconciler`].
    pub async fn reconcile(&self, habit_id: Uuid) -> bool {
        match self.uploads.job(habit_id).await {
            Some(job) => self.reconciler.absorb(&job).await,
            None => {
                // Entry gone: nothing to merge and the guard is stale
                self.reconciler.forget(habit_id).await;
                false
            }
        }
    }

    /// Replace the cache with the server's truth
    pub async fn fetch_authoritative(&self, user_id: Uuid) -> Result<()> {
        self.completions.fetch_authoritative(user_id).await
    }

    /// Remove a completion locally now, remotely in the background
    pub async fn delete_completion(&self, id: Uuid) {
        self.completions.delete_completion(id).await;
    }

    /// Remove a habit locally now, remotely in the background
    pub async fn delete_habit(&self, habit_id: Uuid) {
        self.completions.delete_habit(habit_id).await;
    }

    pub async fn habits(&self) -> Vec<Habit> {
        self.completions.habits().await
    }

    pub async fn completions(&self, habit_id: Uuid) -> Vec<HabitCompletion> {
        self.completions.completions(habit_id).await
    }

    pub async fn stats(&self, habit_id: Uuid) -> Option<HabitStats> {
        self.completions.stats(habit_id).await
    }
}

impl Drop for HabitEngine {
    fn drop(&mut self) {
        self.reconcile_task.abort();
    }
}

async fn reconcile_loop(
    uploads: UploadService,
    reconciler: Arc<Reconciler>,
    mut events: broadcast::Receiver<EngineEvent>,
) {
    loop {
        match events.recv().await {
            Ok(EngineEvent::UploadCompleted { habit_id, .. }) => {
                if let Some(job) = uploads.job(habit_id).await {
                    reconciler.absorb(&job).await;
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Reconcile loop lagged, {} events dropped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
