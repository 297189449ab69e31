//! Upload reconciliation
//!
//! Merges a completed upload job's result into the completion cache at
//! most once, however many times the job is observed. The guard pairs
//! each habit with the job id it last merged; it is dropped when the
//! job's bookkeeping disappears or its status leaves `Completed`.

use crate::models::{UploadJob, UploadStatus};
use crate::services::CompletionsService;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct Reconciler {
    completions: CompletionsService,
    /// habit id -> job id already merged
    applied: Arc<RwLock<HashMap<Uuid, Uuid>>>,
}

impl Reconciler {
    pub fn new(completions: CompletionsService) -> Self {
        Self {
            completions,
            applied: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Observe a job and merge its completion if not merged already.
    ///
    /// Idempotent: absorbing the same completed job twice leaves the
    /// cache exactly as absorbing it once. A job in any other status
    /// clears the guard for its habit. Returns true when a merge
    /// happened.
    pub async fn absorb(&self, job: &UploadJob) -> bool {
        if job.status != UploadStatus::Completed {
            self.applied.write().await.remove(&job.habit_id);
            return false;
        }

        let Some(completion) = &job.completion else {
            tracing::warn!(
                "Completed upload job {} for habit {} carries no completion",
                job.job_id,
                job.habit_id
            );
            return false;
        };

        {
            let mut applied = self.applied.write().await;
            if applied.get(&job.habit_id) == Some(&job.job_id) {
                tracing::debug!(
                    "Upload job {} for habit {} already merged",
                    job.job_id,
                    job.habit_id
                );
                return false;
            }
            applied.insert(job.habit_id, job.job_id);
        }

        tracing::debug!(
            "Merging upload job {} into cache for habit {}",
            job.job_id,
            job.habit_id
        );
        self.completions
            .add_optimistic_completion(completion.clone())
            .await;
        true
    }

    /// Drop the guard for a habit, e.g. when its job entry is cleared
    pub async fn forget(&self, habit_id: Uuid) {
        self.applied.write().await.remove(&habit_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EVENT_CHANNEL_CAPACITY;
    use crate::events::EventBus;
    use crate::models::HabitCompletion;
    use crate::remote::{MemoryObjectStore, MemoryRecordStore};
    use chrono::Utc;
    use std::path::PathBuf;

    fn completed_job(habit_id: Uuid) -> UploadJob {
        let completion = HabitCompletion {
            id: Uuid::new_v4(),
            habit_id,
            user_id: Uuid::new_v4(),
            completed_at: Utc::now(),
            image_url: MemoryObjectStore::url_for("u/photo.jpg"),
            front_image_url: None,
            notes: None,
            created_at: Utc::now(),
        };

        UploadJob {
            job_id: Uuid::new_v4(),
            habit_id,
            status: UploadStatus::Completed,
            progress: 100,
            back_image: PathBuf::from("photo.png"),
            front_image: None,
            error: None,
            completion: Some(completion),
            started_at: Utc::now(),
        }
    }

    fn test_reconciler() -> (Reconciler, CompletionsService) {
        let completions = CompletionsService::new(
            Arc::new(MemoryObjectStore::new()),
            Arc::new(MemoryRecordStore::new()),
            EventBus::new(EVENT_CHANNEL_CAPACITY),
        );
        (Reconciler::new(completions.clone()), completions)
    }

    #[tokio::test]
    async fn test_absorbing_twice_merges_once() {
        let (reconciler, completions) = test_reconciler();
        let habit_id = Uuid::new_v4();
        let job = completed_job(habit_id);

        assert!(reconciler.absorb(&job).await);
        assert!(!reconciler.absorb(&job).await);

        let stats = completions.stats(habit_id).await.unwrap();
        assert_eq!(stats.total_completions, 1);
        assert_eq!(stats.current_streak, 1);
    }

    #[tokio::test]
    async fn test_successor_job_merges_again() {
        let (reconciler, completions) = test_reconciler();
        let habit_id = Uuid::new_v4();

        assert!(reconciler.absorb(&completed_job(habit_id)).await);
        assert!(reconciler.absorb(&completed_job(habit_id)).await);

        let stats = completions.stats(habit_id).await.unwrap();
        assert_eq!(stats.total_completions, 2);
        // Same-day duplicate: the streak still advances only once
        assert_eq!(stats.current_streak, 1);
    }

    #[tokio::test]
    async fn test_non_completed_job_clears_guard() {
        let (reconciler, completions) = test_reconciler();
        let habit_id = Uuid::new_v4();
        let job = completed_job(habit_id);

        assert!(reconciler.absorb(&job).await);

        // A fresh job under the same key resets the guard...
        let mut restarted = completed_job(habit_id);
        restarted.status = UploadStatus::Uploading;
        restarted.completion = None;
        assert!(!reconciler.absorb(&restarted).await);

        // ...so the original job would merge again if re-observed
        assert!(reconciler.absorb(&job).await);
        let stats = completions.stats(habit_id).await.unwrap();
        assert_eq!(stats.total_completions, 2);
    }

    #[tokio::test]
    async fn test_forget_clears_guard() {
        let (reconciler, _completions) = test_reconciler();
        let habit_id = Uuid::new_v4();
        let job = completed_job(habit_id);

        assert!(reconciler.absorb(&job).await);
        reconciler.forget(habit_id).await;
        assert!(reconciler.absorb(&job).await);
    }
}
