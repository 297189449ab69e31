//! Completion cache
//!
//! Per-habit completion histories with derived statistics. Supports
//! optimistic insertion ahead of the network round-trip and wholesale
//! authoritative replacement from the record store. Local deletions are
//! synchronous; their remote counterparts run in the background and are
//! best-effort only.

use crate::error::Result;
use crate::events::{EngineEvent, EventBus};
use crate::models::{Habit, HabitCompletion, HabitStats};
use crate::remote::{ObjectStore, RecordStore};
use crate::services::stats;
use anyhow::Context;
use chrono::{Local, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A cached completion, tagged provisional until an authoritative refresh
/// replaces it
#[derive(Debug, Clone)]
struct CachedCompletion {
    completion: HabitCompletion,
    provisional: bool,
}

#[derive(Debug, Default)]
struct HabitState {
    habit: Option<Habit>,
    /// Most-recent-first
    completions: Vec<CachedCompletion>,
    stats: HabitStats,
}

/// Service owning the in-memory completion lists and stats.
///
/// All per-habit mutation happens under one write lock, so writers for a
/// key are serialized and refreshes replace state atomically.
#[derive(Clone)]
pub struct CompletionsService {
    object_store: Arc<dyn ObjectStore>,
    record_store: Arc<dyn RecordStore>,
    state: Arc<RwLock<HashMap<Uuid, HabitState>>>,
    events: EventBus,
}

impl CompletionsService {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        record_store: Arc<dyn RecordStore>,
        events: EventBus,
    ) -> Self {
        Self {
            object_store,
            record_store,
            state: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Insert a completion ahead of server confirmation.
    ///
    /// Head-inserts into the habit's list and patches stats incrementally:
    /// the total always grows, but the current streak only advances if the
    /// habit had not already been completed today (recording twice in one
    /// day must not double-count).
    pub async fn add_optimistic_completion(&self, completion: HabitCompletion) {
        let mut state = self.state.write().await;
        let entry = state.entry(completion.habit_id).or_default();

        let today = Local::now().date_naive();
        let already_today = entry
            .completions
            .iter()
            .any(|c| stats::local_day(c.completion.completed_at) == today);

        tracing::debug!(
            "Optimistic completion for habit {} (already today: {})",
            completion.habit_id,
            already_today
        );

        entry.stats.total_completions += 1;
        if !already_today {
            entry.stats.current_streak += 1;
        }
        entry.stats.last_completed = entry
            .stats
            .last_completed
            .max(Some(completion.completed_at));

        entry.completions.insert(
            0,
            CachedCompletion {
                completion,
                provisional: true,
            },
        );
    }

    /// Replace the whole cache with the server's truth and recompute all
    /// stats from scratch. Always wins over optimistic state.
    pub async fn fetch_authoritative(&self, user_id: Uuid) -> Result<()> {
        tracing::info!("Refreshing completions for user {}", user_id);

        let habits = self.record_store.habits_for_user(user_id).await?;
        let completions = self.record_store.completions_for_user(user_id).await?;

        let mut grouped: HashMap<Uuid, Vec<HabitCompletion>> = HashMap::new();
        for completion in completions {
            grouped.entry(completion.habit_id).or_default().push(completion);
        }

        let mut state = self.state.write().await;
        state.clear();

        for habit in habits {
            let habit_id = habit.id;
            state.entry(habit_id).or_default().habit = Some(habit);
        }

        for (habit_id, mut list) in grouped {
            list.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));

            let entry = state.entry(habit_id).or_default();
            entry.stats = stats::compute_stats(&list);
            entry.completions = list
                .into_iter()
                .map(|completion| CachedCompletion {
                    completion,
                    provisional: false,
                })
                .collect();
        }

        let habit_count = state.len();
        drop(state);

        self.events.emit_lossy(EngineEvent::CompletionsRefreshed {
            habit_count,
            timestamp: Utc::now(),
        });

        Ok(())
    }

    /// Remove a completion locally, then delete its remote artifacts in
    /// the background. The local removal is never rolled back.
    pub async fn delete_completion(&self, id: Uuid) {
        let mut removed: Option<HabitCompletion> = None;

        {
            let mut state = self.state.write().await;
            for entry in state.values_mut() {
                if let Some(pos) = entry.completions.iter().position(|c| c.completion.id == id) {
                    removed = Some(entry.completions.remove(pos).completion);

                    let remaining: Vec<HabitCompletion> = entry
                        .completions
                        .iter()
                        .map(|c| c.completion.clone())
                        .collect();
                    entry.stats = stats::compute_stats(&remaining);
                    break;
                }
            }
        }

        let Some(completion) = removed else {
            tracing::debug!("delete_completion: {} not in cache", id);
            return;
        };

        tracing::info!("Deleted completion {} locally", id);
        self.events.emit_lossy(EngineEvent::CompletionDeleted {
            completion_id: id,
            habit_id: completion.habit_id,
            timestamp: Utc::now(),
        });

        let object_store = Arc::clone(&self.object_store);
        let record_store = Arc::clone(&self.record_store);
        tokio::spawn(async move {
            if let Err(e) =
                delete_remote_completion(object_store, record_store, &completion).await
            {
                tracing::warn!("Background completion delete failed: {:#}", e);
            }
        });
    }

    /// Remove a habit and its completions locally, then delete the remote
    /// rows and photos in the background.
    pub async fn delete_habit(&self, habit_id: Uuid) {
        let entry = {
            let mut state = self.state.write().await;
            state.remove(&habit_id)
        };

        let Some(entry) = entry else {
            tracing::debug!("delete_habit: {} not in cache", habit_id);
            return;
        };

        tracing::info!("Deleted habit {} locally", habit_id);
        self.events.emit_lossy(EngineEvent::HabitDeleted {
            habit_id,
            timestamp: Utc::now(),
        });

        let urls: Vec<String> = entry
            .completions
            .iter()
            .flat_map(|c| {
                let mut urls = vec![c.completion.image_url.clone()];
                urls.extend(c.completion.front_image_url.clone());
                urls
            })
            .collect();

        let object_store = Arc::clone(&self.object_store);
        let record_store = Arc::clone(&self.record_store);
        tokio::spawn(async move {
            if let Err(e) =
                delete_remote_habit(object_store, record_store, habit_id, &urls).await
            {
                tracing::warn!("Background habit delete failed: {:#}", e);
            }
        });
    }

    /// Habits known to the cache
    pub async fn habits(&self) -> Vec<Habit> {
        self.state
            .read()
            .await
            .values()
            .filter_map(|entry| entry.habit.clone())
            .collect()
    }

    /// A habit's completions, most recent first
    pub async fn completions(&self, habit_id: Uuid) -> Vec<HabitCompletion> {
        self.state
            .read()
            .await
            .get(&habit_id)
            .map(|entry| entry.completions.iter().map(|c| c.completion.clone()).collect())
            .unwrap_or_default()
    }

    /// A habit's derived statistics
    pub async fn stats(&self, habit_id: Uuid) -> Option<HabitStats> {
        self.state
            .read()
            .await
            .get(&habit_id)
            .map(|entry| entry.stats.clone())
    }

    /// True if any cached entry for the habit is still provisional
    pub async fn has_provisional(&self, habit_id: Uuid) -> bool {
        self.state
            .read()
            .await
            .get(&habit_id)
            .map(|entry| entry.completions.iter().any(|c| c.provisional))
            .unwrap_or(false)
    }
}

/// Delete a completion's photos, then its row. Photos first so a row
/// never outlives its images silently.
async fn delete_remote_completion(
    object_store: Arc<dyn ObjectStore>,
    record_store: Arc<dyn RecordStore>,
    completion: &HabitCompletion,
) -> anyhow::Result<()> {
    let mut urls = vec![completion.image_url.clone()];
    urls.extend(completion.front_image_url.clone());

    let paths: Vec<String> = urls
        .iter()
        .filter_map(|url| object_store.object_path(url))
        .collect();

    if !paths.is_empty() {
        object_store
            .delete(&paths)
            .await
            .context("deleting completion photos")?;
    }

    record_store
        .delete_completion(completion.id)
        .await
        .context("deleting completion row")?;

    tracing::debug!("Remote artifacts for completion {} deleted", completion.id);
    Ok(())
}

async fn delete_remote_habit(
    object_store: Arc<dyn ObjectStore>,
    record_store: Arc<dyn RecordStore>,
    habit_id: Uuid,
    photo_urls: &[String],
) -> anyhow::Result<()> {
    let paths: Vec<String> = photo_urls
        .iter()
        .filter_map(|url| object_store.object_path(url))
        .collect();

    if !paths.is_empty() {
        object_store
            .delete(&paths)
            .await
            .context("deleting habit photos")?;
    }

    record_store
        .delete_completions_for_habit(habit_id)
        .await
        .context("deleting completion rows")?;
    record_store
        .delete_habit(habit_id)
        .await
        .context("deleting habit row")?;

    tracing::debug!("Remote artifacts for habit {} deleted", habit_id);
    Ok(())
}
