//! In-memory remote stores
//!
//! Process-local implementations of the store contracts, used by the test
//! suites and as an offline backend. Both stores support latency and
//! failure injection so pipeline edge cases can be exercised.

use crate::config::PHOTO_BUCKET;
use crate::error::{EngineError, Result};
use crate::models::{Habit, HabitCompletion, NewHabitCompletion};
use crate::remote::{ObjectStore, RecordStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-memory object store keyed by object path
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    delay: Mutex<Option<Duration>>,
    fail_puts: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Public URL scheme used by this store
    pub fn url_for(path: &str) -> String {
        format!("memory://{}/{}", PHOTO_BUCKET, path)
    }

    /// Sleep this long before every put/delete
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().await = delay;
    }

    /// Make every subsequent put fail
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.objects.lock().await.contains_key(path)
    }

    async fn apply_delay(&self) {
        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        self.apply_delay().await;

        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(EngineError::Upload("injected object store failure".to_string()));
        }

        self.objects.lock().await.insert(path.to_string(), bytes);
        Ok(Self::url_for(path))
    }

    async fn delete(&self, paths: &[String]) -> Result<()> {
        self.apply_delay().await;

        let mut objects = self.objects.lock().await;
        for path in paths {
            if objects.remove(path).is_none() {
                tracing::warn!("Failed to delete object {}: not found", path);
            }
        }

        Ok(())
    }

    fn object_path(&self, public_url: &str) -> Option<String> {
        let prefix = format!("memory://{}/", PHOTO_BUCKET);
        public_url
            .strip_prefix(&prefix)
            .filter(|rest| !rest.is_empty())
            .map(|rest| rest.to_string())
    }
}

/// In-memory record store holding habit and completion rows
#[derive(Default)]
pub struct MemoryRecordStore {
    habits: Mutex<Vec<Habit>>,
    completions: Mutex<Vec<HabitCompletion>>,
    delay: Mutex<Option<Duration>>,
    fail_inserts: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before every operation
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().await = delay;
    }

    /// Make every subsequent insert fail
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Seed a habit row, as if created elsewhere
    pub async fn seed_habit(&self, habit: Habit) {
        self.habits.lock().await.push(habit);
    }

    /// Seed a completion row, as if inserted by another device
    pub async fn seed_completion(&self, completion: HabitCompletion) {
        self.completions.lock().await.push(completion);
    }

    pub async fn completion_count(&self) -> usize {
        self.completions.lock().await.len()
    }

    pub async fn habit_count(&self) -> usize {
        self.habits.lock().await.len()
    }

    async fn apply_delay(&self) {
        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_completion(&self, row: NewHabitCompletion) -> Result<HabitCompletion> {
        self.apply_delay().await;

        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(EngineError::Insert("injected record store failure".to_string()));
        }

        let completion = HabitCompletion {
            id: Uuid::new_v4(),
            habit_id: row.habit_id,
            user_id: row.user_id,
            completed_at: row.completed_at,
            image_url: row.image_url,
            front_image_url: row.front_image_url,
            notes: row.notes,
            created_at: Utc::now(),
        };

        self.completions.lock().await.push(completion.clone());
        Ok(completion)
    }

    async fn completions_for_user(&self, user_id: Uuid) -> Result<Vec<HabitCompletion>> {
        self.apply_delay().await;

        let mut rows: Vec<HabitCompletion> = self
            .completions
            .lock()
            .await
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();

        rows.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(rows)
    }

    async fn habits_for_user(&self, user_id: Uuid) -> Result<Vec<Habit>> {
        self.apply_delay().await;

        Ok(self
            .habits
            .lock()
            .await
            .iter()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_completion(&self, id: Uuid) -> Result<()> {
        self.apply_delay().await;

        self.completions.lock().await.retain(|c| c.id != id);
        Ok(())
    }

    async fn delete_completions_for_habit(&self, habit_id: Uuid) -> Result<()> {
        self.apply_delay().await;

        self.completions.lock().await.retain(|c| c.habit_id != habit_id);
        Ok(())
    }

    async fn delete_habit(&self, id: Uuid) -> Result<()> {
        self.apply_delay().await;

        self.habits.lock().await.retain(|h| h.id != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(user_id: Uuid) -> NewHabitCompletion {
        NewHabitCompletion {
            habit_id: Uuid::new_v4(),
            user_id,
            completed_at: Utc::now(),
            image_url: MemoryObjectStore::url_for("a/b.jpg"),
            front_image_url: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_put_and_delete_objects() {
        let store = MemoryObjectStore::new();

        let url = store.put("a/b.jpg", vec![1, 2, 3], "image/jpeg").await.unwrap();
        assert_eq!(url, MemoryObjectStore::url_for("a/b.jpg"));
        assert!(store.contains("a/b.jpg").await);

        store.delete(&["a/b.jpg".to_string()]).await.unwrap();
        assert_eq!(store.object_count().await, 0);
    }

    #[tokio::test]
    async fn test_object_path_round_trip() {
        let store = MemoryObjectStore::new();
        let url = MemoryObjectStore::url_for("u/ab/cd/abcd.jpg");
        assert_eq!(store.object_path(&url).unwrap(), "u/ab/cd/abcd.jpg");
        assert!(store.object_path("https://elsewhere.com/x.jpg").is_none());
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_filters_by_user() {
        let store = MemoryRecordStore::new();
        let user_id = Uuid::new_v4();

        let inserted = store.insert_completion(sample_row(user_id)).await.unwrap();
        store.insert_completion(sample_row(Uuid::new_v4())).await.unwrap();

        let rows = store.completions_for_user(user_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, inserted.id);
    }

    #[tokio::test]
    async fn test_injected_insert_failure() {
        let store = MemoryRecordStore::new();
        store.set_fail_inserts(true);

        let result = store.insert_completion(sample_row(Uuid::new_v4())).await;
        assert!(matches!(result, Err(EngineError::Insert(_))));
    }
}
