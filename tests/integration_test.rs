//! Integration tests for the snapstreak engine
//!
//! These tests verify end-to-end functionality including:
//! - The upload pipeline from captured photo to inserted record
//! - Reconciliation of completed jobs into the completion cache
//! - Authoritative refresh over optimistic state
//! - Local-first deletion with background remote cleanup

use snapstreak::config::EngineConfig;
use snapstreak::engine::HabitEngine;
use snapstreak::events::EngineEvent;
use snapstreak::models::UploadStatus;
use snapstreak::remote::{MemoryObjectStore, MemoryRecordStore, ObjectStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

struct TestHarness {
    engine: HabitEngine,
    object_store: Arc<MemoryObjectStore>,
    record_store: Arc<MemoryRecordStore>,
    _temp: TempDir,
    photo: PathBuf,
}

fn create_test_engine() -> TestHarness {
    snapstreak::logging::init();

    let temp = TempDir::new().unwrap();
    let photo = temp.path().join("photo.png");
    let img = image::RgbImage::from_pixel(320, 240, image::Rgb([40, 90, 160]));
    image::DynamicImage::ImageRgb8(img).save(&photo).unwrap();

    let object_store = Arc::new(MemoryObjectStore::new());
    let record_store = Arc::new(MemoryRecordStore::new());
    let engine = HabitEngine::new(
        object_store.clone(),
        record_store.clone(),
        EngineConfig::default(),
    );

    TestHarness {
        engine,
        object_store,
        record_store,
        _temp: temp,
        photo,
    }
}

/// Wait for an upload job to reach a terminal status
async fn wait_for_terminal(engine: &HabitEngine, habit_id: Uuid) -> UploadStatus {
    for _ in 0..500 {
        if let Some(job) = engine.upload_job(habit_id).await {
            if job.status != UploadStatus::Uploading {
                return job.status;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("upload job for habit {} never terminated", habit_id);
}

/// Wait for the reconcile loop to surface a habit's stats
async fn wait_for_total(engine: &HabitEngine, habit_id: Uuid, expected: u32) {
    for _ in 0..500 {
        if let Some(stats) = engine.stats(habit_id).await {
            if stats.total_completions == expected {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "stats for habit {} never reached {} completions",
        habit_id, expected
    );
}

#[tokio::test]
async fn test_upload_flow_updates_stats_and_stores() {
    let h = create_test_engine();
    let habit_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    let mut events = h.engine.subscribe();
    h.engine
        .start_upload(habit_id, user_id, h.photo.clone(), None, None)
        .await;

    // The progress stream hits every checkpoint in order
    let mut progress = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for engine events")
            .unwrap();
        match event {
            EngineEvent::UploadProgress { progress: p, .. } => progress.push(p),
            EngineEvent::UploadCompleted { .. } => break,
            EngineEvent::UploadFailed { message, .. } => panic!("upload failed: {}", message),
            _ => {}
        }
    }
    assert_eq!(progress, vec![0, 10, 50, 80, 100]);

    // The photo and the record made it to the remote stores
    assert_eq!(h.object_store.object_count().await, 1);
    assert_eq!(h.record_store.completion_count().await, 1);

    // The reconcile loop merges the completion into the cache once
    wait_for_total(&h.engine, habit_id, 1).await;
    let stats = h.engine.stats(habit_id).await.unwrap();
    assert_eq!(stats.current_streak, 1);
    assert_eq!(stats.total_completions, 1);
}

#[tokio::test]
async fn test_repeated_observation_never_double_counts() {
    let h = create_test_engine();
    let habit_id = Uuid::new_v4();

    h.engine
        .start_upload(habit_id, Uuid::new_v4(), h.photo.clone(), None, None)
        .await;
    assert_eq!(
        wait_for_terminal(&h.engine, habit_id).await,
        UploadStatus::Completed
    );
    wait_for_total(&h.engine, habit_id, 1).await;

    // Consumers re-inspecting the finished job must not re-apply it
    for _ in 0..3 {
        h.engine.reconcile(habit_id).await;
    }

    let stats = h.engine.stats(habit_id).await.unwrap();
    assert_eq!(stats.total_completions, 1);
    assert_eq!(stats.current_streak, 1);
}

#[tokio::test]
async fn test_authoritative_refresh_after_upload_matches_optimistic_view() {
    let h = create_test_engine();
    let habit_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    h.engine
        .start_upload(habit_id, user_id, h.photo.clone(), None, None)
        .await;
    assert_eq!(
        wait_for_terminal(&h.engine, habit_id).await,
        UploadStatus::Completed
    );
    wait_for_total(&h.engine, habit_id, 1).await;
    let optimistic = h.engine.stats(habit_id).await.unwrap();

    h.engine.fetch_authoritative(user_id).await.unwrap();
    let authoritative = h.engine.stats(habit_id).await.unwrap();

    assert_eq!(optimistic, authoritative);
}

#[tokio::test]
async fn test_failed_upload_leaves_cache_untouched() {
    let h = create_test_engine();
    let habit_id = Uuid::new_v4();
    h.record_store.set_fail_inserts(true);

    h.engine
        .start_upload(habit_id, Uuid::new_v4(), h.photo.clone(), None, None)
        .await;
    assert_eq!(
        wait_for_terminal(&h.engine, habit_id).await,
        UploadStatus::Error
    );

    let job = h.engine.upload_job(habit_id).await.unwrap();
    assert_eq!(job.progress, 80);
    assert!(job.error.is_some());
    assert!(h.engine.stats(habit_id).await.is_none());

    // Clearing the failed job is idempotent
    h.engine.clear_upload(habit_id).await;
    h.engine.clear_upload(habit_id).await;
    assert!(h.engine.upload_job(habit_id).await.is_none());
}

#[tokio::test]
async fn test_delete_habit_is_local_first() {
    let h = create_test_engine();
    let user_id = Uuid::new_v4();
    let habit_id = Uuid::new_v4();

    h.record_store
        .seed_habit(snapstreak::models::Habit {
            id: habit_id,
            user_id,
            name: "cold shower".to_string(),
            color: "#0EA5E9".to_string(),
            is_public: true,
            created_at: chrono::Utc::now(),
        })
        .await;

    let url = h
        .object_store
        .put(&format!("{}/proof.jpg", user_id), vec![1, 2, 3], "image/jpeg")
        .await
        .unwrap();
    h.record_store
        .seed_completion(snapstreak::models::HabitCompletion {
            id: Uuid::new_v4(),
            habit_id,
            user_id,
            completed_at: chrono::Utc::now(),
            image_url: url,
            front_image_url: None,
            notes: Some("brrr".to_string()),
            created_at: chrono::Utc::now(),
        })
        .await;

    h.engine.fetch_authoritative(user_id).await.unwrap();
    assert_eq!(h.engine.habits().await.len(), 1);

    // Slow the remote stores down so the ordering is observable
    h.record_store.set_delay(Some(Duration::from_millis(100))).await;
    h.object_store.set_delay(Some(Duration::from_millis(100))).await;

    h.engine.delete_habit(habit_id).await;

    // Gone locally before any remote call resolves
    assert!(h.engine.habits().await.is_empty());
    assert!(h.engine.completions(habit_id).await.is_empty());
    assert_eq!(h.record_store.habit_count().await, 1);

    // The background cleanup eventually drains the remote stores
    for _ in 0..100 {
        if h.record_store.habit_count().await == 0 && h.object_store.object_count().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.record_store.habit_count().await, 0);
    assert_eq!(h.record_store.completion_count().await, 0);
    assert_eq!(h.object_store.object_count().await, 0);
}
