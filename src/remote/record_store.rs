//! Remote record store
//!
//! CRUD operations for habit and completion rows against a PostgREST-style
//! REST API. This is the authoritative store that `fetch_authoritative`
//! reads from.

use crate::config::{COMPLETIONS_TABLE, HABITS_TABLE};
use crate::error::{EngineError, Result};
use crate::models::{Habit, HabitCompletion, NewHabitCompletion};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use uuid::Uuid;

const HTTP_TIMEOUT_SECS: u64 = 30;

/// Contract the engine needs from the relational store
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a completion row, returning it with server-assigned fields
    async fn insert_completion(&self, row: NewHabitCompletion) -> Result<HabitCompletion>;

    /// All completions for a user, most recent first
    async fn completions_for_user(&self, user_id: Uuid) -> Result<Vec<HabitCompletion>>;

    /// All habits owned by a user
    async fn habits_for_user(&self, user_id: Uuid) -> Result<Vec<Habit>>;

    async fn delete_completion(&self, id: Uuid) -> Result<()>;

    async fn delete_completions_for_habit(&self, habit_id: Uuid) -> Result<()>;

    async fn delete_habit(&self, id: Uuid) -> Result<()>;
}

/// PostgREST-style record store client
#[derive(Clone)]
pub struct HttpRecordStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpRecordStore {
    /// Create a client for `base_url` (e.g. "https://x.example.com/rest/v1")
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    fn check_status(status: StatusCode, context: &str, body: &str) -> Result<()> {
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(EngineError::NotAuthenticated)
            }
            s => Err(EngineError::Generic(format!(
                "record store {} returned {}: {}",
                context, s, body
            ))),
        }
    }

    async fn delete_where(&self, table: &str, column: &str, id: Uuid) -> Result<()> {
        let response = self
            .http
            .delete(self.table_url(table))
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .query(&[(column, format!("eq.{}", id))])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Self::check_status(status, "delete", &body)?;

        tracing::debug!("Deleted {} rows where {} = {}", table, column, id);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn insert_completion(&self, row: NewHabitCompletion) -> Result<HabitCompletion> {
        let response = self
            .http
            .post(self.table_url(COMPLETIONS_TABLE))
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match status {
            s if s.is_success() => {
                // PostgREST returns the inserted rows as an array
                let mut rows: Vec<HabitCompletion> = serde_json::from_str(&body)?;
                rows.pop().ok_or_else(|| {
                    EngineError::Insert("insert returned no rows".to_string())
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(EngineError::NotAuthenticated)
            }
            s => Err(EngineError::Insert(format!(
                "record store returned {}: {}",
                s, body
            ))),
        }
    }

    async fn completions_for_user(&self, user_id: Uuid) -> Result<Vec<HabitCompletion>> {
        let response = self
            .http
            .get(self.table_url(COMPLETIONS_TABLE))
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .query(&[
                ("user_id", format!("eq.{}", user_id)),
                ("order", "completed_at.desc".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Self::check_status(status, "select", &body)?;

        Ok(serde_json::from_str(&body)?)
    }

    async fn habits_for_user(&self, user_id: Uuid) -> Result<Vec<Habit>> {
        let response = self
            .http
            .get(self.table_url(HABITS_TABLE))
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .query(&[
                ("user_id", format!("eq.{}", user_id)),
                ("order", "created_at.desc".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Self::check_status(status, "select", &body)?;

        Ok(serde_json::from_str(&body)?)
    }

    async fn delete_completion(&self, id: Uuid) -> Result<()> {
        self.delete_where(COMPLETIONS_TABLE, "id", id).await
    }

    async fn delete_completions_for_habit(&self, habit_id: Uuid) -> Result<()> {
        self.delete_where(COMPLETIONS_TABLE, "habit_id", habit_id).await
    }

    async fn delete_habit(&self, id: Uuid) -> Result<()> {
        self.delete_where(HABITS_TABLE, "id", id).await
    }
}
