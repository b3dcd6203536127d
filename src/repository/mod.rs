use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::backend::Row;
use crate::domain::*;
use crate::error::Result;

pub mod round_repository;
pub mod problem_repository;
pub mod hint_repository;
pub mod broadcast_repository;
pub mod team_repository;
pub mod admin_repository;

pub use round_repository::StoreRoundRepository;
pub use problem_repository::StoreProblemRepository;
pub use hint_repository::StoreHintRepository;
pub use broadcast_repository::StoreBroadcastRepository;
pub use team_repository::StoreTeamRepository;
pub use admin_repository::StoreAdminAccountRepository;

#[async_trait]
pub trait RoundRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Round>>;
    async fn find(&self, number: i32) -> Result<Option<Round>>;
    async fn set_unlocked(&self, number: i32, unlocked: bool) -> Result<Round>;
    async fn start_timer(&self, number: i32, started_at: DateTime<Utc>) -> Result<Round>;
    async fn stop_timer(&self, number: i32) -> Result<Round>;
    async fn set_duration(&self, number: i32, minutes: i64) -> Result<Round>;
    async fn set_links(&self, number: i32, links: RoundLinks) -> Result<Round>;
}

#[async_trait]
pub trait ProblemRepository: Send + Sync {
    async fn list(&self, round_number: Option<i32>, view: ProblemView) -> Result<Vec<Problem>>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Problem>>;
    async fn create(&self, problem: NewProblem) -> Result<Problem>;
    async fn update(&self, id: Uuid, update: ProblemUpdate) -> Result<Problem>;
    async fn delete(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait HintRepository: Send + Sync {
    async fn list(&self, problem_id: Option<Uuid>) -> Result<Vec<Hint>>;
    async fn create(&self, hint: NewHint) -> Result<Hint>;
    async fn update(&self, id: Uuid, update: HintUpdate) -> Result<Hint>;
    async fn delete(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait BroadcastRepository: Send + Sync {
    async fn list_active(&self, limit: usize) -> Result<Vec<Broadcast>>;
    async fn list_recent(&self, limit: usize) -> Result<Vec<Broadcast>>;
    async fn create(&self, broadcast: NewBroadcast) -> Result<Broadcast>;
    async fn deactivate(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait TeamRepository: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<Team>>;
    async fn find_by_session_token(&self, token: &str) -> Result<Option<Team>>;
    async fn create(&self, name: &str) -> Result<Team>;
}

#[async_trait]
pub trait AdminAccountRepository: Send + Sync {
    async fn find_account(&self) -> Result<Option<AdminAccount>>;
    async fn record_failure(&self, failed_attempts: u32, locked_until: Option<DateTime<Utc>>) -> Result<()>;
    async fn reset_failures(&self) -> Result<()>;
    async fn set_password_hash(&self, password_hash: &str) -> Result<()>;
}

/// Decode one raw row into a record.
pub(crate) fn decode<T: DeserializeOwned>(row: Row) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

/// Decode every row, skipping (and logging) rows that do not fit the record.
pub(crate) fn decode_all<T: DeserializeOwned>(rows: Vec<Row>, what: &str) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match decode::<T>(row) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping malformed {} row: {}", what, e);
                None
            }
        })
        .collect()
}
