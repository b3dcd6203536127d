use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    backend::{Collection, Filter, Query, Row, RowStore},
    domain::{Round, RoundKind, RoundLinks, TimerState},
    error::{AppError, Result},
    repository::{decode, RoundRepository},
};

#[derive(Deserialize)]
struct RoundRow {
    round_number: i32,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    round_type: Option<String>,
    #[serde(default)]
    is_unlocked: bool,
    #[serde(default)]
    timer_active: bool,
    #[serde(default)]
    timer_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    duration_minutes: Option<i64>,
    #[serde(default)]
    vjudge_url: Option<String>,
    #[serde(default)]
    scoreboard_url: Option<String>,
}

impl TryFrom<RoundRow> for Round {
    type Error = AppError;

    fn try_from(row: RoundRow) -> Result<Self> {
        if row.round_number < 1 {
            return Err(AppError::InvalidRecord(format!("round number {}", row.round_number)));
        }
        if let Some(minutes) = row.duration_minutes {
            if minutes < 0 {
                return Err(AppError::InvalidRecord(format!(
                    "round {} has negative duration {}",
                    row.round_number, minutes
                )));
            }
        }

        let kind = match row.round_type.as_deref() {
            Some("sequential") => RoundKind::Sequential,
            Some("standard") | None => RoundKind::Standard,
            Some(other) => {
                tracing::warn!("Round {} has unknown type '{}', treating as standard", row.round_number, other);
                RoundKind::Standard
            }
        };

        let timer = match (row.timer_active, row.timer_started_at) {
            (true, Some(started_at)) => TimerState::Running { started_at },
            (true, None) => {
                tracing::warn!("Round {} timer active without a start time", row.round_number);
                TimerState::Stopped
            }
            (false, _) => TimerState::Stopped,
        };

        Ok(Round {
            number: row.round_number,
            title: row.title.unwrap_or_else(|| format!("Round {}", row.round_number)),
            kind,
            is_unlocked: row.is_unlocked,
            timer,
            duration_minutes: row.duration_minutes,
            external_judge_url: row.vjudge_url.filter(|u| !u.is_empty()),
            scoreboard_url: row.scoreboard_url.filter(|u| !u.is_empty()),
        })
    }
}

pub struct StoreRoundRepository {
    rows: Arc<dyn RowStore>,
}

impl StoreRoundRepository {
    pub fn new(rows: Arc<dyn RowStore>) -> Self {
        Self { rows }
    }

    fn row_to_round(row: Row) -> Result<Round> {
        let raw: RoundRow = decode(row)?;
        Round::try_from(raw)
    }

    async fn patch(&self, number: i32, patch: Value) -> Result<Round> {
        let patch = match patch {
            Value::Object(map) => map,
            _ => return Err(AppError::Internal("round patch must be an object".to_string())),
        };

        let updated = self
            .rows
            .update(Collection::Rounds, &[Filter::eq("round_number", number)], patch)
            .await?;

        match updated.into_iter().next() {
            Some(row) => Self::row_to_round(row),
            None => Err(AppError::NotFound(format!("Round {}", number))),
        }
    }
}

#[async_trait]
impl RoundRepository for StoreRoundRepository {
    async fn list(&self) -> Result<Vec<Round>> {
        let rows = self
            .rows
            .select(Collection::Rounds, &Query::new().order_by("round_number", true))
            .await?;

        let mut rounds = Vec::with_capacity(rows.len());
        for row in rows {
            match Self::row_to_round(row) {
                Ok(round) => rounds.push(round),
                Err(e) => tracing::warn!("Skipping malformed round row: {}", e),
            }
        }
        Ok(rounds)
    }

    async fn find(&self, number: i32) -> Result<Option<Round>> {
        let rows = self
            .rows
            .select(Collection::Rounds, &Query::new().eq("round_number", number).limit(1))
            .await?;

        rows.into_iter().next().map(Self::row_to_round).transpose()
    }

    async fn set_unlocked(&self, number: i32, unlocked: bool) -> Result<Round> {
        self.patch(number, json!({ "is_unlocked": unlocked })).await
    }

    async fn start_timer(&self, number: i32, started_at: DateTime<Utc>) -> Result<Round> {
        self.patch(number, json!({ "timer_active": true, "timer_started_at": started_at }))
            .await
    }

    async fn stop_timer(&self, number: i32) -> Result<Round> {
        self.patch(number, json!({ "timer_active": false, "timer_started_at": null }))
            .await
    }

    async fn set_duration(&self, number: i32, minutes: i64) -> Result<Round> {
        if minutes < 1 {
            return Err(AppError::Validation(format!("duration must be positive, got {}", minutes)));
        }
        self.patch(number, json!({ "duration_minutes": minutes })).await
    }

    async fn set_links(&self, number: i32, links: RoundLinks) -> Result<Round> {
        self.patch(
            number,
            json!({ "vjudge_url": links.external_judge_url, "scoreboard_url": links.scoreboard_url }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(value: Value) -> RoundRow {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_active_timer_without_stamp_degrades_to_stopped() {
        let round = Round::try_from(raw(json!({
            "round_number": 2,
            "is_unlocked": true,
            "timer_active": true,
            "timer_started_at": null
        })))
        .unwrap();
        assert_eq!(round.timer, TimerState::Stopped);
    }

    #[test]
    fn test_stale_stamp_ignored_when_stopped() {
        let round = Round::try_from(raw(json!({
            "round_number": 1,
            "timer_active": false,
            "timer_started_at": "2026-03-01T10:00:00Z"
        })))
        .unwrap();
        assert!(!round.is_timer_active());
        assert_eq!(round.title, "Round 1");
    }

    #[test]
    fn test_sequential_kind_and_links() {
        let round = Round::try_from(raw(json!({
            "round_number": 3,
            "round_type": "sequential",
            "timer_active": true,
            "timer_started_at": "2026-03-01T10:00:00Z",
            "vjudge_url": "https://vjudge.net/contest/1",
            "scoreboard_url": ""
        })))
        .unwrap();
        assert!(round.is_sequential());
        assert!(round.started_at().is_some());
        assert_eq!(round.external_judge_url.as_deref(), Some("https://vjudge.net/contest/1"));
        assert!(round.scoreboard_url.is_none());
    }

    #[test]
    fn test_negative_duration_rejected() {
        let result = Round::try_from(raw(json!({ "round_number": 1, "duration_minutes": -5 })));
        assert!(matches!(result, Err(AppError::InvalidRecord(_))));
    }
}
