use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoundKind {
    /// All problems visible at once for a single overall duration.
    #[default]
    Standard,
    /// Problems advance automatically on a shared clock, one at a time.
    Sequential,
}

/// Timer half of a round record. A running timer always carries its start stamp;
/// the repository degrades `timer_active` without a stamp to `Stopped`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TimerState {
    #[default]
    Stopped,
    Running { started_at: DateTime<Utc> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub number: i32,
    pub title: String,
    pub kind: RoundKind,
    pub is_unlocked: bool,
    pub timer: TimerState,
    pub duration_minutes: Option<i64>,
    pub external_judge_url: Option<String>,
    pub scoreboard_url: Option<String>,
}

impl Round {
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self.timer {
            TimerState::Running { started_at } => Some(started_at),
            TimerState::Stopped => None,
        }
    }

    pub fn is_timer_active(&self) -> bool {
        matches!(self.timer, TimerState::Running { .. })
    }

    pub fn is_sequential(&self) -> bool {
        self.kind == RoundKind::Sequential
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoundLinks {
    pub external_judge_url: Option<String>,
    pub scoreboard_url: Option<String>,
}
