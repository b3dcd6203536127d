use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hint {
    pub id: Uuid,
    pub problem_id: Uuid,
    pub content: String,
    /// 0 means visible immediately, even before the round timer starts.
    pub unlock_after_minutes: i64,
    pub sort_order: i32,
}

impl Hint {
    /// `elapsed` is the time since the round timer started, `None` when it has not.
    pub fn is_visible(&self, elapsed: Option<Duration>) -> bool {
        if self.unlock_after_minutes <= 0 {
            return true;
        }

        match elapsed {
            Some(elapsed) => Duration::try_minutes(self.unlock_after_minutes)
                .is_some_and(|threshold| elapsed >= threshold),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewHint {
    pub problem_id: Uuid,
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
    #[validate(range(min = 0))]
    pub unlock_after_minutes: i64,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Validate)]
pub struct HintUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 2000))]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0))]
    pub unlock_after_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i32>,
}
