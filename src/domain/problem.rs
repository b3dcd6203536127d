use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Problem {
    pub id: Uuid,
    pub round_number: i32,
    #[serde(rename = "problem_code")]
    pub code: String,
    pub title: String,
    /// `None` in the masked projection while the owning round is locked.
    #[serde(default)]
    pub statement: Option<String>,
    #[serde(default)]
    pub guidance: Option<String>,
    pub sort_order: i32,
    #[serde(default)]
    pub individual_time_limit_seconds: Option<i64>,
    #[serde(default)]
    pub points: Option<i32>,
}

impl Problem {
    pub fn time_limit_seconds(&self, default_seconds: i64) -> i64 {
        self.individual_time_limit_seconds.unwrap_or(default_seconds)
    }

    pub fn is_masked(&self) -> bool {
        self.statement.is_none()
    }
}

/// Which projection of the `problems` collection to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemView {
    Full,
    /// Server-side projection with content withheld until the round unlocks.
    Masked,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewProblem {
    #[validate(range(min = 1))]
    pub round_number: i32,
    #[serde(rename = "problem_code")]
    #[validate(length(min = 1, max = 16))]
    pub code: String,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub statement: String,
    pub guidance: Option<String>,
    pub sort_order: i32,
    #[validate(range(min = 1))]
    pub individual_time_limit_seconds: Option<i64>,
    #[validate(range(min = 0))]
    pub points: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Validate)]
pub struct ProblemUpdate {
    #[serde(rename = "problem_code", skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 16))]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub individual_time_limit_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0))]
    pub points: Option<i32>,
}

/// Order problems the way every view shows them.
pub fn sort_problems(problems: &mut [Problem]) {
    problems.sort_by_key(|p| p.sort_order);
}
