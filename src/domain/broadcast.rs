use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
    /// Also the fallback for unknown types stored by other clients.
    #[default]
    #[serde(other)]
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Broadcast {
    pub id: Uuid,
    pub message: String,
    #[serde(rename = "type", default)]
    pub severity: Severity,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Broadcast {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Shown while younger than `window`; the active flag does not extend it.
    pub fn within_window(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.age(now) < window
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewBroadcast {
    #[validate(length(min = 1, max = 500))]
    pub message: String,
    #[serde(rename = "type")]
    pub severity: Severity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_severity_reads_known_and_unknown_types() {
        let row = json!({
            "id": Uuid::new_v4(),
            "message": "Clarification posted",
            "type": "warning",
            "is_active": true,
            "created_at": "2026-03-14T09:00:00Z"
        });
        let broadcast: Broadcast = serde_json::from_value(row).unwrap();
        assert_eq!(broadcast.severity, Severity::Warning);

        let unknown: Severity = serde_json::from_value(json!("announcement")).unwrap();
        assert_eq!(unknown, Severity::Info);
        assert_eq!(serde_json::to_value(Severity::Error).unwrap(), json!("error"));
        assert_eq!(Severity::default(), Severity::Info);
    }

    #[test]
    fn test_window_is_exclusive() {
        let created_at = DateTime::parse_from_rfc3339("2026-03-14T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let broadcast = Broadcast {
            id: Uuid::new_v4(),
            message: "Lunch".to_string(),
            severity: Severity::Success,
            is_active: true,
            created_at,
        };
        let window = Duration::seconds(120);
        assert!(broadcast.within_window(created_at + Duration::seconds(119), window));
        assert!(!broadcast.within_window(created_at + Duration::seconds(120), window));
    }
}
