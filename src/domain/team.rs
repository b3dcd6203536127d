use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    /// Login name for imported teams; teams that joined by name have none.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "session_id")]
    pub session_token: String,
    pub created_at: DateTime<Utc>,
}

/// Response of the `verify_team_credentials` procedure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialCheck {
    pub success: bool,
    #[serde(default)]
    pub team: Option<Team>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of the `insert_team_with_password` procedure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportOutcome {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}
