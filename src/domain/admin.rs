use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `setting_key` of the singleton row holding the admin credentials.
pub const ADMIN_ACCOUNT_KEY: &str = "admin_account";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AdminAccount {
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub failed_attempts: u32,
    #[serde(default)]
    pub locked_until: Option<DateTime<Utc>>,
}

impl AdminAccount {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    /// Whole minutes left on the lockout, rounded up.
    pub fn lock_remaining_minutes(&self, now: DateTime<Utc>) -> i64 {
        match self.locked_until {
            Some(until) if until > now => {
                let millis = (until - now).num_milliseconds();
                (millis + 59_999) / 60_000
            }
            _ => 0,
        }
    }

    /// Failed attempts that still count; an expired lockout starts a fresh window.
    pub fn effective_failed_attempts(&self, now: DateTime<Utc>) -> u32 {
        match self.locked_until {
            Some(until) if until <= now => 0,
            _ => self.failed_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_lock_remaining_rounds_up() {
        let now = Utc::now();
        let account = AdminAccount {
            password_hash: None,
            failed_attempts: 5,
            locked_until: Some(now + Duration::seconds(61)),
        };
        assert!(account.is_locked(now));
        assert_eq!(account.lock_remaining_minutes(now), 2);
    }

    #[test]
    fn test_expired_lock_resets_attempt_window() {
        let now = Utc::now();
        let account = AdminAccount {
            password_hash: None,
            failed_attempts: 5,
            locked_until: Some(now - Duration::seconds(1)),
        };
        assert!(!account.is_locked(now));
        assert_eq!(account.effective_failed_attempts(now), 0);
    }
}
