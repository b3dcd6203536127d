use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{hash_password, minutes_or_max, verify_password, SessionStorage};
use crate::{
    clock::Clock,
    config::AdminConfig,
    error::{AppError, Result},
    repository::AdminAccountRepository,
};

pub const ADMIN_ACTIVITY_KEY: &str = "admin_last_activity";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminState {
    LoggedOut,
    Checking,
    LoggedIn,
    Locked { until: DateTime<Utc> },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdminLoginError {
    #[error("Invalid password. {attempts_remaining} attempt(s) remaining")]
    InvalidPassword { attempts_remaining: u32 },

    #[error("Account locked. Try again in {minutes} minute(s)")]
    Locked { minutes: i64 },

    /// Anything else, including an unconfigured account or an unreachable backend.
    #[error("Authentication failed")]
    Failed,
}

/// Privileged session with lockout after repeated failures.
///
/// Sessions expire after `admin.inactivity_minutes` without a call to
/// [`AdminAuthGuard::touch_activity`]. A fresh activity stamp left in storage
/// by an earlier guard logs the new one straight in.
pub struct AdminAuthGuard {
    accounts: Arc<dyn AdminAccountRepository>,
    storage: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock>,
    config: AdminConfig,
    state: Mutex<AdminState>,
}

impl AdminAuthGuard {
    pub fn new(
        accounts: Arc<dyn AdminAccountRepository>,
        storage: Arc<dyn SessionStorage>,
        clock: Arc<dyn Clock>,
        config: AdminConfig,
    ) -> Self {
        let guard = Self {
            accounts,
            storage,
            clock,
            config,
            state: Mutex::new(AdminState::LoggedOut),
        };
        guard.restore();
        guard
    }

    /// Resume a session from the stored activity stamp, clearing it once stale.
    pub fn restore(&self) -> bool {
        let last = match self.last_activity() {
            Some(last) => last,
            None => return false,
        };

        if self.within_inactivity(last) {
            self.set_state(AdminState::LoggedIn);
            tracing::info!("Admin session restored");
            true
        } else {
            tracing::info!("Stored admin session expired after inactivity");
            self.logout();
            false
        }
    }

    fn within_inactivity(&self, last: DateTime<Utc>) -> bool {
        self.clock.now() - last <= minutes_or_max(self.config.inactivity_minutes)
    }

    pub fn state(&self) -> AdminState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, next: AdminState) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = next;
    }

    fn fail(&self, reason: &str) -> AdminLoginError {
        tracing::warn!("Admin login failed: {}", reason);
        self.set_state(AdminState::LoggedOut);
        AdminLoginError::Failed
    }

    pub async fn login(&self, password: &str) -> std::result::Result<(), AdminLoginError> {
        self.set_state(AdminState::Checking);

        let account = match self.accounts.find_account().await {
            Ok(Some(account)) => account,
            Ok(None) => return Err(self.fail("admin account is not configured")),
            Err(e) => return Err(self.fail(&e.to_string())),
        };

        let now = self.clock.now();
        if let Some(until) = account.locked_until.filter(|_| account.is_locked(now)) {
            let minutes = account.lock_remaining_minutes(now);
            tracing::warn!("Admin login rejected, locked for {} more minute(s)", minutes);
            self.set_state(AdminState::Locked { until });
            return Err(AdminLoginError::Locked { minutes });
        }

        let hash = match account.password_hash.as_deref() {
            Some(hash) if !hash.is_empty() => hash,
            _ => return Err(self.fail("admin password is not set")),
        };

        let matches = match verify_password(password, hash) {
            Ok(matches) => matches,
            Err(e) => return Err(self.fail(&e.to_string())),
        };

        if matches {
            if account.failed_attempts > 0 || account.locked_until.is_some() {
                if let Err(e) = self.accounts.reset_failures().await {
                    return Err(self.fail(&e.to_string()));
                }
            }
            self.storage.set(ADMIN_ACTIVITY_KEY, &now.to_rfc3339());
            self.set_state(AdminState::LoggedIn);
            tracing::info!("Admin logged in");
            return Ok(());
        }

        let attempts = account.effective_failed_attempts(now) + 1;
        if attempts >= self.config.max_failed_attempts {
            let until = now
                .checked_add_signed(minutes_or_max(self.config.lockout_minutes))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            if let Err(e) = self.accounts.record_failure(attempts, Some(until)).await {
                return Err(self.fail(&e.to_string()));
            }
            tracing::warn!("Admin account locked after {} failed attempts", attempts);
            self.set_state(AdminState::Locked { until });
            return Err(AdminLoginError::Locked {
                minutes: self.config.lockout_minutes,
            });
        }

        if let Err(e) = self.accounts.record_failure(attempts, None).await {
            return Err(self.fail(&e.to_string()));
        }
        self.set_state(AdminState::LoggedOut);
        Err(AdminLoginError::InvalidPassword {
            attempts_remaining: self.config.max_failed_attempts - attempts,
        })
    }

    fn last_activity(&self) -> Option<DateTime<Utc>> {
        let stamp = self.storage.get(ADMIN_ACTIVITY_KEY)?;
        DateTime::parse_from_rfc3339(&stamp)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    /// True while a logged-in session has seen activity within the inactivity window.
    pub fn verify(&self) -> bool {
        let now = self.clock.now();
        match self.state() {
            AdminState::LoggedIn => {
                let live = self.last_activity().is_some_and(|last| self.within_inactivity(last));
                if !live {
                    tracing::info!("Admin session expired after inactivity");
                    self.logout();
                }
                live
            }
            AdminState::Locked { until } if until <= now => {
                self.set_state(AdminState::LoggedOut);
                false
            }
            _ => false,
        }
    }

    /// State-only check; does not evaluate inactivity.
    pub fn is_authenticated(&self) -> bool {
        self.state() == AdminState::LoggedIn
    }

    pub fn touch_activity(&self) {
        if self.verify() {
            self.storage.set(ADMIN_ACTIVITY_KEY, &self.clock.now().to_rfc3339());
        }
    }

    pub fn logout(&self) {
        self.storage.remove(ADMIN_ACTIVITY_KEY);
        self.set_state(AdminState::LoggedOut);
    }

    /// Store a new admin password and clear any lockout.
    pub async fn set_password(&self, new_password: &str) -> Result<()> {
        if new_password.chars().count() < 8 {
            return Err(AppError::Validation(
                "admin password must be at least 8 characters".to_string(),
            ));
        }

        let hash = hash_password(new_password)?;
        self.accounts.set_password_hash(&hash).await?;
        tracing::info!("Admin password updated");
        Ok(())
    }
}
