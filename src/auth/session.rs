use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::{minutes_or_max, token_fingerprint, AuthError, SessionStorage};
use crate::{
    backend::RemoteProcedures,
    clock::Clock,
    config::SessionConfig,
    domain::Team,
    error::AppError,
    repository::TeamRepository,
};

pub const SESSION_KEY: &str = "codeverse_session_id";
pub const LAST_ACTIVITY_KEY: &str = "codeverse_last_activity";

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Authenticated(Team),
    Expired,
    LoggedOut,
}

impl SessionState {
    pub fn team(&self) -> Option<&Team> {
        match self {
            SessionState::Authenticated(team) => Some(team),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }
}

/// Result of re-establishing a session from tab storage.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    Authenticated(Team),
    Anonymous,
    /// The lookup failed transiently; the stored token was kept for a later retry.
    Unknown,
}

/// Contestant session held in tab-scoped storage.
pub struct SessionStore {
    teams: Arc<dyn TeamRepository>,
    rpc: Arc<dyn RemoteProcedures>,
    storage: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    state: Mutex<SessionState>,
}

impl SessionStore {
    pub fn new(
        teams: Arc<dyn TeamRepository>,
        rpc: Arc<dyn RemoteProcedures>,
        storage: Arc<dyn SessionStorage>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        Self {
            teams,
            rpc,
            storage,
            clock,
            config,
            state: Mutex::new(SessionState::Anonymous),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn team(&self) -> Option<Team> {
        self.state().team().cloned()
    }

    pub fn token(&self) -> Option<String> {
        self.storage.get(SESSION_KEY)
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = next;
    }

    fn persist(&self, team: &Team) {
        self.storage.set(SESSION_KEY, &team.session_token);
        self.storage.set(LAST_ACTIVITY_KEY, &self.clock.now().to_rfc3339());
        self.set_state(SessionState::Authenticated(team.clone()));
        tracing::info!(
            "Team session established: {} ({})",
            team.name,
            token_fingerprint(&team.session_token)
        );
    }

    fn clear_storage(&self) {
        self.storage.remove(SESSION_KEY);
        self.storage.remove(LAST_ACTIVITY_KEY);
    }

    fn last_activity(&self) -> Option<DateTime<Utc>> {
        let stamp = self.storage.get(LAST_ACTIVITY_KEY)?;
        DateTime::parse_from_rfc3339(&stamp)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Team, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials(
                "Username and password are required".to_string(),
            ));
        }

        let previous = self.state();
        self.set_state(SessionState::Authenticating);

        let check = match self.rpc.verify_team_credentials(username, password).await {
            Ok(check) => check,
            Err(e) => {
                tracing::warn!("Team credential check failed: {}", e);
                self.set_state(previous);
                return Err(AuthError::from(e));
            }
        };

        match check.team {
            Some(team) if check.success => {
                self.persist(&team);
                Ok(team)
            }
            _ => {
                self.set_state(previous);
                Err(AuthError::InvalidCredentials(
                    check
                        .error
                        .unwrap_or_else(|| "Invalid username or password".to_string()),
                ))
            }
        }
    }

    /// Join by team name: adopt the existing row or create one.
    pub async fn join_team(&self, name: &str) -> Result<Team, AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::Rejected("Team name is required".to_string()));
        }

        let previous = self.state();
        self.set_state(SessionState::Authenticating);

        let result = self.find_or_create(name).await;
        match result {
            Ok(team) => {
                self.persist(&team);
                Ok(team)
            }
            Err(e) => {
                tracing::warn!("Joining team '{}' failed: {}", name, e);
                self.set_state(previous);
                Err(AuthError::from(e))
            }
        }
    }

    async fn find_or_create(&self, name: &str) -> Result<Team, AppError> {
        if let Some(existing) = self.teams.find_by_name(name).await? {
            tracing::debug!("Rejoining existing team {}", existing.name);
            return Ok(existing);
        }

        match self.teams.create(name).await {
            Ok(team) => Ok(team),
            Err(AppError::Conflict(_)) => {
                tracing::debug!("Team '{}' created concurrently, adopting it", name);
                self.teams
                    .find_by_name(name)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Team {}", name)))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn restore_session(&self) -> RestoreOutcome {
        let token = match self.token() {
            Some(token) => token,
            None => {
                if self.state().is_authenticated() {
                    self.set_state(SessionState::Anonymous);
                }
                return RestoreOutcome::Anonymous;
            }
        };

        let inactive_limit = minutes_or_max(self.config.inactivity_minutes);
        let fresh = self
            .last_activity()
            .is_some_and(|last| self.clock.now() - last <= inactive_limit);
        if !fresh {
            tracing::info!("Team session {} expired after inactivity", token_fingerprint(&token));
            self.clear_storage();
            self.set_state(SessionState::Expired);
            return RestoreOutcome::Anonymous;
        }

        match self.teams.find_by_session_token(&token).await {
            Ok(Some(team)) => {
                self.set_state(SessionState::Authenticated(team.clone()));
                RestoreOutcome::Authenticated(team)
            }
            Ok(None) => {
                tracing::info!("Team session {} no longer exists", token_fingerprint(&token));
                self.clear_storage();
                self.set_state(SessionState::Anonymous);
                RestoreOutcome::Anonymous
            }
            Err(e) => {
                tracing::warn!(
                    "Could not restore team session {}, keeping token: {}",
                    token_fingerprint(&token),
                    e
                );
                RestoreOutcome::Unknown
            }
        }
    }

    /// Record user interaction; no-op without a stored token.
    pub fn touch_activity(&self) {
        if self.token().is_some() {
            self.storage.set(LAST_ACTIVITY_KEY, &self.clock.now().to_rfc3339());
        }
    }

    pub fn logout(&self) {
        self.clear_storage();
        self.set_state(SessionState::LoggedOut);
        tracing::info!("Team logged out");
    }
}
