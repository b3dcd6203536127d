use std::sync::Arc;

use crate::{
    auth::AdminAuthGuard,
    clock::ServerClockSync,
    domain::{Round, RoundLinks},
    error::{AppError, Result},
    repository::RoundRepository,
};

/// Admin operations on rounds. Every call requires a live admin session.
pub struct RoundControlService {
    admin: Arc<AdminAuthGuard>,
    rounds: Arc<dyn RoundRepository>,
    clock_sync: Arc<ServerClockSync>,
}

impl RoundControlService {
    pub fn new(
        admin: Arc<AdminAuthGuard>,
        rounds: Arc<dyn RoundRepository>,
        clock_sync: Arc<ServerClockSync>,
    ) -> Self {
        Self {
            admin,
            rounds,
            clock_sync,
        }
    }

    fn authorize(&self) -> Result<()> {
        if !self.admin.verify() {
            return Err(AppError::Unauthorized);
        }
        self.admin.touch_activity();
        Ok(())
    }

    pub async fn set_unlocked(&self, number: i32, unlocked: bool) -> Result<Round> {
        self.authorize()?;
        let round = self.rounds.set_unlocked(number, unlocked).await?;
        tracing::info!(
            "Round {} {}",
            number,
            if unlocked { "unlocked" } else { "locked" }
        );
        Ok(round)
    }

    /// Start the countdown, stamped with server time so every client agrees.
    pub async fn start_timer(&self, number: i32) -> Result<Round> {
        self.authorize()?;
        let started_at = self.clock_sync.server_now();
        let round = self.rounds.start_timer(number, started_at).await?;
        tracing::info!("Round {} timer started at {}", number, started_at);
        Ok(round)
    }

    pub async fn stop_timer(&self, number: i32) -> Result<Round> {
        self.authorize()?;
        let round = self.rounds.stop_timer(number).await?;
        tracing::info!("Round {} timer stopped", number);
        Ok(round)
    }

    pub async fn set_duration(&self, number: i32, minutes: i64) -> Result<Round> {
        self.authorize()?;
        self.rounds.set_duration(number, minutes).await
    }

    pub async fn set_links(&self, number: i32, links: RoundLinks) -> Result<Round> {
        self.authorize()?;
        self.rounds.set_links(number, links).await
    }
}
