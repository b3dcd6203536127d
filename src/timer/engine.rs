use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{evaluate, round_problems, RoundPhase, RoundStatus};
use crate::{
    clock::ServerClockSync,
    config::TimerConfig,
    domain::{Problem, Round},
    live::{BindingMode, LiveCollection, RefreshHandle},
    repository::RoundRepository,
};

/// Recomputes round status on a fixed tick against the synced server clock.
pub struct RoundTimerEngine {
    clock_sync: Arc<ServerClockSync>,
    rounds: Arc<dyn RoundRepository>,
    config: TimerConfig,
}

impl RoundTimerEngine {
    pub fn new(clock_sync: Arc<ServerClockSync>, rounds: Arc<dyn RoundRepository>, config: TimerConfig) -> Self {
        Self {
            clock_sync,
            rounds,
            config,
        }
    }

    /// One-off status for a round from the given snapshots.
    pub fn status(&self, round_number: i32, rounds: &[Round], problems: &[Problem]) -> RoundStatus {
        let round = rounds.iter().find(|r| r.number == round_number);
        evaluate(round_number, round, problems, self.clock_sync.server_now(), &self.config)
    }

    pub fn watch_round(
        &self,
        round_number: i32,
        rounds: &LiveCollection<Round>,
        problems: &LiveCollection<Problem>,
        cancel: CancellationToken,
    ) -> watch::Receiver<RoundStatus> {
        // Masked problems are not pushed; re-fetch them when the round unlocks.
        let unlock_refresh = (problems.mode() == BindingMode::Manual).then(|| problems.refresh_handle());
        self.watch_snapshots(
            round_number,
            rounds.subscribe(),
            problems.subscribe(),
            unlock_refresh,
            cancel,
        )
    }

    /// Publish a fresh [`RoundStatus`] every tick until cancelled or unobserved.
    ///
    /// `unlock_refresh` is triggered whenever the round leaves [`RoundPhase::Locked`].
    pub fn watch_snapshots(
        &self,
        round_number: i32,
        rounds: watch::Receiver<Vec<Round>>,
        problems: watch::Receiver<Vec<Problem>>,
        unlock_refresh: Option<RefreshHandle>,
        cancel: CancellationToken,
    ) -> watch::Receiver<RoundStatus> {
        let initial = self.status(round_number, &rounds.borrow(), &problems.borrow());
        let (tx, rx) = watch::channel(initial.clone());

        let clock_sync = self.clock_sync.clone();
        let repo = self.rounds.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(config.tick_ms.max(1)));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut last_phase = initial.phase;
            let mut auto_stopped: Option<DateTime<Utc>> = None;
            tracing::debug!("Watching round {} ({})", round_number, last_phase);

            // The masked snapshot may predate an unlock that happened before this watch began.
            let stale_mask = last_phase != RoundPhase::Locked
                && round_problems(round_number, &problems.borrow())
                    .iter()
                    .any(|p| p.is_masked());
            if stale_mask {
                refresh_unlocked(round_number, unlock_refresh.as_ref()).await;
            }

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Round {} watcher stopping", round_number);
                        break;
                    }
                    _ = interval.tick() => {}
                }

                let status = {
                    let rounds = rounds.borrow();
                    let problems = problems.borrow();
                    let round = rounds.iter().find(|r| r.number == round_number);
                    evaluate(round_number, round, &problems, clock_sync.server_now(), &config)
                };

                if status.phase != last_phase {
                    tracing::info!("Round {} is now {} (was {})", round_number, status.phase, last_phase);
                    if last_phase == RoundPhase::Locked {
                        refresh_unlocked(round_number, unlock_refresh.as_ref()).await;
                    }
                    last_phase = status.phase;
                }

                if config.auto_stop_on_expiry && status.phase == RoundPhase::Ended {
                    if let Some(started_at) = status.started_at {
                        if auto_stopped != Some(started_at) {
                            auto_stopped = Some(started_at);
                            match repo.stop_timer(round_number).await {
                                Ok(_) => tracing::info!("Round {} timer flag cleared after expiry", round_number),
                                Err(e) => tracing::warn!("Round {} auto-stop failed: {}", round_number, e),
                            }
                        }
                    }
                }

                if tx.send(status).is_err() {
                    tracing::debug!("Round {} status has no watchers left", round_number);
                    break;
                }
            }
        });

        rx
    }
}

async fn refresh_unlocked(round_number: i32, refresher: Option<&RefreshHandle>) {
    let Some(refresher) = refresher else {
        return;
    };
    match refresher.refresh().await {
        Ok(()) => tracing::debug!("Round {} unlocked, {} re-fetched", round_number, refresher.collection()),
        Err(e) => tracing::warn!("Round {} unlocked but re-fetching {} failed: {}", round_number, refresher.collection(), e),
    }
}
