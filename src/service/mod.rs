pub mod broadcast_service;
pub mod content_service;
pub mod round_control;
pub mod team_import;

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::{AdminAuthGuard, RestoreOutcome, SessionStorage, SessionStore};
use crate::backend::Backend;
use crate::clock::{Clock, ServerClockSync};
use crate::config::Settings;
use crate::domain::{Broadcast, Hint, Problem, ProblemView, Round};
use crate::error::{AppError, Result};
use crate::live::{
    BindingMode, BroadcastsSource, HintsSource, LiveCollection, PageVisibility, ProblemsSource,
    RoundsSource,
};
use crate::repository::*;
use crate::timer::{RoundStatus, RoundTimerEngine};

pub use broadcast_service::{BroadcastFeed, BroadcastService};
pub use content_service::ContentService;
pub use round_control::RoundControlService;
pub use team_import::{import_teams, ImportReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Init,
    Active,
    Disposed,
}

/// Everything one portal client needs, built once and passed by reference.
pub struct PortalContext {
    pub settings: Settings,
    pub backend: Backend,
    pub round_repo: Arc<dyn RoundRepository>,
    pub problem_repo: Arc<dyn ProblemRepository>,
    pub hint_repo: Arc<dyn HintRepository>,
    pub broadcast_repo: Arc<dyn BroadcastRepository>,
    pub team_repo: Arc<dyn TeamRepository>,
    pub admin_repo: Arc<dyn AdminAccountRepository>,
    pub clock_sync: Arc<ServerClockSync>,
    pub session: Arc<SessionStore>,
    pub admin: Arc<AdminAuthGuard>,
    pub timer: Arc<RoundTimerEngine>,
    pub round_control: Arc<RoundControlService>,
    pub content: Arc<ContentService>,
    pub broadcasts: Arc<BroadcastService>,
    pub visibility: PageVisibility,
    cancel: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

impl PortalContext {
    pub fn new(
        settings: Settings,
        backend: Backend,
        clock: Arc<dyn Clock>,
        storage: Arc<dyn SessionStorage>,
    ) -> Self {
        let rows = backend.rows.clone();

        let round_repo: Arc<dyn RoundRepository> = Arc::new(StoreRoundRepository::new(rows.clone()));
        let problem_repo: Arc<dyn ProblemRepository> = Arc::new(StoreProblemRepository::new(rows.clone()));
        let hint_repo: Arc<dyn HintRepository> = Arc::new(StoreHintRepository::new(rows.clone()));
        let broadcast_repo: Arc<dyn BroadcastRepository> = Arc::new(StoreBroadcastRepository::new(rows.clone()));
        let team_repo: Arc<dyn TeamRepository> = Arc::new(StoreTeamRepository::new(rows.clone()));
        let admin_repo: Arc<dyn AdminAccountRepository> = Arc::new(StoreAdminAccountRepository::new(rows));

        let clock_sync = Arc::new(ServerClockSync::new(
            backend.rpc.clone(),
            clock.clone(),
            settings.clock.clone(),
        ));

        let session = Arc::new(SessionStore::new(
            team_repo.clone(),
            backend.rpc.clone(),
            storage.clone(),
            clock.clone(),
            settings.session.clone(),
        ));
        let admin = Arc::new(AdminAuthGuard::new(
            admin_repo.clone(),
            storage,
            clock,
            settings.admin.clone(),
        ));

        let timer = Arc::new(RoundTimerEngine::new(
            clock_sync.clone(),
            round_repo.clone(),
            settings.timer.clone(),
        ));

        let round_control = Arc::new(RoundControlService::new(
            admin.clone(),
            round_repo.clone(),
            clock_sync.clone(),
        ));
        let content = Arc::new(ContentService::new(
            admin.clone(),
            problem_repo.clone(),
            hint_repo.clone(),
        ));
        let broadcasts = Arc::new(BroadcastService::new(admin.clone(), broadcast_repo.clone()));

        Self {
            settings,
            backend,
            round_repo,
            problem_repo,
            hint_repo,
            broadcast_repo,
            team_repo,
            admin_repo,
            clock_sync,
            session,
            admin,
            timer,
            round_control,
            content,
            broadcasts,
            visibility: PageVisibility::new(),
            cancel: CancellationToken::new(),
            lifecycle: Mutex::new(Lifecycle::Init),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&self, from: Lifecycle, to: Lifecycle) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *lifecycle != from {
            return Err(AppError::Internal(format!(
                "portal context is {:?}, expected {:?}",
                *lifecycle, from
            )));
        }
        *lifecycle = to;
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        match self.lifecycle() {
            Lifecycle::Active => Ok(()),
            other => Err(AppError::Internal(format!("portal context is {:?}", other))),
        }
    }

    /// Sync the server clock, resume any stored team session and start background resyncs.
    pub async fn start(&self) -> Result<()> {
        self.transition(Lifecycle::Init, Lifecycle::Active)?;

        self.clock_sync.initial_sync().await;

        match self.session.restore_session().await {
            RestoreOutcome::Authenticated(team) => tracing::info!("Resumed session for team {}", team.name),
            RestoreOutcome::Unknown => tracing::warn!("Stored team session could not be checked"),
            RestoreOutcome::Anonymous => {}
        }

        let clock_sync = self.clock_sync.clone();
        let cancel = self.cancel.child_token();
        tokio::spawn(async move { clock_sync.resync_loop(cancel).await });

        tracing::info!("Portal context active");
        Ok(())
    }

    /// Cancel every loop and binding started from this context.
    pub fn shutdown(&self) {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *lifecycle == Lifecycle::Disposed {
            return;
        }
        *lifecycle = Lifecycle::Disposed;
        self.cancel.cancel();
        tracing::info!("Portal context disposed");
    }

    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub async fn bind_rounds(&self) -> Result<LiveCollection<Round>> {
        self.ensure_active()?;
        let source = RoundsSource {
            repo: self.round_repo.clone(),
        };
        Ok(self.bind(source, BindingMode::Live).await)
    }

    /// Admins get the full view pushed live; everyone else the masked view on demand.
    pub async fn bind_problems(&self, round_number: Option<i32>) -> Result<LiveCollection<Problem>> {
        self.ensure_active()?;
        let privileged = self.admin.verify();
        let (view, mode) = if privileged {
            (ProblemView::Full, BindingMode::Live)
        } else {
            (ProblemView::Masked, BindingMode::Manual)
        };

        let source = ProblemsSource {
            repo: self.problem_repo.clone(),
            round_number,
            view,
        };
        Ok(self.bind(source, mode).await)
    }

    pub async fn bind_hints(&self, problem_id: Option<Uuid>) -> Result<LiveCollection<Hint>> {
        self.ensure_active()?;
        let source = HintsSource {
            repo: self.hint_repo.clone(),
            problem_id,
        };
        Ok(self.bind(source, BindingMode::Live).await)
    }

    pub async fn bind_broadcasts(&self) -> Result<LiveCollection<Broadcast>> {
        self.ensure_active()?;
        let source = BroadcastsSource {
            repo: self.broadcast_repo.clone(),
            limit: self.settings.broadcast.fetch_limit,
        };
        Ok(self.bind(source, BindingMode::Live).await)
    }

    async fn bind<S>(&self, source: S, mode: BindingMode) -> LiveCollection<S::Item>
    where
        S: crate::live::CollectionSource,
    {
        LiveCollection::bind(
            source,
            self.backend.changes.clone(),
            mode,
            &self.visibility,
            self.settings.live.clone(),
            self.cancel.child_token(),
        )
        .await
    }

    pub fn broadcast_feed(&self, broadcasts: &LiveCollection<Broadcast>) -> BroadcastFeed {
        BroadcastFeed::new(broadcasts.subscribe(), self.clock_sync.clone(), &self.settings.broadcast)
    }

    pub fn watch_round(
        &self,
        round_number: i32,
        rounds: &LiveCollection<Round>,
        problems: &LiveCollection<Problem>,
    ) -> watch::Receiver<RoundStatus> {
        self.timer
            .watch_round(round_number, rounds, problems, self.cancel.child_token())
    }
}

impl Drop for PortalContext {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
