use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    auth::AdminAuthGuard,
    clock::ServerClockSync,
    config::BroadcastConfig,
    domain::{Broadcast, NewBroadcast, Severity},
    error::{AppError, Result},
    repository::BroadcastRepository,
};

/// Admin publishing of broadcasts.
pub struct BroadcastService {
    admin: Arc<AdminAuthGuard>,
    repo: Arc<dyn BroadcastRepository>,
}

impl BroadcastService {
    pub fn new(admin: Arc<AdminAuthGuard>, repo: Arc<dyn BroadcastRepository>) -> Self {
        Self { admin, repo }
    }

    fn authorize(&self) -> Result<()> {
        if !self.admin.verify() {
            return Err(AppError::Unauthorized);
        }
        self.admin.touch_activity();
        Ok(())
    }

    pub async fn send(&self, message: &str, severity: Severity) -> Result<Broadcast> {
        self.authorize()?;
        self.repo
            .create(NewBroadcast {
                message: message.trim().to_string(),
                severity,
            })
            .await
    }

    /// Retract a broadcast for everyone.
    pub async fn deactivate(&self, id: Uuid) -> Result<()> {
        self.authorize()?;
        self.repo.deactivate(id).await?;
        tracing::info!("Broadcast {} deactivated", id);
        Ok(())
    }

    pub async fn list_recent(&self, limit: usize) -> Result<Vec<Broadcast>> {
        self.authorize()?;
        self.repo.list_recent(limit).await
    }
}

/// The banner view of active broadcasts for one client.
///
/// A broadcast is shown while younger than the display window (measured on
/// the server clock) and not dismissed here. Dismissals are never written back.
#[derive(Clone)]
pub struct BroadcastFeed {
    snapshot: watch::Receiver<Vec<Broadcast>>,
    clock_sync: Arc<ServerClockSync>,
    window: chrono::Duration,
    sweep: Duration,
    dismissed: Arc<watch::Sender<HashSet<Uuid>>>,
}

impl BroadcastFeed {
    pub fn new(
        snapshot: watch::Receiver<Vec<Broadcast>>,
        clock_sync: Arc<ServerClockSync>,
        config: &BroadcastConfig,
    ) -> Self {
        let (dismissed, _) = watch::channel(HashSet::new());
        Self {
            snapshot,
            clock_sync,
            window: chrono::Duration::try_seconds(config.display_window_secs)
                .unwrap_or(chrono::Duration::MAX),
            sweep: Duration::from_secs(config.sweep_interval_secs.max(1)),
            dismissed: Arc::new(dismissed),
        }
    }

    pub fn visible(&self) -> Vec<Broadcast> {
        let now = self.clock_sync.server_now();
        let dismissed = self.dismissed.borrow();
        self.snapshot
            .borrow()
            .iter()
            .filter(|b| !dismissed.contains(&b.id) && b.within_window(now, self.window))
            .cloned()
            .collect()
    }

    pub fn dismiss(&self, id: Uuid) {
        self.dismissed.send_modify(|set| {
            set.insert(id);
        });
        tracing::debug!("Broadcast {} dismissed locally", id);
    }

    /// Visible set, re-evaluated on every sweep, snapshot change and dismissal.
    pub fn watch(&self, cancel: CancellationToken) -> watch::Receiver<Vec<Broadcast>> {
        let (tx, rx) = watch::channel(self.visible());
        let feed = self.clone();

        tokio::spawn(async move {
            let mut snapshot = feed.snapshot.clone();
            let mut dismissed = feed.dismissed.subscribe();
            let mut snapshot_open = true;
            let mut interval = tokio::time::interval(feed.sweep);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                    changed = snapshot.changed(), if snapshot_open => {
                        if changed.is_err() {
                            snapshot_open = false;
                        }
                    }
                    _ = dismissed.changed() => {}
                }

                let visible = feed.visible();
                let modified = tx.send_if_modified(|current| {
                    let same = current.len() == visible.len()
                        && current.iter().zip(&visible).all(|(a, b)| a.id == b.id);
                    if !same {
                        *current = visible;
                    }
                    !same
                });
                if modified {
                    tracing::debug!("Broadcast banner now shows {} message(s)", tx.borrow().len());
                }
                if tx.is_closed() {
                    break;
                }
            }
        });

        rx
    }
}
