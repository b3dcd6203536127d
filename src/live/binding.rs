use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, sleep_until, Instant, Interval};
use tokio_util::sync::CancellationToken;

use super::{BindingMode, CollectionSource, PageVisibility, Visibility};
use crate::{
    backend::{ChangeBus, ChangeEvent, Collection, EventMask, Subscription},
    config::LiveConfig,
    error::{AppError, Result},
};

type RefreshReply = oneshot::Sender<Result<()>>;

/// A collection snapshot that follows the backend.
///
/// Dropping the binding (or cancelling its token) stops the background task and
/// releases the change subscription. Snapshot receivers keep the last value.
pub struct LiveCollection<T> {
    collection: Collection,
    mode: BindingMode,
    snapshot: watch::Receiver<Vec<T>>,
    refresher: RefreshHandle,
    cancel: CancellationToken,
}

/// Cloneable trigger for a binding's re-fetch, usable after the binding is shared.
#[derive(Clone)]
pub struct RefreshHandle {
    collection: Collection,
    refresh_tx: mpsc::Sender<RefreshReply>,
}

impl RefreshHandle {
    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Re-fetch now and wait for the snapshot to be replaced.
    pub async fn refresh(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.refresh_tx
            .send(reply_tx)
            .await
            .map_err(|_| AppError::Internal(format!("{} binding is closed", self.collection)))?;
        reply_rx
            .await
            .map_err(|_| AppError::Internal(format!("{} binding is closed", self.collection)))?
    }
}

impl<T: Clone + Send + Sync + 'static> LiveCollection<T> {
    /// Fetch once, then keep the snapshot fresh in the background.
    pub async fn bind<S>(
        source: S,
        bus: Arc<dyn ChangeBus>,
        mode: BindingMode,
        visibility: &PageVisibility,
        config: LiveConfig,
        cancel: CancellationToken,
    ) -> Self
    where
        S: CollectionSource<Item = T>,
    {
        let collection = source.collection();

        // Subscribe before the first fetch so no change falls between the two.
        let visibility_rx = visibility.subscribe();
        let subscription = if mode == BindingMode::Live && visibility.current() == Visibility::Visible {
            open_subscription(bus.as_ref(), collection).await
        } else {
            None
        };

        let initial = match source.fetch().await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("Initial fetch of {} failed: {}", collection, e);
                Vec::new()
            }
        };

        let (tx, snapshot) = watch::channel(initial);
        let (refresh_tx, refresh_rx) = mpsc::channel(8);

        let worker = Worker {
            source,
            bus,
            mode,
            config,
            visibility: visibility.clone(),
            tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(worker.run(subscription, visibility_rx, refresh_rx));

        Self {
            collection,
            mode,
            snapshot,
            refresher: RefreshHandle {
                collection,
                refresh_tx,
            },
            cancel,
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn mode(&self) -> BindingMode {
        self.mode
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<T>> {
        self.snapshot.clone()
    }

    pub async fn refresh(&self) -> Result<()> {
        self.refresher.refresh().await
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        self.refresher.clone()
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl<T> Drop for LiveCollection<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Worker<S: CollectionSource> {
    source: S,
    bus: Arc<dyn ChangeBus>,
    mode: BindingMode,
    config: LiveConfig,
    visibility: PageVisibility,
    tx: watch::Sender<Vec<S::Item>>,
    cancel: CancellationToken,
}

impl<S: CollectionSource> Worker<S> {
    async fn fetch(&self) -> Result<()> {
        let result = self.source.fetch().await;
        if self.cancel.is_cancelled() {
            tracing::debug!("Dropping {} fetch that finished after shutdown", self.source.collection());
            return Ok(());
        }

        match result {
            Ok(items) => {
                tracing::debug!("{} refreshed ({} rows)", self.source.collection(), items.len());
                self.tx.send_replace(items);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Refreshing {} failed, keeping last snapshot: {}", self.source.collection(), e);
                Err(e)
            }
        }
    }

    async fn open(&self) -> Option<Subscription> {
        open_subscription(self.bus.as_ref(), self.source.collection()).await
    }

    async fn run(
        self,
        mut subscription: Option<Subscription>,
        mut visibility_rx: watch::Receiver<Visibility>,
        mut refresh_rx: mpsc::Receiver<RefreshReply>,
    ) {
        let live = self.mode == BindingMode::Live;
        let mut teardown_at: Option<Instant> = None;
        let grace = Duration::from_secs(self.config.hidden_grace_secs);

        let mut poll = (live && self.config.poll_fallback_secs > 0).then(|| {
            let period = Duration::from_secs(self.config.poll_fallback_secs);
            interval_at(Instant::now() + period, period)
        });

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                Some(reply) = refresh_rx.recv() => {
                    let _ = reply.send(self.fetch().await);
                }

                event = next_event(&mut subscription) => match event {
                    Some(event) => {
                        tracing::debug!("{:?} on {}, re-fetching", event.kind, event.collection);
                        let _ = self.fetch().await;
                    }
                    None => {
                        tracing::warn!("Change subscription on {} closed", self.source.collection());
                        subscription = None;
                    }
                },

                changed = visibility_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let visibility = *visibility_rx.borrow_and_update();
                    match visibility {
                        Visibility::Hidden => {
                            if subscription.is_some() && teardown_at.is_none() {
                                teardown_at = Some(Instant::now() + grace);
                            }
                        }
                        Visibility::Visible => {
                            if teardown_at.take().is_some() {
                                tracing::debug!("{} teardown cancelled", self.source.collection());
                            } else if live && subscription.is_none() {
                                subscription = self.open().await;
                                let _ = self.fetch().await;
                            }
                        }
                    }
                }

                _ = wait_until(teardown_at) => {
                    teardown_at = None;
                    if let Some(mut sub) = subscription.take() {
                        sub.unsubscribe();
                        tracing::info!("Paused {} subscription while hidden", self.source.collection());
                    }
                }

                _ = next_poll(&mut poll) => {
                    if self.visibility.current() == Visibility::Visible {
                        let _ = self.fetch().await;
                    }
                }
            }
        }

        if let Some(mut sub) = subscription.take() {
            sub.unsubscribe();
        }
        tracing::debug!("{} binding stopped", self.source.collection());
    }
}

async fn open_subscription(bus: &dyn ChangeBus, collection: Collection) -> Option<Subscription> {
    match bus.subscribe(collection, EventMask::ALL).await {
        Ok(subscription) => Some(subscription),
        Err(e) => {
            tracing::warn!("Subscribing to {} failed: {}", collection, e);
            None
        }
    }
}

async fn next_event(subscription: &mut Option<Subscription>) -> Option<ChangeEvent> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_poll(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
