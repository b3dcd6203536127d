//! Collection snapshots kept fresh by change notifications.

use async_trait::async_trait;

use crate::backend::Collection;
use crate::error::Result;

pub mod binding;
pub mod sources;
pub mod visibility;

pub use binding::{LiveCollection, RefreshHandle};
pub use sources::{BroadcastsSource, HintsSource, ProblemsSource, RoundsSource};
pub use visibility::{PageVisibility, Visibility};

/// Something a binding can re-fetch in full.
#[async_trait]
pub trait CollectionSource: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;

    /// Collection whose change events trigger a re-fetch.
    fn collection(&self) -> Collection;

    async fn fetch(&self) -> Result<Vec<Self::Item>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingMode {
    /// Subscribed to change events; re-fetches on every event.
    Live,
    /// No subscription; only explicit refreshes update the snapshot.
    Manual,
}
