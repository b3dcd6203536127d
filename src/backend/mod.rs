use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::domain::{CredentialCheck, ImportOutcome};
use crate::error::Result;

pub mod hub;
pub mod memory;
pub mod rest;

pub use hub::ChangeHub;
pub use memory::MemoryBackend;
pub use rest::RestBackend;

/// A raw row as the hosted store returns it.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Rounds,
    Problems,
    /// Privilege-gated projection of `problems`.
    ProblemsMasked,
    Hints,
    Broadcasts,
    Teams,
    AdminSettings,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Rounds => "rounds",
            Collection::Problems => "problems",
            Collection::ProblemsMasked => "problems_masked",
            Collection::Hints => "hints",
            Collection::Broadcasts => "broadcasts",
            Collection::Teams => "teams",
            Collection::AdminSettings => "admin_settings",
        }
    }

    /// The table whose writes produce change events for this collection.
    pub fn source(&self) -> Collection {
        match self {
            Collection::ProblemsMasked => Collection::Problems,
            other => *other,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality filter on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self {
            column: column.to_string(),
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.column).unwrap_or(&Value::Null) == &self.value
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Which change kinds a subscription wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMask {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl EventMask {
    pub const ALL: EventMask = EventMask {
        insert: true,
        update: true,
        delete: true,
    };

    pub fn contains(&self, kind: ChangeKind) -> bool {
        match kind {
            ChangeKind::Insert => self.insert,
            ChangeKind::Update => self.update,
            ChangeKind::Delete => self.delete,
        }
    }
}

impl Default for EventMask {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
    pub new_row: Option<Row>,
    pub old_row: Option<Row>,
}

impl ChangeEvent {
    /// Placeholder delivered when the subscriber fell behind and missed events.
    fn missed(collection: Collection) -> Self {
        Self {
            collection,
            kind: ChangeKind::Update,
            new_row: None,
            old_row: None,
        }
    }
}

/// Handle on a change stream for one collection.
///
/// Dropping the handle or calling [`Subscription::unsubscribe`] releases the
/// underlying channel; unsubscribing twice is a no-op.
#[derive(Debug)]
pub struct Subscription {
    collection: Collection,
    mask: EventMask,
    receiver: Option<broadcast::Receiver<ChangeEvent>>,
}

impl Subscription {
    pub(crate) fn new(
        collection: Collection,
        mask: EventMask,
        receiver: broadcast::Receiver<ChangeEvent>,
    ) -> Self {
        Self {
            collection,
            mask,
            receiver: Some(receiver),
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }

    /// Next matching event; `None` once unsubscribed or the bus closed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if event.collection.source() == self.collection.source()
                        && self.mask.contains(event.kind)
                    {
                        return Some(event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Change subscription on {} lagged, {} events skipped",
                        self.collection,
                        skipped
                    );
                    return Some(ChangeEvent::missed(self.collection));
                }
                Err(RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    pub fn unsubscribe(&mut self) {
        if self.receiver.take().is_some() {
            tracing::debug!("Unsubscribed from {}", self.collection);
        }
    }
}

/// Generic row-store access over named collections.
///
/// An empty result means "not found"; transport failures are
/// `AppError::Unavailable` and never an empty result.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Row>>;
    async fn insert(&self, collection: Collection, row: Row) -> Result<Row>;
    async fn update(&self, collection: Collection, filters: &[Filter], patch: Row) -> Result<Vec<Row>>;
    async fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<u64>;
}

#[async_trait]
pub trait ChangeBus: Send + Sync {
    async fn subscribe(&self, collection: Collection, mask: EventMask) -> Result<Subscription>;
}

/// Server-computed operations that are not plain CRUD.
#[async_trait]
pub trait RemoteProcedures: Send + Sync {
    async fn get_server_time(&self) -> Result<DateTime<Utc>>;
    async fn verify_team_credentials(&self, username: &str, password: &str) -> Result<CredentialCheck>;
    async fn insert_team_with_password(
        &self,
        name: &str,
        username: &str,
        password: &str,
    ) -> Result<ImportOutcome>;
}

/// The three faces of one hosted backend, shared by everything in the portal.
#[derive(Clone)]
pub struct Backend {
    pub rows: Arc<dyn RowStore>,
    pub changes: Arc<dyn ChangeBus>,
    pub rpc: Arc<dyn RemoteProcedures>,
}

impl Backend {
    pub fn from_shared<B>(backend: Arc<B>) -> Self
    where
        B: RowStore + ChangeBus + RemoteProcedures + 'static,
    {
        Self {
            rows: backend.clone(),
            changes: backend.clone(),
            rpc: backend,
        }
    }
}

/// Serialize a typed value into a row, rejecting non-object shapes.
pub fn to_row<T: serde::Serialize>(value: &T) -> Result<Row> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(crate::error::AppError::Internal(format!(
            "expected an object row, got {}",
            other
        ))),
    }
}
