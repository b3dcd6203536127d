use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    ChangeBus, ChangeEvent, ChangeHub, ChangeKind, Collection, EventMask, Filter, Query,
    RemoteProcedures, Row, RowStore, Subscription,
};
use crate::auth::{generate_token, hash_password, verify_password};
use crate::clock::Clock;
use crate::domain::{CredentialCheck, ImportOutcome, Team};
use crate::error::{AppError, Result};

const INVALID_CREDENTIALS: &str = "Invalid username or password";

struct TeamCredential {
    team_id: String,
    password_hash: String,
}

/// In-process stand-in for the hosted backend.
///
/// Enforces the same unique keys as the hosted schema, computes the masked
/// problem projection, publishes every write on its change hub, and serves the
/// remote procedures. Used by tests and contest rehearsals.
pub struct MemoryBackend {
    tables: RwLock<HashMap<Collection, Vec<Row>>>,
    credentials: RwLock<HashMap<String, TeamCredential>>,
    hub: ChangeHub,
    clock: Arc<dyn Clock>,
    server_offset_ms: AtomicI64,
    available: AtomicBool,
}

impl MemoryBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            credentials: RwLock::new(HashMap::new()),
            hub: ChangeHub::default(),
            clock,
            server_offset_ms: AtomicI64::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate a transport outage: every call fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, AtomicOrdering::SeqCst);
    }

    /// Make the server clock run ahead of (or behind) the local one.
    pub fn set_server_offset_ms(&self, offset_ms: i64) {
        self.server_offset_ms.store(offset_ms, AtomicOrdering::SeqCst);
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    fn server_now(&self) -> DateTime<Utc> {
        self.clock.now() + Duration::milliseconds(self.server_offset_ms.load(AtomicOrdering::SeqCst))
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::Unavailable("backend offline".to_string()))
        }
    }

    fn unique_columns(collection: Collection) -> &'static [&'static str] {
        match collection {
            Collection::Rounds => &["round_number"],
            Collection::Teams => &["name", "username", "session_id"],
            Collection::AdminSettings => &["setting_key"],
            Collection::Problems | Collection::Hints | Collection::Broadcasts => &["id"],
            Collection::ProblemsMasked => &[],
        }
    }

    fn find_conflict(rows: &[Row], candidate: &Row, collection: Collection, skip: Option<usize>) -> Option<String> {
        for column in Self::unique_columns(collection) {
            let value = match candidate.get(*column) {
                Some(Value::Null) | None => continue,
                Some(value) => value,
            };
            let clash = rows
                .iter()
                .enumerate()
                .any(|(idx, row)| Some(idx) != skip && row.get(*column) == Some(value));
            if clash {
                return Some(format!(
                    "duplicate key value violates unique constraint \"{}_{}_key\"",
                    collection, column
                ));
            }
        }
        None
    }

    fn fill_defaults(&self, collection: Collection, row: &mut Row) {
        let needs_id = matches!(
            collection,
            Collection::Problems | Collection::Hints | Collection::Broadcasts | Collection::Teams
        );
        if needs_id && !row.contains_key("id") {
            row.insert("id".to_string(), json!(Uuid::new_v4()));
        }

        if matches!(collection, Collection::Broadcasts | Collection::Teams)
            && !row.contains_key("created_at")
        {
            row.insert("created_at".to_string(), json!(self.server_now()));
        }

        match collection {
            Collection::Teams => {
                row.entry("session_id").or_insert_with(|| json!(generate_token()));
                row.entry("username").or_insert(Value::Null);
            }
            Collection::Broadcasts => {
                row.entry("is_active").or_insert(json!(true));
                row.entry("type").or_insert(json!("info"));
            }
            Collection::Rounds => {
                row.entry("is_unlocked").or_insert(json!(false));
                row.entry("timer_active").or_insert(json!(false));
                row.entry("timer_started_at").or_insert(Value::Null);
                row.entry("round_type").or_insert(json!("standard"));
            }
            Collection::AdminSettings => {
                row.entry("failed_attempts").or_insert(json!(0));
                row.entry("locked_until").or_insert(Value::Null);
            }
            _ => {}
        }
    }

    fn masked_problems(tables: &HashMap<Collection, Vec<Row>>) -> Vec<Row> {
        let rounds = tables.get(&Collection::Rounds).map(Vec::as_slice).unwrap_or(&[]);
        let problems = tables.get(&Collection::Problems).map(Vec::as_slice).unwrap_or(&[]);

        problems
            .iter()
            .map(|problem| {
                let unlocked = rounds.iter().any(|round| {
                    round.get("round_number") == problem.get("round_number")
                        && round.get("is_unlocked") == Some(&Value::Bool(true))
                });
                let mut row = problem.clone();
                if !unlocked {
                    row.insert("statement".to_string(), Value::Null);
                    row.insert("guidance".to_string(), Value::Null);
                }
                row
            })
            .collect()
    }

    fn matches_all(filters: &[Filter], row: &Row) -> bool {
        filters.iter().all(|f| f.matches(row))
    }

    fn publish(&self, collection: Collection, kind: ChangeKind, new_row: Option<Row>, old_row: Option<Row>) {
        self.hub.publish(ChangeEvent {
            collection,
            kind,
            new_row,
            old_row,
        });
    }

    async fn team_by_id(&self, team_id: &str) -> Result<Option<Team>> {
        let rows = self
            .select(Collection::Teams, &Query::new().eq("id", team_id))
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(Value::Object(row))?)),
            None => Ok(None),
        }
    }
}

/// Order two JSON values the way the hosted store orders columns.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn apply_query(mut rows: Vec<Row>, query: &Query) -> Vec<Row> {
    rows.retain(|row| query.matches(row));

    if !query.order.is_empty() {
        rows.sort_by(|a, b| {
            for order in &query.order {
                let left = a.get(&order.column).unwrap_or(&Value::Null);
                let right = b.get(&order.column).unwrap_or(&Value::Null);
                let ord = compare_values(left, right);
                let ord = if order.ascending { ord } else { ord.reverse() };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    if let Some(limit) = query.limit {
        rows.truncate(limit);
    }
    rows
}

#[async_trait]
impl RowStore for MemoryBackend {
    async fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Row>> {
        self.ensure_available()?;
        let tables = self.tables.read().await;

        let rows = match collection {
            Collection::ProblemsMasked => Self::masked_problems(&tables),
            other => tables.get(&other).cloned().unwrap_or_default(),
        };

        Ok(apply_query(rows, query))
    }

    async fn insert(&self, collection: Collection, mut row: Row) -> Result<Row> {
        self.ensure_available()?;
        if collection == Collection::ProblemsMasked {
            return Err(AppError::Forbidden);
        }

        self.fill_defaults(collection, &mut row);

        {
            let mut tables = self.tables.write().await;
            let rows = tables.entry(collection).or_default();
            if let Some(message) = Self::find_conflict(rows, &row, collection, None) {
                return Err(AppError::Conflict(message));
            }
            rows.push(row.clone());
        }

        self.publish(collection, ChangeKind::Insert, Some(row.clone()), None);
        Ok(row)
    }

    async fn update(&self, collection: Collection, filters: &[Filter], patch: Row) -> Result<Vec<Row>> {
        self.ensure_available()?;
        if collection == Collection::ProblemsMasked {
            return Err(AppError::Forbidden);
        }

        let mut changed = Vec::new();
        {
            let mut tables = self.tables.write().await;
            let rows = tables.entry(collection).or_default();

            let targets: Vec<usize> = rows
                .iter()
                .enumerate()
                .filter(|(_, row)| Self::matches_all(filters, row))
                .map(|(idx, _)| idx)
                .collect();

            for idx in &targets {
                let mut candidate = rows[*idx].clone();
                for (key, value) in &patch {
                    candidate.insert(key.clone(), value.clone());
                }
                if let Some(message) = Self::find_conflict(rows, &candidate, collection, Some(*idx)) {
                    return Err(AppError::Conflict(message));
                }
            }

            for idx in targets {
                let old = rows[idx].clone();
                for (key, value) in &patch {
                    rows[idx].insert(key.clone(), value.clone());
                }
                changed.push((old, rows[idx].clone()));
            }
        }

        let mut updated = Vec::with_capacity(changed.len());
        for (old, new) in changed {
            self.publish(collection, ChangeKind::Update, Some(new.clone()), Some(old));
            updated.push(new);
        }
        Ok(updated)
    }

    async fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<u64> {
        self.ensure_available()?;
        if collection == Collection::ProblemsMasked {
            return Err(AppError::Forbidden);
        }

        let removed: Vec<Row> = {
            let mut tables = self.tables.write().await;
            let rows = tables.entry(collection).or_default();
            let (removed, kept): (Vec<Row>, Vec<Row>) = rows
                .drain(..)
                .partition(|row| Self::matches_all(filters, row));
            *rows = kept;
            removed
        };

        let count = removed.len() as u64;
        for row in removed {
            self.publish(collection, ChangeKind::Delete, None, Some(row));
        }
        Ok(count)
    }
}

#[async_trait]
impl ChangeBus for MemoryBackend {
    async fn subscribe(&self, collection: Collection, mask: EventMask) -> Result<Subscription> {
        self.ensure_available()?;
        Ok(self.hub.subscribe(collection, mask))
    }
}

#[async_trait]
impl RemoteProcedures for MemoryBackend {
    async fn get_server_time(&self) -> Result<DateTime<Utc>> {
        self.ensure_available()?;
        Ok(self.server_now())
    }

    async fn verify_team_credentials(&self, username: &str, password: &str) -> Result<CredentialCheck> {
        self.ensure_available()?;

        let team_id = {
            let credentials = self.credentials.read().await;
            match credentials.get(username) {
                Some(cred) if verify_password(password, &cred.password_hash)? => Some(cred.team_id.clone()),
                _ => None,
            }
        };

        let team = match team_id {
            Some(id) => self.team_by_id(&id).await?,
            None => None,
        };

        Ok(match team {
            Some(team) => CredentialCheck {
                success: true,
                team: Some(team),
                error: None,
            },
            None => CredentialCheck {
                success: false,
                team: None,
                error: Some(INVALID_CREDENTIALS.to_string()),
            },
        })
    }

    async fn insert_team_with_password(
        &self,
        name: &str,
        username: &str,
        password: &str,
    ) -> Result<ImportOutcome> {
        self.ensure_available()?;

        let password_hash = hash_password(password)?;
        let mut row = Row::new();
        row.insert("name".to_string(), json!(name));
        row.insert("username".to_string(), json!(username));

        match self.insert(Collection::Teams, row).await {
            Ok(inserted) => {
                let team_id = inserted
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.credentials.write().await.insert(
                    username.to_string(),
                    TeamCredential {
                        team_id,
                        password_hash,
                    },
                );
                Ok(ImportOutcome {
                    success: true,
                    error: None,
                })
            }
            Err(AppError::Conflict(_)) => Ok(ImportOutcome {
                success: false,
                error: Some(format!("Team '{}' or username '{}' already exists", name, username)),
            }),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn backend() -> MemoryBackend {
        MemoryBackend::new(Arc::new(SystemClock))
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_unique_team_name_conflicts() {
        let store = backend();
        store.insert(Collection::Teams, row(json!({"name": "Alpha"}))).await.unwrap();
        let err = store
            .insert(Collection::Teams, row(json!({"name": "Alpha"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_masked_view_hides_locked_content() {
        let store = backend();
        store
            .insert(Collection::Rounds, row(json!({"round_number": 1, "title": "Warmup"})))
            .await
            .unwrap();
        store
            .insert(
                Collection::Problems,
                row(json!({"round_number": 1, "problem_code": "A", "title": "Sum", "statement": "Add", "sort_order": 0})),
            )
            .await
            .unwrap();

        let masked = store.select(Collection::ProblemsMasked, &Query::new()).await.unwrap();
        assert_eq!(masked[0].get("statement"), Some(&Value::Null));

        store
            .update(
                Collection::Rounds,
                &[Filter::eq("round_number", 1)],
                row(json!({"is_unlocked": true})),
            )
            .await
            .unwrap();
        let masked = store.select(Collection::ProblemsMasked, &Query::new()).await.unwrap();
        assert_eq!(masked[0].get("statement"), Some(&json!("Add")));
    }

    #[tokio::test]
    async fn test_order_by_timestamp_and_limit() {
        let store = backend();
        let base = Utc::now();
        for secs in [0, 30, 10] {
            store
                .insert(
                    Collection::Broadcasts,
                    row(json!({"message": format!("m{}", secs), "created_at": base + Duration::seconds(secs)})),
                )
                .await
                .unwrap();
        }

        let rows = store
            .select(
                Collection::Broadcasts,
                &Query::new().order_by("created_at", false).limit(2),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("message"), Some(&json!("m30")));
        assert_eq!(rows[1].get("message"), Some(&json!("m10")));
    }

    #[tokio::test]
    async fn test_offline_backend_reports_unavailable() {
        let store = backend();
        store.set_available(false);
        let err = store.select(Collection::Rounds, &Query::new()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_team_credentials_round_trip() {
        let store = backend();
        let outcome = store
            .insert_team_with_password("Alpha", "alpha", "pw-123")
            .await
            .unwrap();
        assert!(outcome.success);

        let check = store.verify_team_credentials("alpha", "pw-123").await.unwrap();
        assert!(check.success);
        assert_eq!(check.team.unwrap().name, "Alpha");

        let check = store.verify_team_credentials("alpha", "nope").await.unwrap();
        assert!(!check.success);
        assert_eq!(check.error.as_deref(), Some(INVALID_CREDENTIALS));

        let dup = store
            .insert_team_with_password("Alpha", "alpha2", "pw")
            .await
            .unwrap();
        assert!(!dup.success);
    }
}
