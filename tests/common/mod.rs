#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::watch;

use codeverse::{
    auth::TabStorage,
    backend::{Backend, Collection, MemoryBackend, Row, RowStore},
    clock::ManualClock,
    config::Settings,
    service::PortalContext,
};

pub const ADMIN_PASSWORD: &str = "judge-me-gently";

pub struct Fixture {
    pub clock: Arc<ManualClock>,
    pub backend: Arc<MemoryBackend>,
    pub portal: PortalContext,
}

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-14T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn fixture() -> Fixture {
    fixture_with(Settings::default())
}

pub fn fixture_with(settings: Settings) -> Fixture {
    let clock = Arc::new(ManualClock::new(t0()));
    let backend = Arc::new(MemoryBackend::new(clock.clone()));
    let portal = PortalContext::new(
        settings,
        Backend::from_shared(backend.clone()),
        clock.clone(),
        Arc::new(TabStorage::new()),
    );
    Fixture {
        clock,
        backend,
        portal,
    }
}

pub async fn seed_round(
    backend: &MemoryBackend,
    number: i32,
    unlocked: bool,
    kind: &str,
    duration_minutes: Option<i64>,
) -> anyhow::Result<()> {
    let mut row = Row::new();
    row.insert("round_number".to_string(), json!(number));
    row.insert("title".to_string(), json!(format!("Round {}", number)));
    row.insert("round_type".to_string(), json!(kind));
    row.insert("is_unlocked".to_string(), json!(unlocked));
    row.insert("duration_minutes".to_string(), json!(duration_minutes));
    backend.insert(Collection::Rounds, row).await?;
    Ok(())
}

/// Store the admin password and log in.
pub async fn admin_login(portal: &PortalContext) -> anyhow::Result<()> {
    portal.admin.set_password(ADMIN_PASSWORD).await?;
    portal.admin.login(ADMIN_PASSWORD).await?;
    Ok(())
}

/// Wait until the watched value satisfies `pred`, failing after five (virtual) seconds.
pub async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, mut pred: F) -> anyhow::Result<()>
where
    F: FnMut(&T) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if pred(&rx.borrow_and_update()) {
            return Ok(());
        }
        tokio::time::timeout_at(deadline, rx.changed())
            .await
            .map_err(|_| anyhow::anyhow!("condition not reached in time"))??;
    }
}

/// Let background tasks run without moving the manual clock.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
