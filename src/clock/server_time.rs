use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::time::{interval_at, sleep, Instant};
use tokio_util::sync::CancellationToken;

use super::Clock;
use crate::backend::RemoteProcedures;
use crate::config::ClockSyncConfig;
use crate::error::Result;

/// Keeps an estimate of the backend clock relative to the local one.
///
/// Sync failures never surface to callers: a failed sample counts as offset
/// zero, subject to the same drift threshold as any other resync sample.
pub struct ServerClockSync {
    rpc: Arc<dyn RemoteProcedures>,
    clock: Arc<dyn Clock>,
    config: ClockSyncConfig,
    offset_ms: AtomicI64,
    synced: AtomicBool,
}

impl ServerClockSync {
    pub fn new(rpc: Arc<dyn RemoteProcedures>, clock: Arc<dyn Clock>, config: ClockSyncConfig) -> Self {
        Self {
            rpc,
            clock,
            config,
            offset_ms: AtomicI64::new(0),
            synced: AtomicBool::new(false),
        }
    }

    pub fn server_now(&self) -> DateTime<Utc> {
        self.clock.now() + Duration::milliseconds(self.offset_ms())
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::SeqCst)
    }

    async fn sample(&self) -> Result<i64> {
        let send = self.clock.now();
        let server = self.rpc.get_server_time().await?;
        let recv = self.clock.now();

        let latency = (recv - send) / 2;
        Ok(((server + latency) - recv).num_milliseconds())
    }

    fn is_plausible(&self, offset_ms: i64) -> bool {
        offset_ms.abs() < self.config.max_plausible_offset_hours * 3_600_000
    }

    /// Establish the first offset. Always marks the clock as synced.
    pub async fn initial_sync(&self) -> i64 {
        let attempts = self.config.initial_attempts.max(1);
        let mut offset = 0;

        for attempt in 1..=attempts {
            offset = match self.sample().await {
                Ok(offset) => offset,
                Err(e) => {
                    tracing::warn!("Server time sync failed (attempt {}): {}", attempt, e);
                    0
                }
            };

            if self.is_plausible(offset) {
                break;
            }

            tracing::warn!(
                "Implausible server clock offset {}ms (attempt {}/{})",
                offset,
                attempt,
                attempts
            );
            if attempt < attempts {
                sleep(std::time::Duration::from_millis(self.config.retry_delay_ms)).await;
            }
        }

        self.offset_ms.store(offset, Ordering::SeqCst);
        self.synced.store(true, Ordering::SeqCst);
        tracing::info!("Server clock synced, offset {}ms", offset);
        offset
    }

    /// Re-sample and adopt the new offset only when it moved past the drift threshold.
    ///
    /// A failed sample counts as offset 0, so a lasting outage falls back to the
    /// local clock the same way the initial sync does.
    pub async fn resync(&self) -> bool {
        let offset = match self.sample().await {
            Ok(offset) => offset,
            Err(e) => {
                tracing::warn!("Server time resync failed, treating offset as 0: {}", e);
                0
            }
        };

        if !self.is_plausible(offset) {
            tracing::warn!("Ignoring implausible resync offset {}ms", offset);
            return false;
        }

        let current = self.offset_ms();
        if (offset - current).abs() > self.config.drift_threshold_ms {
            self.offset_ms.store(offset, Ordering::SeqCst);
            tracing::info!("Server clock drift corrected: {}ms -> {}ms", current, offset);
            true
        } else {
            tracing::debug!("Server clock offset steady at {}ms (sampled {}ms)", current, offset);
            false
        }
    }

    /// Initial sync followed by periodic resyncs until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = self.initial_sync() => {}
        }

        self.resync_loop(cancel).await;
    }

    /// Periodic resyncs only, for callers that already awaited [`Self::initial_sync`].
    pub async fn resync_loop(&self, cancel: CancellationToken) {
        let period = std::time::Duration::from_secs(self.config.resync_interval_secs.max(1));
        let mut interval = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Server clock sync stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.resync().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::clock::ManualClock;
    use crate::domain::{CredentialCheck, ImportOutcome};
    use crate::error::AppError;

    /// Answers `get_server_time` with scripted offsets from the local clock.
    struct ScriptedTime {
        clock: Arc<ManualClock>,
        script: Mutex<VecDeque<Result<i64>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedTime {
        fn new(clock: Arc<ManualClock>, script: Vec<Result<i64>>) -> Self {
            Self {
                clock,
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl RemoteProcedures for ScriptedTime {
        async fn get_server_time(&self) -> Result<DateTime<Utc>> {
            *self.calls.lock().unwrap() += 1;
            let next = self.script.lock().unwrap().pop_front().unwrap_or(Ok(0));
            next.map(|offset| self.clock.now() + Duration::milliseconds(offset))
        }

        async fn verify_team_credentials(&self, _: &str, _: &str) -> Result<CredentialCheck> {
            Err(AppError::Internal("not scripted".into()))
        }

        async fn insert_team_with_password(&self, _: &str, _: &str, _: &str) -> Result<ImportOutcome> {
            Err(AppError::Internal("not scripted".into()))
        }
    }

    const DAY_MS: i64 = 24 * 3_600_000;

    fn sync_with(script: Vec<Result<i64>>) -> (ServerClockSync, Arc<ScriptedTime>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let rpc = Arc::new(ScriptedTime::new(clock.clone(), script));
        let sync = ServerClockSync::new(rpc.clone(), clock.clone(), ClockSyncConfig::default());
        (sync, rpc, clock)
    }

    #[tokio::test]
    async fn test_offset_tracks_server_ahead() {
        let (sync, _, clock) = sync_with(vec![Ok(5000)]);
        assert!(!sync.is_synced());

        let offset = sync.initial_sync().await;
        assert!((offset - 5000).abs() <= 50);
        assert!(sync.is_synced());
        assert_eq!(sync.server_now() - clock.now(), Duration::milliseconds(offset));
    }

    #[tokio::test(start_paused = true)]
    async fn test_implausible_offsets_retry_then_accept_last() {
        let (sync, rpc, _) = sync_with(vec![Ok(2 * DAY_MS), Ok(3 * DAY_MS), Ok(DAY_MS + 1)]);

        let offset = sync.initial_sync().await;
        assert_eq!(rpc.calls(), 3);
        assert_eq!(offset, DAY_MS + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plausible_retry_stops_early() {
        let (sync, rpc, _) = sync_with(vec![Ok(-2 * DAY_MS), Ok(1200), Ok(99)]);

        assert_eq!(sync.initial_sync().await, 1200);
        assert_eq!(rpc.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_initial_sync_degrades_to_local_clock() {
        let (sync, _, _) = sync_with(vec![Err(AppError::Unavailable("offline".into()))]);

        assert_eq!(sync.initial_sync().await, 0);
        assert!(sync.is_synced());
    }

    #[tokio::test]
    async fn test_resync_respects_drift_threshold() {
        let (sync, _, _) = sync_with(vec![Ok(5000), Ok(5400), Ok(7000)]);
        sync.initial_sync().await;

        assert!(!sync.resync().await);
        assert_eq!(sync.offset_ms(), 5000);

        assert!(sync.resync().await);
        assert_eq!(sync.offset_ms(), 7000);
    }

    #[tokio::test]
    async fn test_resync_failure_falls_back_to_local_clock() {
        let (sync, _, _) = sync_with(vec![Ok(3000), Err(AppError::Unavailable("timeout".into()))]);
        sync.initial_sync().await;

        assert!(sync.resync().await);
        assert_eq!(sync.offset_ms(), 0);
        assert!(sync.is_synced());
    }

    #[tokio::test]
    async fn test_resync_failure_within_threshold_keeps_offset() {
        let (sync, _, _) = sync_with(vec![Ok(600), Err(AppError::Unavailable("timeout".into()))]);
        sync.initial_sync().await;

        assert!(!sync.resync().await);
        assert_eq!(sync.offset_ms(), 600);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_resyncs_until_cancelled() {
        let (sync, rpc, _) = sync_with(vec![Ok(0), Ok(4000)]);
        let sync = Arc::new(sync);
        let cancel = CancellationToken::new();

        let task = {
            let sync = sync.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { sync.run(cancel).await })
        };

        tokio::time::sleep(std::time::Duration::from_secs(301)).await;
        assert_eq!(sync.offset_ms(), 4000);
        assert_eq!(rpc.calls(), 2);

        cancel.cancel();
        task.await.unwrap();
    }
}
