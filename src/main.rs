use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use codeverse::{
    auth::TabStorage,
    backend::{Backend, RestBackend},
    clock::SystemClock,
    config::Settings,
    service::PortalContext,
    timer::RoundPhase,
};

/// Headless contest monitor: follows rounds and broadcasts and logs what a
/// contestant screen would show.
#[derive(Parser, Debug)]
#[command(name = "codeverse", version)]
struct Args {
    /// Only follow these rounds (default: every round present at startup).
    #[arg(long = "round")]
    rounds: Vec<i32>,

    /// Team name to join, as a contestant would on the landing page.
    #[arg(long)]
    team: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codeverse=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!("Connecting to contest backend at {}", settings.backend.url);

    let backend = Backend::from_shared(Arc::new(RestBackend::new(&settings.backend)?));
    let portal = PortalContext::new(
        settings,
        backend,
        Arc::new(SystemClock),
        Arc::new(TabStorage::new()),
    );
    portal.start().await?;

    if let Some(team) = portal.session.team() {
        tracing::info!("Continuing as team {}", team.name);
    } else if let Some(name) = args.team.as_deref() {
        match portal.session.join_team(name).await {
            Ok(team) => tracing::info!("Joined as team {}", team.name),
            Err(e) => tracing::warn!("Could not join as '{}': {}", name, e),
        }
    }

    let rounds = portal.bind_rounds().await?;
    let problems = portal.bind_problems(None).await?;
    let broadcasts = portal.bind_broadcasts().await?;

    let followed: Vec<i32> = if args.rounds.is_empty() {
        rounds.snapshot().iter().map(|r| r.number).collect()
    } else {
        args.rounds.clone()
    };
    if followed.is_empty() {
        tracing::warn!("No rounds to follow yet");
    }

    let mut watchers = HashMap::new();
    for number in &followed {
        watchers.insert(*number, portal.watch_round(*number, &rounds, &problems));
    }

    let mut banner = portal.broadcast_feed(&broadcasts).watch(portal.child_token());
    let cancel = portal.child_token();

    for (number, mut status) in watchers {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut last_phase: Option<RoundPhase> = None;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = status.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let current = status.borrow_and_update().clone();
                if last_phase != Some(current.phase) {
                    last_phase = Some(current.phase);
                    tracing::info!(
                        "Round {}: {} ({}s remaining)",
                        number,
                        current.phase,
                        current.total_remaining
                    );
                }
                if let Some(progress) = current.sequential {
                    tracing::debug!(
                        "Round {} problem {:?}, {}s left on it",
                        number,
                        progress.current_index,
                        progress.problem_remaining
                    );
                }
            }
        });
    }

    let banner_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = banner_cancel.cancelled() => break,
                changed = banner.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            for broadcast in banner.borrow_and_update().iter() {
                tracing::info!("📢 [{:?}] {}", broadcast.severity, broadcast.message);
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    rounds.close();
    problems.close();
    broadcasts.close();
    portal.shutdown();

    Ok(())
}
