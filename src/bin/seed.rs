use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::json;

use codeverse::{
    auth::{AdminAuthGuard, TabStorage},
    backend::{Collection, RestBackend, Row, RowStore},
    clock::SystemClock,
    config::Settings,
    error::AppError,
    repository::StoreAdminAccountRepository,
};

/// Prepare a contest database: admin password and empty rounds.
#[derive(Parser, Debug)]
#[command(name = "seed", version)]
struct Args {
    /// New admin password.
    #[arg(long, env = "CODEVERSE_ADMIN_PASSWORD")]
    admin_password: String,

    /// Number of rounds to create (existing rounds are left alone).
    #[arg(long, default_value_t = 3)]
    rounds: i32,

    /// Make the last round sequential.
    #[arg(long)]
    sequential_final: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    println!("🌱 Seeding contest backend...");

    let settings = Settings::new().context("Failed to load configuration")?;
    let backend = Arc::new(
        RestBackend::with_service_key(&settings.backend)
            .context("Set CODEVERSE__BACKEND__SERVICE_KEY to the service role key")?,
    );

    println!("🔐 Setting admin password...");
    let guard = AdminAuthGuard::new(
        Arc::new(StoreAdminAccountRepository::new(backend.clone())),
        Arc::new(TabStorage::new()),
        Arc::new(SystemClock),
        settings.admin.clone(),
    );
    guard.set_password(&args.admin_password).await?;
    println!("  ✅ Admin password stored");

    println!("🏁 Creating rounds...");
    for number in 1..=args.rounds {
        let kind = if args.sequential_final && number == args.rounds {
            "sequential"
        } else {
            "standard"
        };

        let mut row = Row::new();
        row.insert("round_number".to_string(), json!(number));
        row.insert("title".to_string(), json!(format!("Round {}", number)));
        row.insert("round_type".to_string(), json!(kind));
        row.insert("duration_minutes".to_string(), json!(settings.timer.default_round_minutes));

        match backend.insert(Collection::Rounds, row).await {
            Ok(_) => println!("  ✅ Round {} ({})", number, kind),
            Err(AppError::Conflict(_)) => println!("  ⏭️  Round {} already exists", number),
            Err(e) => return Err(e.into()),
        }
    }

    println!("\n✨ Seeding complete!");
    Ok(())
}
