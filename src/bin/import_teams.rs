use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use codeverse::{backend::RestBackend, config::Settings, service::import_teams};

/// Bulk-create teams from a CSV file of `name,username,password` rows.
#[derive(Parser, Debug)]
#[command(name = "import-teams", version)]
struct Args {
    /// CSV file with a header row.
    #[arg(default_value = "teams.csv")]
    csv: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codeverse=info".into()),
        )
        .init();

    let args = Args::parse();
    let settings = Settings::new().context("Failed to load configuration")?;

    let backend = RestBackend::with_service_key(&settings.backend)
        .context("Set CODEVERSE__BACKEND__SERVICE_KEY to the service role key")?;
    println!("✅ Connected to {}", settings.backend.url);

    println!("📂 Reading CSV file: {}", args.csv.display());
    let content = std::fs::read_to_string(&args.csv)
        .with_context(|| format!("Could not read {}", args.csv.display()))?;

    let report = import_teams(&backend, &content).await;

    for failure in &report.failures {
        println!("   ❌ line {}: {} - {}", failure.line, failure.label, failure.reason);
    }

    println!("\n📊 Results:");
    println!("   ✅ Success: {}", report.succeeded);
    println!("   ❌ Failed/Skipped: {}", report.failed());

    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}
