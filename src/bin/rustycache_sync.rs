use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rustycache::{config, logging, runtime::Components};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "rustycache-sync",
    about = "Run one synchronization pass and print the final status as JSON"
)]
struct Cli {
    /// Override `DOCUMENTS_ROOT` for this run.
    #[arg(long)]
    documents_root: Option<PathBuf>,
    /// Override `SYNC_CONCURRENCY` for this run.
    #[arg(long)]
    concurrency: Option<usize>,
    /// Print compact JSON instead of pretty-printed output.
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    let mut config = config::Config::from_env().context("failed to load configuration")?;
    if let Some(root) = cli.documents_root {
        config.documents_root = root;
    }
    if let Some(concurrency) = cli.concurrency {
        config.sync_concurrency = concurrency.max(1);
    }
    config::CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("configuration already initialized"))?;
    let config = config::get_config();
    logging::init_tracing(config, logging::Console::Stderr);
    let components = Components::build(config)
        .await
        .context("failed to initialize components")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping sync run");
            on_interrupt.cancel();
        }
    });

    let outcome = components.coordinator.run(cancel).await;
    let status = components.coordinator.status();
    let rendered = if cli.compact {
        serde_json::to_string(&status)?
    } else {
        serde_json::to_string_pretty(&status)?
    };
    println!("{rendered}");

    outcome.context("synchronization run failed")?;
    Ok(())
}
