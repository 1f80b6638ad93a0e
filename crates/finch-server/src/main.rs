//! finch server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), restores the
//! collection index from the data directory, and either serves the JSON API
//! with the daily scheduler running, or runs a single batch and exits.

mod app;
mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use app::App;
use clap::{Parser, Subcommand};
use finch_api::{ApiState, api_router};
use finch_ingest::SchedulerDriver;
use settings::Settings;
use tokio::{net::TcpListener, sync::watch};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "finch financial document ingestion server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy, Default)]
enum Command {
  /// Serve the API and run scheduled batches (default).
  #[default]
  Serve,
  /// Run one batch, summarize what changed, and exit.
  CollectOnce,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;
  let app = App::build(&settings).await?;

  match cli.command.unwrap_or_default() {
    Command::Serve => serve(settings, app).await,
    Command::CollectOnce => collect_once(app).await,
  }
}

async fn serve(settings: Settings, app: App) -> anyhow::Result<()> {
  let App { engine, worker, sec } = app;
  let (shutdown_tx, shutdown_rx) = watch::channel(false);

  let worker_task = tokio::spawn(worker.run(shutdown_rx.clone()));
  let cik_task = settings.cik_refresh_interval().map(|every| {
    tokio::spawn(app::cik_refresh_loop(
      engine.roster().clone(),
      sec.clone(),
      every,
      shutdown_rx.clone(),
    ))
  });
  let scheduler = SchedulerDriver::new(engine.clone(), settings.scheduler()).start();

  let state = ApiState::new(engine.clone()).with_cik_directory(sec);
  let app = axum::Router::new().nest("/api", api_router(state));

  let address = settings.address();
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
      }
      tracing::info!("shutdown requested");
    })
    .await
    .context("server error")?;

  let _ = shutdown_tx.send(true);
  let _ = worker_task.await;
  if let Some(task) = cik_task {
    let _ = task.await;
  }
  // Flushes the final snapshot, including summaries bound above.
  scheduler.stop().await;
  Ok(())
}

async fn collect_once(app: App) -> anyhow::Result<()> {
  let App { engine, mut worker, .. } = app;
  let batch = engine.run_batch().await.context("batch failed")?;
  let outcomes = worker.drain().await;
  engine.persist().await.context("failed to write snapshot")?;

  let summary = serde_json::json!({
    "created": batch.created_count(),
    "replaced": batch.replaced_count(),
    "unchanged": batch.unchanged_count(),
    "failed_items": batch.failed_item_count(),
    "failed_companies": batch.failures,
    "summaries_processed": outcomes.len(),
  });
  println!("{}", serde_json::to_string_pretty(&summary)?);
  Ok(())
}
