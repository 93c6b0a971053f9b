//! hippod - Hippo consolidation runner
//!
//! Thin process adapter over `hippo-core`: loads config, opens the memory
//! database, runs one stage and prints the resulting report on stdout.

use anyhow::{Context, Result};
use clap::Parser;
use hippo_core::{Config, ConsolidationEngine, StageReport};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for the report
    let filter = EnvFilter::from_default_env()
        .add_directive("hippo_core=info".parse()?)
        .add_directive("hippod=info".parse()?);
    tracing_subscriber::registry()
        .with(filter)
        .with(cli.json_logs.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!cli.json_logs).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load().context("failed to load config")?,
    };
    if let Some(database) = cli.database {
        config.storage.database_path = database;
    }

    let db = hippo_core::db::open(&config.storage.database_path).with_context(|| {
        format!(
            "failed to open database at {}",
            config.storage.database_path.display()
        )
    })?;
    let engine = ConsolidationEngine::new(db, config);

    // Let an interrupted run finish its current chunk and report
    let stop = engine.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after the current chunk");
            stop.stop();
        }
    });

    match cli.command {
        Commands::Nightly => print_report(engine.nightly_consolidate().await?),
        Commands::Weekly => print_report(engine.weekly_consolidate().await?),
        Commands::Reinforce => print_report(engine.reinforce_patterns().await?),
        Commands::Decay => print_report(engine.decay_patterns().await?),
        Commands::Ingest { session, text, speaker } => {
            let record = engine.ingest(&session, &text, speaker.as_deref()).await?;
            info!(
                record_id = %record.id,
                importance = record.importance,
                topic = ?record.topic,
                "Ingested record"
            );
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
    }
}

fn print_report(report: StageReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.has_errors() {
        // Non-zero exit so the scheduler can alert on partial failures
        std::process::exit(2);
    }
    Ok(())
}
