//! CLI argument definitions using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Hippo consolidation runner
///
/// Runs a single consolidation stage and prints its report as JSON. Meant to
/// be invoked by cron or a systemd timer.
#[derive(Parser, Debug)]
#[command(name = "hippod")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (defaults to $HIPPO_CONFIG or ~/.hippo/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the database path from config
    #[arg(long, global = true, env = "HIPPO_DB")]
    pub database: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Promote settled working records to episodes, then sweep expired ones
    Nightly,

    /// Extract patterns, merge them into semantic facts, archive old episodes
    Weekly,

    /// Strengthen recently used facts and episodes
    Reinforce,

    /// Weaken facts and episodes left idle
    Decay,

    /// Classify text and store it as a working record
    Ingest {
        /// Session the observation belongs to
        #[arg(long)]
        session: String,

        /// Raw text to classify
        #[arg(long)]
        text: String,

        /// Who said it, if it was said
        #[arg(long)]
        speaker: Option<String>,
    },
}
