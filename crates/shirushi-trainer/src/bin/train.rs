//! Multi-task trainer entry point.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use shirushi_trainer::{TrainingConfig, TrainingScheduler};

/// CLI arguments
#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Jointly train sequence-labeling tasks against one shared encoder")]
#[command(version)]
struct Cli {
    /// Path to the JSON training configuration
    config: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = TrainingConfig::from_file(&cli.config)?;
    let mut scheduler = TrainingScheduler::new(config)?;
    scheduler.run()?;

    Ok(())
}
