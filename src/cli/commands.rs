//! CLI command definitions

use clap::Args;

/// Seed a manifest into an in-memory store and run the controller
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline manifest YAML file
    #[arg(short, long)]
    pub file: String,

    /// Keep running after every seeded pipeline has finished
    #[arg(long)]
    pub keep_running: bool,
}

/// Validate a pipeline manifest
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline manifest YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show the stored watch checkpoint
#[derive(Debug, Args, Clone)]
pub struct CheckpointCommand {
    /// Checkpoint database (defaults to the configured or standard location)
    #[arg(short, long)]
    pub path: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
