//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{CheckpointCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Pipeline reconciliation controller
#[derive(Debug, Parser, Clone)]
#[command(name = "pipeline-controller")]
#[command(author = "Pipeline Contributors")]
#[command(version = "0.1.0")]
#[command(
    about = "Drives CI/CD pipelines to completion through an execution engine",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to controller configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Prefix of submitted execution requests
    #[arg(long, global = true, env = "CONTROLLER_SERVER_NAME")]
    pub server_name: Option<String>,

    /// Execution engine base URL
    #[arg(long, global = true, env = "ECHOER_ADDR")]
    pub echoer_addr: Option<String>,

    /// Store namespace
    #[arg(long, global = true, env = "CONTROLLER_NAMESPACE")]
    pub namespace: Option<String>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Seed a pipeline manifest and reconcile it to completion
    Run(RunCommand),

    /// Validate a pipeline manifest
    Validate(ValidateCommand),

    /// Show the stored watch checkpoint
    Checkpoint(CheckpointCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
