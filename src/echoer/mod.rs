//! Execution engine ("Echoer") integration
//!
//! The controller submits one flow run per step and learns the outcome
//! asynchronously from the engine's result stream.

pub mod client;
pub mod flowrun;
pub mod report;
pub mod sse;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub use client::EchoerClient;
pub use flowrun::{FlowRun, FlowRunStep};
pub use report::{FlowRunReport, StepReport};

/// Error types for execution engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Engine returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode engine event: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Stream of result reports; an `Err` item is a single bad event, the
/// stream itself ends when the channel closes
pub type ReportStream = mpsc::Receiver<Result<FlowRunReport, EngineError>>;

/// Trait for execution engines - allows for different implementations
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Submit an execution request
    async fn submit(&self, request: &FlowRun) -> Result<(), EngineError>;

    /// Subscribe to result reports starting at a unix timestamp
    async fn watch_reports(&self, since: i64) -> Result<ReportStream, EngineError>;
}
