//! pipeline-controller - watch-driven reconciler for CI/CD pipelines

pub mod cli;
pub mod controller;
pub mod core;
pub mod echoer;
pub mod persistence;
pub mod store;

// Re-export commonly used types
pub use crate::controller::{
    Controller, ControllerError, CorrelationSummary, Reconciled, StepAction,
};
pub use crate::core::{
    ControllerConfig, Manifest, Pipeline, PipelineStatus, Stage, Step, StepStatus, StepType,
};
pub use crate::echoer::{EchoerClient, EngineError, ExecutionEngine, FlowRun, FlowRunReport};
pub use crate::store::{InMemoryResourceStore, ResourceClient, ResourceStore, StoreError};
