//! Reconciliation controller
//!
//! Two loops run side by side:
//! - the step watch ([`Controller::watch_steps`]) feeds every step change into
//!   the step state machine ([`Controller::handle_step`]), which dispatches
//!   triggered steps to the engine and cascades finished ones upward through
//!   [`Controller::reconcile_stage`] and [`Controller::reconcile_pipeline`];
//! - the result watch ([`Controller::watch_results`]) maps engine reports back
//!   onto steps ([`Controller::handle_report`]).
//!
//! Every change and report is handled on its own task. Handlers for the same
//! stage or pipeline may race; every mutation is guarded by an "already
//! complete" check and only ever moves state forward, so redundant passes are
//! harmless.

pub mod correlator;
pub mod dispatcher;
pub mod reconciler;
pub mod watcher;

pub use correlator::{parse_request_name, parse_step_name, CorrelationSummary};
pub use dispatcher::{build_request, StepAction};
pub use reconciler::Reconciled;

use crate::core::ControllerConfig;
use crate::echoer::{EngineError, ExecutionEngine};
use crate::persistence::{CheckpointStore, InMemoryCheckpointStore};
use crate::store::{ResourceClient, ResourceStore, StoreError};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Errors that stop a controller loop
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("{0} stream closed")]
    StreamClosed(&'static str),
}

/// The reconciliation controller
///
/// Cheap to clone; clones share the store, engine and task budget.
#[derive(Clone)]
pub struct Controller {
    resources: ResourceClient,
    engine: Arc<dyn ExecutionEngine>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: Arc<ControllerConfig>,
    permits: Arc<Semaphore>,
}

impl Controller {
    pub fn new(
        config: ControllerConfig,
        store: Arc<dyn ResourceStore>,
        engine: Arc<dyn ExecutionEngine>,
    ) -> Self {
        let resources = ResourceClient::new(store, config.namespace.clone());
        let permits = Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1)));
        Self {
            resources,
            engine,
            checkpoints: Arc::new(InMemoryCheckpointStore::new()),
            config: Arc::new(config),
            permits,
        }
    }

    /// Use a durable checkpoint store instead of the in-memory default
    pub fn with_checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn resources(&self) -> &ResourceClient {
        &self.resources
    }

    /// Run both loops until one of them fails
    ///
    /// Neither loop ends on its own; the returned error says which stream
    /// went away (or which store/engine call failed during setup).
    pub async fn run(&self) -> Result<(), ControllerError> {
        info!(
            "[control] starting controller {} in namespace {}",
            self.config.server_name,
            self.resources.namespace()
        );
        tokio::select! {
            result = self.watch_steps() => result,
            result = self.watch_results() => result,
        }
    }

    /// Run a handler on its own task, bounded by the shared task budget
    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            match permits.acquire_owned().await {
                Ok(_permit) => task.await,
                Err(_) => debug!("[control] task budget closed, dropping task"),
            }
        });
    }
}
