//! Step state machine and dispatch to the execution engine

use crate::controller::Controller;
use crate::core::{ControllerConfig, Resource, Step, StepStatus, StepType};
use crate::echoer::FlowRun;
use serde_json::json;
use tracing::{debug, error, info, warn};

/// Data key carrying the engine retry hint for CI steps
pub const RETRY_COUNT_KEY: &str = "retryCount";

/// What handling a step snapshot did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Initializing without a trigger; not yet time to run
    Waiting,
    /// The snapshot no longer matches the stored step, either before the
    /// submit or when writing `Sending`
    Stale,
    /// Submitted to the engine and moved to `Sending`
    Dispatched { flow_run: String, persisted: bool },
    /// `Sending`; only a result report moves it on
    AwaitingResult,
    /// `Finish`; stage reconciliation was scheduled
    Escalated,
    /// `Fail`; nothing propagates upward
    Stalled,
    /// The store could not be read
    Abandoned,
}

/// Build the execution request for a step
///
/// CI requests are named `{server}_{timestamp}` with one action `CI_{uuid}`
/// and get the retry hint merged into the step data. CD requests use `-` as
/// separator (`{server}-{timestamp}`, `CD-{uuid}`) and pass data unchanged.
/// The result correlator only understands the `_` form, so CD results never
/// map back onto their step; the naming is kept as is until that contract is
/// settled with the engine side.
pub fn build_request(step: &mut Step, config: &ControllerConfig, timestamp: i64) -> FlowRun {
    let uuid = step.metadata.uuid.clone();
    match step.spec.step_type {
        StepType::Ci => {
            step.spec
                .data
                .insert(RETRY_COUNT_KEY.to_string(), json!(config.ci_retry_count));
            let mut flow_run = FlowRun::new(format!("{}_{}", config.server_name, timestamp));
            flow_run.add_step(
                format!("CI_{uuid}"),
                FlowRun::terminal_transitions(),
                &config.ci_action,
                step.spec.data.clone(),
            );
            flow_run
        }
        StepType::Cd => {
            let mut flow_run = FlowRun::new(format!("{}-{}", config.server_name, timestamp));
            flow_run.add_step(
                format!("CD-{uuid}"),
                FlowRun::terminal_transitions(),
                &config.cd_action,
                step.spec.data.clone(),
            );
            flow_run
        }
    }
}

impl Controller {
    /// Advance one step snapshot through its state machine
    pub async fn handle_step(&self, step: Step) -> StepAction {
        match step.status() {
            StepStatus::Initializing => {
                if !step.spec.trigger {
                    return StepAction::Waiting;
                }
                self.dispatch(step).await
            }
            StepStatus::Sending => StepAction::AwaitingResult,
            StepStatus::Finish => {
                info!(
                    "[control] step {} finished, reconciling stage {}",
                    step.uuid(),
                    step.spec.stage_uuid
                );
                let this = self.clone();
                let stage_uuid = step.spec.stage_uuid;
                self.spawn(async move {
                    this.reconcile_stage(&stage_uuid).await;
                });
                StepAction::Escalated
            }
            // A failed step never propagates: its stage stays not-done until
            // someone intervenes.
            StepStatus::Fail => {
                debug!(
                    "[control] step {} failed, stage {} stalls",
                    step.uuid(),
                    step.spec.stage_uuid
                );
                StepAction::Stalled
            }
        }
    }

    async fn dispatch(&self, mut step: Step) -> StepAction {
        match self.resources.get::<Step>(step.uuid()).await {
            Ok(Some(current))
                if current.version() == step.version()
                    && current.status() == StepStatus::Initializing => {}
            Ok(Some(current)) => {
                debug!(
                    "[control] step {} snapshot v{} superseded by v{} ({:?})",
                    step.uuid(),
                    step.version(),
                    current.version(),
                    current.status()
                );
                return StepAction::Stale;
            }
            Ok(None) => {
                warn!("[control] step {} no longer exists", step.uuid());
                return StepAction::Stale;
            }
            Err(e) => {
                error!("[control] handleStep get step {} error: {}", step.uuid(), e);
                return StepAction::Abandoned;
            }
        }

        let request = build_request(&mut step, &self.config, chrono::Utc::now().timestamp());
        info!("[control] sending step {} to echoer as {}", step.uuid(), request.name);

        // Fire and forget: a failed submission still moves the step on
        if let Err(e) = self.engine.submit(&request).await {
            error!("[control] submit flow run {} error: {}", request.name, e);
        }

        // Applied over the snapshot version: if a result was correlated while
        // the submit was in flight, the step has already moved past Sending.
        step.spec.step_status = StepStatus::Sending;
        let persisted = match self.resources.apply(&step).await {
            Ok(_) => true,
            Err(e) if e.is_conflict() => {
                info!(
                    "[control] step {} moved on while {} was submitted, keeping its state",
                    step.uuid(),
                    request.name
                );
                return StepAction::Stale;
            }
            Err(e) => {
                error!("[control] handleStep apply step {} error: {}", step.uuid(), e);
                false
            }
        };

        StepAction::Dispatched {
            flow_run: request.name,
            persisted,
        }
    }
}
