//! Cascading completion: steps -> stage -> pipeline

use crate::controller::Controller;
use crate::core::{Pipeline, PipelineStatus, Stage, Step, StepStatus};
use crate::store::Filter;
use tracing::{debug, error, info, warn};

/// What a reconciliation pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The target does not exist (yet); nothing to do
    Missing,
    /// Not every expected child is complete
    Incomplete { finished: usize, expected: usize },
    /// The target was already complete
    AlreadyComplete,
    /// This pass marked the target complete
    Completed,
    /// A store call failed or lost a concurrent write; the pass was dropped
    Abandoned,
}

impl Controller {
    /// Mark a stage done once all of its steps have finished, then
    /// reconcile its pipeline
    ///
    /// A stage that is already done goes straight to its pipeline, so a late
    /// or duplicate step completion still gets the pipeline re-checked.
    pub async fn reconcile_stage(&self, stage_uuid: &str) -> Reconciled {
        let mut stage = match self.resources.get::<Stage>(stage_uuid).await {
            Ok(Some(stage)) => stage,
            Ok(None) => {
                warn!("[control] reconcileStage stage {} not found", stage_uuid);
                return Reconciled::Missing;
            }
            Err(e) => {
                error!("[control] reconcileStage get stage {} error: {}", stage_uuid, e);
                return Reconciled::Abandoned;
            }
        };

        if stage.is_done() {
            self.reconcile_pipeline(&stage.spec.pipeline_uuid).await;
            return Reconciled::AlreadyComplete;
        }

        let filter = Filter::new()
            .eq("spec.stage_uuid", stage_uuid)
            .eq("spec.step_status", StepStatus::Finish.as_str());
        let finished = match self.resources.list_by_filter::<Step>(&filter).await {
            Ok(steps) => steps.len(),
            Err(e) => {
                error!("[control] reconcileStage list steps of {} error: {}", stage_uuid, e);
                return Reconciled::Abandoned;
            }
        };
        let expected = stage.spec.steps.len();
        if finished != expected {
            debug!(
                "[control] stage {} has {}/{} steps finished",
                stage_uuid, finished, expected
            );
            return Reconciled::Incomplete { finished, expected };
        }

        stage.spec.done = true;
        match self.resources.apply(&stage).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {
                warn!("[control] reconcileStage stage {} changed concurrently: {}", stage_uuid, e);
                return Reconciled::Abandoned;
            }
            Err(e) => {
                error!("[control] reconcileStage apply stage {} error: {}", stage_uuid, e);
                return Reconciled::Abandoned;
            }
        }
        info!("[control] stage {} done", stage_uuid);

        self.reconcile_pipeline(&stage.spec.pipeline_uuid).await;
        Reconciled::Completed
    }

    /// Mark a pipeline finished once all of its stages are done
    pub async fn reconcile_pipeline(&self, pipeline_uuid: &str) -> Reconciled {
        let mut pipeline = match self.resources.get::<Pipeline>(pipeline_uuid).await {
            Ok(Some(pipeline)) => pipeline,
            Ok(None) => {
                warn!("[control] reconcilePipeline pipeline {} not found", pipeline_uuid);
                return Reconciled::Missing;
            }
            Err(e) => {
                error!("[control] reconcilePipeline get pipeline {} error: {}", pipeline_uuid, e);
                return Reconciled::Abandoned;
            }
        };

        match pipeline.spec.pipeline_status {
            PipelineStatus::Finished => return Reconciled::AlreadyComplete,
            PipelineStatus::Running => {}
        }

        let filter = Filter::new()
            .eq("spec.pipeline_uuid", pipeline_uuid)
            .eq("spec.done", true);
        let done = match self.resources.list_by_filter::<Stage>(&filter).await {
            Ok(stages) => stages.len(),
            Err(e) => {
                error!("[control] reconcilePipeline list stages of {} error: {}", pipeline_uuid, e);
                return Reconciled::Abandoned;
            }
        };
        let expected = pipeline.spec.stages.len();
        if done != expected {
            debug!(
                "[control] pipeline {} has {}/{} stages done",
                pipeline_uuid, done, expected
            );
            return Reconciled::Incomplete {
                finished: done,
                expected,
            };
        }

        pipeline.spec.pipeline_status = PipelineStatus::Finished;
        match self.resources.apply(&pipeline).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {
                warn!(
                    "[control] reconcilePipeline pipeline {} changed concurrently: {}",
                    pipeline_uuid, e
                );
                return Reconciled::Abandoned;
            }
            Err(e) => {
                error!(
                    "[control] reconcilePipeline apply pipeline {} error: {}",
                    pipeline_uuid, e
                );
                return Reconciled::Abandoned;
            }
        }
        info!("[control] pipeline {} finished", pipeline_uuid);

        Reconciled::Completed
    }
}
