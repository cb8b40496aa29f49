//! Execution result documents pushed by the engine

use crate::echoer::flowrun::STATE_SUCCESS;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    #[serde(default)]
    pub name: String,
}

/// State of one flow run, as reported on the result stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowRunReport {
    #[serde(default)]
    pub metadata: ReportMetadata,

    #[serde(default)]
    pub spec: FlowRunReportSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowRunReportSpec {
    #[serde(default)]
    pub steps: Vec<StepReport>,
}

/// State of one action inside a flow run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    #[serde(default)]
    pub metadata: ReportMetadata,

    #[serde(default)]
    pub spec: StepReportSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepReportSpec {
    #[serde(default, alias = "actionRun")]
    pub action_run: ActionRun,

    #[serde(default)]
    pub response: ActionResponse,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRun {
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub state: String,
}

impl FlowRunReport {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn steps(&self) -> &[StepReport] {
        &self.spec.steps
    }
}

impl StepReport {
    /// Build a report entry (mostly useful for tests and fakes)
    pub fn new(name: impl Into<String>, done: bool, state: impl Into<String>) -> Self {
        Self {
            metadata: ReportMetadata { name: name.into() },
            spec: StepReportSpec {
                action_run: ActionRun { done },
                response: ActionResponse { state: state.into() },
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn is_done(&self) -> bool {
        self.spec.action_run.done
    }

    pub fn succeeded(&self) -> bool {
        self.spec.response.state == STATE_SUCCESS
    }
}

impl FlowRunReport {
    pub fn new(name: impl Into<String>, steps: Vec<StepReport>) -> Self {
        Self {
            metadata: ReportMetadata { name: name.into() },
            spec: FlowRunReportSpec { steps },
        }
    }
}
