//! Step domain model

use crate::core::resource::{Metadata, Resource, ResourceKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What kind of work the execution engine runs for a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepType {
    #[serde(rename = "CI")]
    Ci,
    #[serde(rename = "CD")]
    Cd,
}

/// Lifecycle of a step: Initializing -> Sending -> {Finish, Fail}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// Created upstream, waiting for its trigger
    Initializing,
    /// Submitted to the execution engine, waiting for its result
    Sending,
    /// Engine reported SUCCESS
    Finish,
    /// Engine reported anything else
    Fail,
}

impl StepStatus {
    /// Check if the step has a final engine outcome
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Finish | StepStatus::Fail)
    }

    /// Status string as stored, used in store filters
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Initializing => "Initializing",
            StepStatus::Sending => "Sending",
            StepStatus::Finish => "Finish",
            StepStatus::Fail => "Fail",
        }
    }
}

/// Desired and observed state of a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Owning stage
    pub stage_uuid: String,

    #[serde(rename = "type")]
    pub step_type: StepType,

    pub step_status: StepStatus,

    /// Intent to run now
    #[serde(default)]
    pub trigger: bool,

    /// Opaque arguments handed to the execution engine
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Smallest unit of work, executed by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub metadata: Metadata,
    pub spec: StepSpec,
}

impl Step {
    /// Create a step in `Initializing`
    pub fn new(
        uuid: impl Into<String>,
        stage_uuid: impl Into<String>,
        step_type: StepType,
    ) -> Self {
        Self {
            metadata: Metadata::new(uuid, ""),
            spec: StepSpec {
                stage_uuid: stage_uuid.into(),
                step_type,
                step_status: StepStatus::Initializing,
                trigger: false,
                data: Map::new(),
            },
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    pub fn with_trigger(mut self, trigger: bool) -> Self {
        self.spec.trigger = trigger;
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.spec.data = data;
        self
    }

    pub fn status(&self) -> StepStatus {
        self.spec.step_status
    }
}

impl Resource for Step {
    const KIND: ResourceKind = ResourceKind::Step;

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}
