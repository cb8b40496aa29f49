//! Pipeline domain model

use crate::core::resource::{Metadata, Resource, ResourceKind};
use serde::{Deserialize, Serialize};

/// Pipeline completion status; only ever moves Running -> Finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PipelineStatus {
    #[default]
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Expected member stages, in order
    #[serde(default)]
    pub stages: Vec<String>,

    #[serde(default)]
    pub pipeline_status: PipelineStatus,
}

/// Ordered group of stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub metadata: Metadata,
    pub spec: PipelineSpec,
}

impl Pipeline {
    pub fn new(uuid: impl Into<String>, stages: Vec<String>) -> Self {
        Self {
            metadata: Metadata::new(uuid, ""),
            spec: PipelineSpec {
                stages,
                pipeline_status: PipelineStatus::Running,
            },
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    pub fn is_finished(&self) -> bool {
        self.spec.pipeline_status == PipelineStatus::Finished
    }
}

impl Resource for Pipeline {
    const KIND: ResourceKind = ResourceKind::Pipeline;

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}
