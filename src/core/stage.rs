//! Stage domain model

use crate::core::resource::{Metadata, Resource, ResourceKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Owning pipeline
    pub pipeline_uuid: String,

    /// Expected member steps, in order
    #[serde(default)]
    pub steps: Vec<String>,

    /// Set once every member step has finished; never reset
    #[serde(default)]
    pub done: bool,
}

/// Ordered group of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub metadata: Metadata,
    pub spec: StageSpec,
}

impl Stage {
    pub fn new(
        uuid: impl Into<String>,
        pipeline_uuid: impl Into<String>,
        steps: Vec<String>,
    ) -> Self {
        Self {
            metadata: Metadata::new(uuid, ""),
            spec: StageSpec {
                pipeline_uuid: pipeline_uuid.into(),
                steps,
                done: false,
            },
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    pub fn is_done(&self) -> bool {
        self.spec.done
    }
}

impl Resource for Stage {
    const KIND: ResourceKind = ResourceKind::Stage;

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}
