//! Pipeline manifest loaded from YAML
//!
//! A manifest describes one pipeline as nested stages and steps. Materializing
//! it assigns fresh identities and wires the three levels together by UUID,
//! which is what an upstream component does before the controller sees them.

use crate::core::{Pipeline, Stage, Step, StepType};
use crate::store::{ResourceClient, StoreError};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Pipeline name
    pub name: String,

    /// Stages, in order
    pub stages: Vec<StageManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageManifest {
    pub name: String,

    pub steps: Vec<StepManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepManifest {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub step_type: StepType,

    /// Whether the step should be dispatched as soon as it is seen
    #[serde(default = "default_trigger")]
    pub trigger: bool,

    /// Arguments passed through to the execution engine
    #[serde(default)]
    pub data: Map<String, Value>,
}

fn default_trigger() -> bool {
    true
}

/// Resources produced from a manifest, ready to apply
#[derive(Debug, Clone)]
pub struct MaterializedPipeline {
    pub pipeline: Pipeline,
    pub stages: Vec<Stage>,
    pub steps: Vec<Step>,
}

impl Manifest {
    /// Load a manifest from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a manifest from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Manifest = serde_yaml::from_str(yaml)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            anyhow::bail!("Pipeline '{}' has no stages", self.name);
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(&stage.name) {
                anyhow::bail!("Duplicate stage name: {}", stage.name);
            }
            // A stage with no steps could never be reconciled: nothing would
            // ever finish to trigger it.
            if stage.steps.is_empty() {
                anyhow::bail!("Stage '{}' has no steps", stage.name);
            }
        }

        Ok(())
    }

    /// Total number of steps across all stages
    pub fn step_count(&self) -> usize {
        self.stages.iter().map(|s| s.steps.len()).sum()
    }

    /// Assign identities and build the resource tree
    pub fn materialize(&self) -> MaterializedPipeline {
        let pipeline_uuid = Uuid::new_v4().to_string();
        let mut stages = Vec::with_capacity(self.stages.len());
        let mut steps = Vec::with_capacity(self.step_count());

        for stage_manifest in &self.stages {
            let stage_uuid = Uuid::new_v4().to_string();
            let mut member_steps = Vec::with_capacity(stage_manifest.steps.len());

            for step_manifest in &stage_manifest.steps {
                let uuid = Uuid::new_v4().to_string();
                let step = Step::new(uuid, &stage_uuid, step_manifest.step_type)
                    .with_name(&step_manifest.name)
                    .with_trigger(step_manifest.trigger)
                    .with_data(step_manifest.data.clone());
                member_steps.push(step.metadata.uuid.clone());
                steps.push(step);
            }

            let stage = Stage::new(stage_uuid, &pipeline_uuid, member_steps);
            stages.push(stage.with_name(&stage_manifest.name));
        }

        let pipeline = Pipeline::new(
            pipeline_uuid,
            stages.iter().map(|s| s.metadata.uuid.clone()).collect(),
        )
        .with_name(&self.name);

        MaterializedPipeline {
            pipeline,
            stages,
            steps,
        }
    }
}

impl MaterializedPipeline {
    /// Apply the tree to the store, parents first so reconciliation never
    /// sees a step whose stage does not exist yet
    pub async fn seed(&self, resources: &ResourceClient) -> Result<(), StoreError> {
        resources.apply(&self.pipeline).await?;
        for stage in &self.stages {
            resources.apply(stage).await?;
        }
        for step in &self.steps {
            resources.apply(step).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PipelineStatus, StepStatus};

    const RELEASE: &str = r#"
name: "release"
stages:
  - name: "build"
    steps:
      - name: "compile"
        type: CI
        data:
          project: "https://example.com/repo.git"
          version: "v1.2.0"
      - name: "lint"
        type: CI
        trigger: false
  - name: "deploy"
    steps:
      - name: "rollout"
        type: CD
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_yaml(RELEASE).unwrap();
        assert_eq!(manifest.name, "release");
        assert_eq!(manifest.stages.len(), 2);
        assert_eq!(manifest.step_count(), 3);
        assert!(manifest.stages[0].steps[0].trigger);
        assert!(!manifest.stages[0].steps[1].trigger);
        assert_eq!(manifest.stages[1].steps[0].step_type, StepType::Cd);
    }

    #[test]
    fn test_materialize_wires_references() {
        let tree = Manifest::from_yaml(RELEASE).unwrap().materialize();

        assert_eq!(tree.pipeline.spec.pipeline_status, PipelineStatus::Running);
        assert_eq!(tree.pipeline.spec.stages.len(), 2);

        for stage in &tree.stages {
            assert_eq!(stage.spec.pipeline_uuid, tree.pipeline.metadata.uuid);
            assert!(!stage.spec.done);
            for member in &stage.spec.steps {
                let step = tree.steps.iter().find(|s| &s.metadata.uuid == member).unwrap();
                assert_eq!(step.spec.stage_uuid, stage.metadata.uuid);
                assert_eq!(step.spec.step_status, StepStatus::Initializing);
            }
        }
        assert_eq!(tree.steps[0].spec.data["version"], "v1.2.0");
    }

    #[test]
    fn test_empty_stage_rejected() {
        let yaml = r#"
name: "broken"
stages:
  - name: "build"
    steps: []
"#;
        let err = Manifest::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("has no steps"));
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let yaml = r#"
name: "dup"
stages:
  - name: "build"
    steps: [{type: CI}]
  - name: "build"
    steps: [{type: CD}]
"#;
        assert!(Manifest::from_yaml(yaml).is_err());
    }
}
