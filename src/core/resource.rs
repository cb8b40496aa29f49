//! Resource identity shared by steps, stages and pipelines

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three resource kinds the controller reconciles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Step,
    Stage,
    Pipeline,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Step => "step",
            ResourceKind::Stage => "stage",
            ResourceKind::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and version of a stored resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Stable resource identity
    #[serde(default)]
    pub uuid: String,

    /// Human-readable name (informational only)
    #[serde(default)]
    pub name: String,

    /// Store-assigned version, bumped on every apply
    #[serde(default)]
    pub version: u64,
}

impl Metadata {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            version: 0,
        }
    }
}

/// A typed resource that can round-trip through the resource store
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn metadata(&self) -> &Metadata;

    fn uuid(&self) -> &str {
        &self.metadata().uuid
    }

    fn version(&self) -> u64 {
        self.metadata().version
    }
}
