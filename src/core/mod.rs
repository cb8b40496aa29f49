//! Core domain models
//!
//! This module defines the three reconciled resources (pipeline, stage,
//! step), their identity, and the configuration inputs of the controller.

pub mod config;
pub mod manifest;
pub mod pipeline;
pub mod resource;
pub mod stage;
pub mod step;

pub use config::ControllerConfig;
pub use manifest::{Manifest, MaterializedPipeline};
pub use pipeline::*;
pub use resource::*;
pub use stage::*;
pub use step::*;
