//! Core domain types for BuildIt input resolution.
//!
//! This crate contains:
//! - Resource, job and build identifiers
//! - Resource versions and their digests
//! - Build cursors and build sets
//! - Pipeline definitions (resources, jobs, inputs)
//! - Resolver input configs and the input mapping they produce

pub mod build_set;
pub mod cursor;
pub mod error;
pub mod id;
pub mod input;
pub mod mapping;
pub mod pipeline;
pub mod version;

pub use build_set::BuildSet;
pub use cursor::{BuildCursor, BuildStatus};
pub use error::{Error, Result};
pub use id::{BuildId, JobId, ResourceId};
pub use input::{InputConfig, InputConfigs, JobSet, VersionPolicy, input_names};
pub use mapping::{AlgorithmInput, InputMapping, InputResult, ResolutionFailure, ResolvedInput};
pub use pipeline::{JobConfig, JobInput, Pipeline, PipelineIds, ResourceConfig, VersionConfig};
pub use version::{AlgorithmVersion, ResourceVersion, Version};
