//! The input mapping produced by resolution.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{AlgorithmVersion, BuildId, Version};

/// Why an input could not be resolved. These are expected outcomes shown to
/// users, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(tag = "reason", content = "version", rename_all = "snake_case")]
pub enum ResolutionFailure {
    #[display("pinned version {_0} not found")]
    PinnedVersionNotFound(Version),
    #[display("latest version of resource not found")]
    LatestVersionNotFound,
    #[display("version of resource not found")]
    VersionNotFound,
    #[display("no satisfiable builds from passed jobs found for set of inputs")]
    NoSatisfiableBuilds,
}

/// A version selected for an input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmInput {
    pub version: AlgorithmVersion,
    /// Whether the job's latest build did not already use this version.
    pub first_occurrence: bool,
}

/// A resolved input and the upstream builds that vouched for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedInput {
    pub input: AlgorithmInput,
    pub passed_build_ids: Vec<BuildId>,
}

/// Outcome of resolution for one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum InputResult {
    Resolved(ResolvedInput),
    Failed(ResolutionFailure),
    /// Resolution stopped before reaching this input.
    Skipped,
}

impl InputResult {
    pub fn is_resolved(&self) -> bool {
        matches!(self, InputResult::Resolved(_))
    }

    pub fn resolved(&self) -> Option<&ResolvedInput> {
        match self {
            InputResult::Resolved(resolved) => Some(resolved),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&ResolutionFailure> {
        match self {
            InputResult::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Result for every input of a job, keyed by input name.
pub type InputMapping = BTreeMap<String, InputResult>;
