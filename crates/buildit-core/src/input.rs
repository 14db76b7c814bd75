//! Normalized per-input descriptors handed to the resolvers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{JobId, ResourceId, Version};

/// Jobs a version must have passed through. Ordered, so iteration visits
/// job IDs in ascending order.
pub type JobSet = BTreeSet<JobId>;

/// Version selection policy of an input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionPolicy {
    #[default]
    Latest,
    Every,
    Pinned(Version),
}

/// One input of the job being scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Input name; the key of the resulting mapping entry.
    pub name: String,
    pub resource_id: ResourceId,
    /// The job being scheduled.
    pub job_id: JobId,
    pub passed: JobSet,
    pub policy: VersionPolicy,
}

impl InputConfig {
    pub fn pinned_version(&self) -> Option<&Version> {
        match &self.policy {
            VersionPolicy::Pinned(version) => Some(version),
            _ => None,
        }
    }

    pub fn uses_every_version(&self) -> bool {
        matches!(self.policy, VersionPolicy::Every)
    }

    pub fn has_passed(&self) -> bool {
        !self.passed.is_empty()
    }
}

pub type InputConfigs = Vec<InputConfig>;

/// Comma separated input names, for log fields.
pub fn input_names(configs: &[InputConfig]) -> String {
    configs
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
