//! JSON snapshots of version and build history.
//!
//! A dump carries everything the resolver reads from the database, so a
//! scheduling decision can be replayed offline against
//! [`MemoryVersionsDb`](crate::MemoryVersionsDb).

use buildit_core::{BuildId, BuildStatus, JobId, PipelineIds, ResourceId, Version};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::DbResult;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryDump {
    /// Job and resource IDs by name.
    #[serde(default)]
    pub pipeline: PipelineIds,
    #[serde(default)]
    pub versions: Vec<VersionRecord>,
    #[serde(default)]
    pub builds: Vec<BuildRecord>,
    #[serde(default)]
    pub inputs: Vec<BuildVersionRecord>,
    #[serde(default)]
    pub outputs: Vec<BuildVersionRecord>,
    #[serde(default)]
    pub pipes: Vec<PipeRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    pub resource_id: ResourceId,
    pub version: Version,
    pub check_order: i64,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
    pub id: BuildId,
    pub job_id: JobId,
    pub status: BuildStatus,
    #[serde(default)]
    pub rerun_of: Option<BuildId>,
}

/// A version fetched or produced by a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildVersionRecord {
    pub build_id: BuildId,
    pub name: String,
    pub resource_id: ResourceId,
    pub version: Version,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipeRecord {
    pub from_build_id: BuildId,
    pub to_build_id: BuildId,
}

impl HistoryDump {
    pub fn from_json(json: &str) -> DbResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> DbResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> DbResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
