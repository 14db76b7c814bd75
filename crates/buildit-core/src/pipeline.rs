//! Pipeline definitions: resources, jobs and the inputs jobs consume.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Error, JobId, Result, ResourceId, Version};

/// A pipeline definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline name (e.g., "my-service").
    pub name: String,
    /// Resources jobs can consume.
    pub resources: Vec<ResourceConfig>,
    /// Jobs in the pipeline.
    pub jobs: Vec<JobConfig>,
}

impl Pipeline {
    pub fn resource(&self, name: &str) -> Result<&ResourceConfig> {
        self.resources
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::NotFound(format!("resource '{}'", name)))
    }

    pub fn job(&self, name: &str) -> Result<&JobConfig> {
        self.jobs
            .iter()
            .find(|j| j.name == name)
            .ok_or_else(|| Error::NotFound(format!("job '{}'", name)))
    }
}

/// Database identifiers of a pipeline's jobs and resources, by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineIds {
    pub jobs: BTreeMap<String, JobId>,
    pub resources: BTreeMap<String, ResourceId>,
}

impl PipelineIds {
    pub fn job_id(&self, name: &str) -> Result<JobId> {
        self.jobs
            .get(name)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("job '{}'", name)))
    }

    pub fn resource_id(&self, name: &str) -> Result<ResourceId> {
        self.resources
            .get(name)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("resource '{}'", name)))
    }
}

/// A resource declared by a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    /// Version pinned on the resource itself, applied to every input that
    /// does not pin its own version.
    pub pinned_version: Option<Version>,
}

/// A job and the inputs it fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub inputs: Vec<JobInput>,
}

/// A `get` of a resource by a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInput {
    /// Name the version is made available under.
    pub name: String,
    /// Resource to fetch.
    pub resource: String,
    /// Upstream jobs the version must have passed through.
    pub passed: Vec<String>,
    /// Version selection.
    pub version: VersionConfig,
}

/// How a job input selects its version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionConfig {
    /// Newest available version.
    #[default]
    Latest,
    /// Each version in order, one per build.
    Every,
    /// Exactly this version.
    Pinned(Version),
}

impl std::str::FromStr for VersionConfig {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "latest" => Ok(VersionConfig::Latest),
            "every" => Ok(VersionConfig::Every),
            other => Err(Error::InvalidInput(format!(
                "unknown version strategy '{}', expected 'latest' or 'every'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_config_from_str() {
        assert_eq!("every".parse::<VersionConfig>().unwrap(), VersionConfig::Every);
        assert_eq!(
            "latest".parse::<VersionConfig>().unwrap(),
            VersionConfig::Latest
        );
        assert!(matches!(
            "oldest".parse::<VersionConfig>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_lookup_reports_missing_names() {
        let pipeline = Pipeline {
            name: "p".to_string(),
            resources: vec![ResourceConfig {
                name: "repo".to_string(),
                pinned_version: None,
            }],
            jobs: vec![],
        };

        assert!(pipeline.resource("repo").is_ok());
        assert!(matches!(pipeline.resource("nope"), Err(Error::NotFound(_))));
        assert!(matches!(pipeline.job("build"), Err(Error::NotFound(_))));
    }
}
