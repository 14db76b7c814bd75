//! Pipeline configuration parsing.
//!
//! ```kdl
//! pipeline "release"
//!
//! resource "repo"
//! resource "tools" {
//!     pin ref="v1.2.0"
//! }
//!
//! job "unit"
//! job "ship" {
//!     get "source" resource="repo" passed="unit" version="every"
//!     get "tools" resource="tools" {
//!         version ref="v1.1.0"
//!     }
//! }
//! ```

use crate::{ConfigError, ConfigResult};
use buildit_core::pipeline::{JobConfig, JobInput, Pipeline, ResourceConfig, VersionConfig};
use buildit_core::Version;
use kdl::{KdlDocument, KdlNode};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Read and parse a pipeline file.
pub fn load_pipeline(path: impl AsRef<Path>) -> ConfigResult<Pipeline> {
    let text = std::fs::read_to_string(path)?;
    parse_pipeline(&text)
}

/// Parse a pipeline configuration from KDL text.
pub fn parse_pipeline(kdl: &str) -> ConfigResult<Pipeline> {
    let doc: KdlDocument = kdl.parse()?;

    let mut name = String::new();
    let mut resources: Vec<ResourceConfig> = Vec::new();
    let mut jobs: Vec<JobConfig> = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "pipeline" => {
                name = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("pipeline name".to_string()))?;
            }
            "resource" => {
                let resource = parse_resource(node)?;
                if resources.iter().any(|r| r.name == resource.name) {
                    return Err(ConfigError::Duplicate(format!("resource '{}'", resource.name)));
                }
                resources.push(resource);
            }
            "job" => {
                let job = parse_job(node)?;
                if jobs.iter().any(|j| j.name == job.name) {
                    return Err(ConfigError::Duplicate(format!("job '{}'", job.name)));
                }
                jobs.push(job);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    if name.is_empty() {
        return Err(ConfigError::MissingField("pipeline name".to_string()));
    }

    let resource_names: HashSet<&str> = resources.iter().map(|r| r.name.as_str()).collect();
    let job_names: HashSet<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
    for job in &jobs {
        for input in &job.inputs {
            if !resource_names.contains(input.resource.as_str()) {
                return Err(ConfigError::InvalidReference(format!(
                    "input '{}' of job '{}' uses unknown resource '{}'",
                    input.name, job.name, input.resource
                )));
            }
            for passed in &input.passed {
                if !job_names.contains(passed.as_str()) {
                    return Err(ConfigError::InvalidReference(format!(
                        "input '{}' of job '{}' passed unknown job '{}'",
                        input.name, job.name, passed
                    )));
                }
            }
        }
    }

    if let Err(cycle) = detect_cycle(&jobs) {
        return Err(ConfigError::CycleDetected(cycle));
    }

    Ok(Pipeline {
        name,
        resources,
        jobs,
    })
}

fn parse_resource(node: &KdlNode) -> ConfigResult<ResourceConfig> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("resource name".to_string()))?;

    let mut pinned_version = None;
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == "pin" {
                pinned_version = Some(parse_version_props(child, &name)?);
            }
        }
    }

    Ok(ResourceConfig {
        name,
        pinned_version,
    })
}

fn parse_job(node: &KdlNode) -> ConfigResult<JobConfig> {
    let name =
        get_first_string_arg(node).ok_or_else(|| ConfigError::MissingField("job name".to_string()))?;

    let mut inputs: Vec<JobInput> = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() != "get" {
                continue;
            }
            let input = parse_get(child, &name)?;
            if inputs.iter().any(|i| i.name == input.name) {
                return Err(ConfigError::Duplicate(format!(
                    "input '{}' of job '{}'",
                    input.name, name
                )));
            }
            inputs.push(input);
        }
    }

    Ok(JobConfig { name, inputs })
}

fn parse_get(node: &KdlNode, job: &str) -> ConfigResult<JobInput> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField(format!("input name in job '{}'", job)))?;

    // `get "repo"` fetches the resource of the same name.
    let resource = get_string_prop(node, "resource").unwrap_or_else(|| name.clone());
    let passed = get_string_list_prop(node, "passed");

    if passed.iter().any(|p| p == job) {
        return Err(ConfigError::InvalidReference(format!(
            "input '{}' of job '{}' lists its own job as passed",
            name, job
        )));
    }

    let mut version = match get_string_prop(node, "version") {
        Some(strategy) => strategy
            .parse::<VersionConfig>()
            .map_err(|e| ConfigError::InvalidValue {
                field: format!("version of input '{}'", name),
                message: e.to_string(),
            })?,
        None => VersionConfig::Latest,
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == "version" {
                version = VersionConfig::Pinned(parse_version_props(child, &name)?);
            }
        }
    }

    Ok(JobInput {
        name,
        resource,
        passed,
        version,
    })
}

/// Collect the properties of a `pin`/`version` node into a version.
fn parse_version_props(node: &KdlNode, owner: &str) -> ConfigResult<Version> {
    let mut version = Version::new();
    for entry in node.entries() {
        let Some(key) = entry.name() else { continue };
        let value = entry
            .value()
            .as_string()
            .map(|s| s.to_string())
            .or_else(|| entry.value().as_integer().map(|i| i.to_string()))
            .ok_or_else(|| ConfigError::InvalidValue {
                field: format!("{} of '{}'", key.value(), owner),
                message: "version fields must be strings or integers".to_string(),
            })?;
        version = version.with(key.value(), value);
    }

    if version.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: format!("pinned version of '{}'", owner),
            message: "at least one version field is required".to_string(),
        });
    }
    Ok(version)
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_string_list_prop(node: &KdlNode, name: &str) -> Vec<String> {
    // Repeated attributes: passed="a" passed="b"
    node.entries()
        .iter()
        .filter(|e| e.name().is_some_and(|n| n.value() == name))
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

/// Detect cycles in the job graph formed by `passed` constraints using DFS.
fn detect_cycle(jobs: &[JobConfig]) -> Result<(), String> {
    let mut visited = HashMap::new();
    let mut rec_stack = HashMap::new();

    let upstream: HashMap<&str, Vec<&str>> = jobs
        .iter()
        .map(|j| {
            let passed = j
                .inputs
                .iter()
                .flat_map(|i| i.passed.iter().map(|p| p.as_str()))
                .collect();
            (j.name.as_str(), passed)
        })
        .collect();

    for job in jobs {
        if !visited.contains_key(job.name.as_str()) {
            if let Some(cycle) = dfs_detect_cycle(&job.name, &upstream, &mut visited, &mut rec_stack)
            {
                return Err(cycle);
            }
        }
    }
    Ok(())
}

fn dfs_detect_cycle<'a>(
    node: &'a str,
    upstream: &'a HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashMap<&'a str, bool>,
    rec_stack: &mut HashMap<&'a str, bool>,
) -> Option<String> {
    visited.insert(node, true);
    rec_stack.insert(node, true);

    if let Some(passed) = upstream.get(node) {
        for &dep in passed {
            if !visited.contains_key(dep) {
                if let Some(cycle) = dfs_detect_cycle(dep, upstream, visited, rec_stack) {
                    return Some(cycle);
                }
            } else if rec_stack.get(dep).copied().unwrap_or(false) {
                return Some(format!("{} -> {}", node, dep));
            }
        }
    }

    rec_stack.insert(node, false);
    None
}
