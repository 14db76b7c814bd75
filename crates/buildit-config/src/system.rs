//! Scheduler configuration parsing.

use crate::{ConfigError, ConfigResult};
use kdl::KdlDocument;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Builds fetched per page when walking a job's history.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Settings for the input resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub page_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Read and parse a scheduler configuration file.
pub fn load_scheduler_config(path: impl AsRef<Path>) -> ConfigResult<SchedulerConfig> {
    let text = std::fs::read_to_string(path)?;
    parse_scheduler_config(&text)
}

/// Parse scheduler configuration from KDL text:
///
/// ```kdl
/// scheduler {
///     page-size 100
/// }
/// ```
///
/// Missing settings keep their defaults.
pub fn parse_scheduler_config(kdl: &str) -> ConfigResult<SchedulerConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = SchedulerConfig::default();

    let Some(scheduler) = doc.get("scheduler") else {
        return Ok(config);
    };
    let Some(children) = scheduler.children() else {
        return Ok(config);
    };

    for node in children.nodes() {
        if node.name().value() == "page-size" {
            let value = node
                .entries()
                .iter()
                .find(|e| e.name().is_none())
                .and_then(|e| e.value().as_integer())
                .ok_or_else(|| ConfigError::MissingField("page-size value".to_string()))?;
            config.page_size = usize::try_from(value)
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: "page-size".to_string(),
                    message: format!("expected a positive integer, got {}", value),
                })?;
        }
    }

    Ok(config)
}
