//! KDL configuration parsing for the BuildIt input resolver.
//!
//! This crate handles parsing of:
//! - Pipeline definitions (resources, jobs and their `get` inputs)
//! - Scheduler configuration

pub mod error;
pub mod pipeline;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use pipeline::{load_pipeline, parse_pipeline};
pub use system::{SchedulerConfig, load_scheduler_config, parse_scheduler_config};
