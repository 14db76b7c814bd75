//! CLI command implementations.

pub mod resolve;

use anyhow::Result;
use std::path::Path;

pub fn validate(path: &Path) -> Result<()> {
    match buildit_config::load_pipeline(path) {
        Ok(pipeline) => {
            println!(
                "Configuration is valid: pipeline '{}' with {} resources and {} jobs",
                pipeline.name,
                pipeline.resources.len(),
                pipeline.jobs.len()
            );
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
