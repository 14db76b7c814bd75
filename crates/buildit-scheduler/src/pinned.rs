//! Resolution of pinned inputs without passed constraints.

use async_trait::async_trait;
use buildit_core::{InputConfig, ResolutionFailure};
use buildit_db::VersionsDb;
use std::sync::Arc;
use tracing::debug;

use crate::candidate::VersionCandidate;
use crate::resolver::{Resolution, Resolver};
use crate::{SchedulerError, SchedulerResult};

/// Resolves an input to its pinned version, if that version exists and is
/// enabled.
pub struct PinnedResolver {
    db: Arc<dyn VersionsDb>,
    inputs: [InputConfig; 1],
}

impl PinnedResolver {
    pub fn new(db: Arc<dyn VersionsDb>, input: InputConfig) -> Self {
        Self {
            db,
            inputs: [input],
        }
    }
}

#[async_trait]
impl Resolver for PinnedResolver {
    fn input_configs(&self) -> &[InputConfig] {
        &self.inputs
    }

    async fn resolve(&self) -> SchedulerResult<Resolution> {
        let [input] = &self.inputs;
        let pin = input
            .pinned_version()
            .ok_or_else(|| SchedulerError::NotPinned(input.name.clone()))?;

        let not_found = || {
            Resolution::failed(
                input.name.clone(),
                ResolutionFailure::PinnedVersionNotFound(pin.clone()),
            )
        };

        let Some(version) = self
            .db
            .find_version_of_resource(input.resource_id, pin)
            .await?
        else {
            debug!(input = %input.name, pin = %pin, "pinned version not found");
            return Ok(not_found());
        };

        if self
            .db
            .version_is_disabled(input.resource_id, &version)
            .await?
        {
            debug!(input = %input.name, pin = %pin, "pinned version is disabled");
            return Ok(not_found());
        }

        Ok(Resolution::single(
            input.name.clone(),
            VersionCandidate::new(version),
        ))
    }
}
