//! Assembly of the final input mapping from every resolver's outcome.

use buildit_core::{
    AlgorithmInput, AlgorithmVersion, InputConfig, InputMapping, InputResult, JobId,
    ResolvedInput,
};
use buildit_db::{BuildInput, VersionsDb};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info};

use crate::candidate::VersionCandidate;
use crate::construct::construct_resolvers;
use crate::SchedulerResult;

/// Result of mapping a job's inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingOutcome {
    pub mapping: InputMapping,
    /// Whether every input resolved.
    pub resolved: bool,
    /// Whether a resolved every-version input has further versions to
    /// schedule.
    pub has_next: bool,
}

/// Resolves all inputs of a job into one [`InputMapping`].
pub struct InputMapper {
    db: Arc<dyn VersionsDb>,
}

impl InputMapper {
    pub fn new(db: Arc<dyn VersionsDb>) -> Self {
        Self { db }
    }

    /// Runs a resolver per independent set of `inputs` and merges their
    /// outcomes. A failed input does not discard its resolved siblings.
    ///
    /// Store errors abort the whole mapping.
    pub async fn map_inputs(
        &self,
        job_id: JobId,
        inputs: &[InputConfig],
    ) -> SchedulerResult<MappingOutcome> {
        let resolvers = construct_resolvers(self.db.clone(), inputs);
        debug!(job_id = %job_id, inputs = inputs.len(), resolvers = resolvers.len(), "mapping inputs");

        let resolutions = try_join_all(resolvers.iter().map(|r| r.resolve())).await?;

        let latest_inputs = match self.db.latest_build_id(job_id).await? {
            Some(build_id) => self.db.build_inputs(build_id).await?,
            None => Vec::new(),
        };

        let mut mapping = InputMapping::new();
        let mut has_next = false;

        for (resolver, resolution) in resolvers.iter().zip(resolutions) {
            for input in resolver.input_configs() {
                let failure = resolution
                    .failure
                    .as_ref()
                    .filter(|f| f.input == input.name);

                let result = match (failure, resolution.candidates.get(&input.name)) {
                    (Some(failure), _) => InputResult::Failed(failure.reason.clone()),
                    (None, Some(candidate)) => {
                        has_next |= candidate.has_next_every_version;
                        InputResult::Resolved(resolved_input(input, candidate, &latest_inputs))
                    }
                    (None, None) => InputResult::Skipped,
                };

                if let InputResult::Failed(reason) = &result {
                    debug!(input = %input.name, reason = %reason, "input not resolved");
                }
                mapping.insert(input.name.clone(), result);
            }
        }

        let resolved = mapping.values().all(InputResult::is_resolved);
        info!(job_id = %job_id, resolved, has_next, "mapped inputs");

        Ok(MappingOutcome {
            mapping,
            resolved,
            has_next,
        })
    }
}

fn resolved_input(
    input: &InputConfig,
    candidate: &VersionCandidate,
    latest_inputs: &[BuildInput],
) -> ResolvedInput {
    let first_occurrence = !latest_inputs
        .iter()
        .any(|used| used.name == input.name && used.version == candidate.version);

    ResolvedInput {
        input: AlgorithmInput {
            version: AlgorithmVersion::new(input.resource_id, candidate.version.clone()),
            first_occurrence,
        },
        passed_build_ids: candidate.source_build_ids.clone(),
    }
}
