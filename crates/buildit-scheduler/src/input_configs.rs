//! Translation of a job's declared inputs into resolver input configs.

use buildit_core::{
    InputConfig, InputConfigs, JobId, JobSet, Pipeline, PipelineIds, VersionConfig, VersionPolicy,
};
use tracing::debug;

use crate::SchedulerResult;

/// Builds the input configs of `job_name`, resolving resource and job names
/// to their database IDs.
///
/// A version pinned on the input wins over one pinned on the resource, and
/// either pin wins over the input's `latest` or `every` strategy.
pub fn build_input_configs(
    pipeline: &Pipeline,
    job_name: &str,
    ids: &PipelineIds,
) -> SchedulerResult<(JobId, InputConfigs)> {
    let job = pipeline.job(job_name)?;
    let job_id = ids.job_id(&job.name)?;

    let mut configs = Vec::with_capacity(job.inputs.len());
    for input in &job.inputs {
        let resource = pipeline.resource(&input.resource)?;

        let passed = input
            .passed
            .iter()
            .map(|name| ids.job_id(name))
            .collect::<buildit_core::Result<JobSet>>()?;

        let policy = match (&input.version, &resource.pinned_version) {
            (VersionConfig::Pinned(version), _) => VersionPolicy::Pinned(version.clone()),
            (_, Some(version)) => VersionPolicy::Pinned(version.clone()),
            (VersionConfig::Every, None) => VersionPolicy::Every,
            (VersionConfig::Latest, None) => VersionPolicy::Latest,
        };

        configs.push(InputConfig {
            name: input.name.clone(),
            resource_id: ids.resource_id(&resource.name)?,
            job_id,
            passed,
            policy,
        });
    }

    debug!(job = %job_name, job_id = %job_id, inputs = configs.len(), "built input configs");
    Ok((job_id, configs))
}
