//! Resolution of inputs with neither passed constraints nor a pin.

use async_trait::async_trait;
use buildit_core::{InputConfig, ResolutionFailure};
use buildit_db::VersionsDb;
use std::sync::Arc;
use tracing::debug;

use crate::candidate::VersionCandidate;
use crate::resolver::{Resolution, Resolver};
use crate::SchedulerResult;

/// Resolves an input to the latest version of its resource, or with the
/// every policy, to the version after the newest one the job has used.
pub struct IndividualResolver {
    db: Arc<dyn VersionsDb>,
    inputs: [InputConfig; 1],
}

impl IndividualResolver {
    pub fn new(db: Arc<dyn VersionsDb>, input: InputConfig) -> Self {
        Self {
            db,
            inputs: [input],
        }
    }

    async fn latest(&self, input: &InputConfig) -> SchedulerResult<Resolution> {
        match self.db.latest_version_of_resource(input.resource_id).await? {
            Some(version) => Ok(Resolution::single(
                input.name.clone(),
                VersionCandidate::new(version),
            )),
            None => {
                debug!(input = %input.name, resource_id = %input.resource_id, "resource has no versions");
                Ok(Resolution::failed(
                    input.name.clone(),
                    ResolutionFailure::LatestVersionNotFound,
                ))
            }
        }
    }

    async fn next_every(&self, input: &InputConfig) -> SchedulerResult<Resolution> {
        let Some(build_id) = self
            .db
            .latest_build_using_latest_version(input.job_id, input.resource_id)
            .await?
        else {
            // The job never fetched the resource: start the sequence at the latest version.
            return self.latest(input).await;
        };

        match self
            .db
            .next_every_version(input.job_id, input.resource_id)
            .await?
        {
            Some(every) => Ok(Resolution::single(
                input.name.clone(),
                VersionCandidate::new(every.version).with_has_next(every.has_next),
            )),
            None => {
                debug!(input = %input.name, build_id = %build_id, "no version after the newest one used");
                Ok(Resolution::failed(
                    input.name.clone(),
                    ResolutionFailure::VersionNotFound,
                ))
            }
        }
    }
}

#[async_trait]
impl Resolver for IndividualResolver {
    fn input_configs(&self) -> &[InputConfig] {
        &self.inputs
    }

    async fn resolve(&self) -> SchedulerResult<Resolution> {
        let [input] = &self.inputs;
        if input.uses_every_version() {
            self.next_every(input).await
        } else {
            self.latest(input).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildit_core::{BuildId, BuildStatus, JobId, JobSet, ResourceId, Version, VersionPolicy};
    use buildit_db::MemoryVersionsDb;

    const JOB: JobId = JobId::new(1);
    const OTHER_JOB: JobId = JobId::new(2);
    const REPO: ResourceId = ResourceId::new(1);

    fn v(name: &str) -> Version {
        Version::single("ver", name)
    }

    fn b(id: i64) -> BuildId {
        BuildId::new(id)
    }

    fn input(policy: VersionPolicy) -> InputConfig {
        InputConfig {
            name: "repo".to_string(),
            resource_id: REPO,
            job_id: JOB,
            passed: JobSet::new(),
            policy,
        }
    }

    async fn resolve(db: MemoryVersionsDb, policy: VersionPolicy) -> Resolution {
        IndividualResolver::new(Arc::new(db), input(policy))
            .resolve()
            .await
            .expect("Should resolve without store errors")
    }

    #[tokio::test]
    async fn test_latest_skips_disabled_versions() {
        let db = MemoryVersionsDb::builder()
            .version(REPO, v("rxv1"), 1)
            .version(REPO, v("rxv2"), 2)
            .disabled_version(REPO, v("rxv3"), 3)
            .build()
            .unwrap();

        let resolution = resolve(db, VersionPolicy::Latest).await;
        assert_eq!(resolution.candidates["repo"].version, v("rxv2").digest());
    }

    #[tokio::test]
    async fn test_latest_without_versions_fails() {
        let db = MemoryVersionsDb::builder().build().unwrap();
        let resolution = resolve(db, VersionPolicy::Latest).await;
        assert_eq!(
            resolution.failure.map(|f| f.reason),
            Some(ResolutionFailure::LatestVersionNotFound)
        );
    }

    #[tokio::test]
    async fn test_every_advances_one_version_at_a_time() {
        let history = || {
            MemoryVersionsDb::builder()
                .version(REPO, v("rxv1"), 1)
                .version(REPO, v("rxv2"), 2)
                .disabled_version(REPO, v("rxv3"), 3)
                .version(REPO, v("rxv4"), 4)
                .version(REPO, v("rxv5"), 5)
                .succeeded(JOB, b(1))
                .input(b(1), "repo", REPO, v("rxv1"))
        };

        let resolution = resolve(history().build().unwrap(), VersionPolicy::Every).await;
        let candidate = &resolution.candidates["repo"];
        assert_eq!(candidate.version, v("rxv2").digest());
        assert!(candidate.has_next_every_version);

        let after_rxv2 = history()
            .succeeded(JOB, b(2))
            .input(b(2), "repo", REPO, v("rxv2"))
            .build()
            .unwrap();
        let resolution = resolve(after_rxv2, VersionPolicy::Every).await;
        let candidate = &resolution.candidates["repo"];
        assert_eq!(candidate.version, v("rxv4").digest());
        assert!(candidate.has_next_every_version);

        let after_rxv5 = history()
            .succeeded(JOB, b(2))
            .input(b(2), "repo", REPO, v("rxv5"))
            .build()
            .unwrap();
        let resolution = resolve(after_rxv5, VersionPolicy::Every).await;
        assert_eq!(
            resolution.failure.map(|f| f.reason),
            Some(ResolutionFailure::VersionNotFound)
        );
    }

    #[tokio::test]
    async fn test_every_ignores_reruns_and_other_jobs() {
        let db = MemoryVersionsDb::builder()
            .version(REPO, v("rxv1"), 1)
            .version(REPO, v("rxv2"), 2)
            .version(REPO, v("rxv3"), 3)
            .succeeded(JOB, b(1))
            .input(b(1), "repo", REPO, v("rxv1"))
            .rerun(JOB, b(2), b(1), BuildStatus::Succeeded)
            .input(b(2), "repo", REPO, v("rxv2"))
            .succeeded(OTHER_JOB, b(3))
            .input(b(3), "repo", REPO, v("rxv3"))
            .build()
            .unwrap();

        let resolution = resolve(db, VersionPolicy::Every).await;
        assert_eq!(resolution.candidates["repo"].version, v("rxv2").digest());
    }

    #[tokio::test]
    async fn test_every_cursors_from_newest_version_used() {
        // The job went back to rxv1 after rxv2, e.g. while pinned.
        let db = MemoryVersionsDb::builder()
            .version(REPO, v("rxv1"), 1)
            .version(REPO, v("rxv2"), 2)
            .version(REPO, v("rxv3"), 3)
            .version(REPO, v("rxv4"), 4)
            .succeeded(JOB, b(100))
            .input(b(100), "repo", REPO, v("rxv1"))
            .succeeded(JOB, b(101))
            .input(b(101), "repo", REPO, v("rxv2"))
            .succeeded(JOB, b(102))
            .input(b(102), "repo", REPO, v("rxv1"))
            .build()
            .unwrap();

        let resolution = resolve(db, VersionPolicy::Every).await;
        let candidate = &resolution.candidates["repo"];
        assert_eq!(candidate.version, v("rxv3").digest());
        assert!(candidate.has_next_every_version);
    }

    #[tokio::test]
    async fn test_every_ignores_same_resource_in_another_job() {
        let db = MemoryVersionsDb::builder()
            .version(REPO, v("rxv1"), 1)
            .version(REPO, v("rxv2"), 2)
            .version(REPO, v("rxv3"), 3)
            .succeeded(OTHER_JOB, b(1))
            .input(b(1), "repo", REPO, v("rxv3"))
            .succeeded(JOB, b(2))
            .input(b(2), "repo", REPO, v("rxv1"))
            .succeeded(OTHER_JOB, b(3))
            .input(b(3), "repo", REPO, v("rxv2"))
            .build()
            .unwrap();

        let resolution = resolve(db, VersionPolicy::Every).await;
        let candidate = &resolution.candidates["repo"];
        assert_eq!(candidate.version, v("rxv2").digest());
        assert!(candidate.has_next_every_version);
    }

    #[tokio::test]
    async fn test_every_without_builds_seeds_with_latest() {
        let db = MemoryVersionsDb::builder()
            .version(REPO, v("rxv1"), 1)
            .version(REPO, v("rxv2"), 2)
            .build()
            .unwrap();

        let resolution = resolve(db, VersionPolicy::Every).await;
        let candidate = &resolution.candidates["repo"];
        assert_eq!(candidate.version, v("rxv2").digest());
        assert!(!candidate.has_next_every_version);

        let empty = MemoryVersionsDb::builder().build().unwrap();
        let resolution = resolve(empty, VersionPolicy::Every).await;
        assert_eq!(
            resolution.failure.map(|f| f.reason),
            Some(ResolutionFailure::LatestVersionNotFound)
        );
    }
}
