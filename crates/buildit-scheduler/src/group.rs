//! Resolution of inputs correlated through shared passed jobs.
//!
//! The search walks each passed job's successful builds, proposes the
//! versions those builds used or produced as candidates for every related
//! input, and recurses until every input is vouched for by all of its passed
//! jobs. A build whose versions conflict with candidates already chosen is
//! skipped, and the tentative assignments it made are rolled back before the
//! next build is tried.

use async_recursion::async_recursion;
use async_trait::async_trait;
use buildit_core::{
    AlgorithmVersion, BuildCursor, BuildId, InputConfig, JobId, ResolutionFailure,
    ResourceId, ResourceVersion, input_names,
};
use buildit_db::{PaginatedBuilds, VersionConstraints, VersionsDb};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::candidate::VersionCandidate;
use crate::resolver::{Resolution, Resolver};
use crate::SchedulerResult;

/// Resolves a group of inputs whose passed constraints overlap.
pub struct GroupResolver {
    db: Arc<dyn VersionsDb>,
    inputs: Vec<InputConfig>,
}

impl GroupResolver {
    pub fn new(db: Arc<dyn VersionsDb>, inputs: Vec<InputConfig>) -> Self {
        Self { db, inputs }
    }
}

#[async_trait]
impl Resolver for GroupResolver {
    fn input_configs(&self) -> &[InputConfig] {
        &self.inputs
    }

    async fn resolve(&self) -> SchedulerResult<Resolution> {
        let mut search = GroupSearch::new(self.db.clone(), self.inputs.clone());

        for (index, input) in self.inputs.iter().enumerate() {
            let Some(pin) = input.pinned_version() else {
                continue;
            };
            match self
                .db
                .find_version_of_resource(input.resource_id, pin)
                .await?
            {
                Some(version) => search.pins[index] = Some(version),
                None => {
                    debug!(input = %input.name, pin = %pin, "pinned version not found");
                    return Ok(Resolution::failed(
                        input.name.clone(),
                        ResolutionFailure::PinnedVersionNotFound(pin.clone()),
                    ));
                }
            }
        }

        if search.try_resolve().await? {
            debug!(inputs = %input_names(&self.inputs), "resolved group");
            return Ok(Resolution::resolved(search.named(search.candidates.clone())));
        }

        let failed_index = search
            .failed_input
            .or_else(|| search.partial.iter().position(Option::is_none))
            .unwrap_or(0);
        search.partial[failed_index] = None;
        let failed = &self.inputs[failed_index];
        debug!(inputs = %input_names(&self.inputs), failed = %failed.name, "group has no satisfiable builds");
        Ok(
            Resolution::failed(failed.name.clone(), ResolutionFailure::NoSatisfiableBuilds)
                .with_partial(search.named(search.partial.clone())),
        )
    }
}

/// How a build output bears on one input's candidate.
enum OutputRelation {
    /// Different resource, or the input does not pass through the job.
    Unrelated,
    /// The output conflicts with the candidate, so the whole build is unusable.
    Mismatch,
    Matches,
}

/// State of one resolution attempt.
struct GroupSearch {
    db: Arc<dyn VersionsDb>,
    inputs: Vec<InputConfig>,
    /// Resolved pins, by input index.
    pins: Vec<Option<ResourceVersion>>,
    candidates: Vec<Option<VersionCandidate>>,
    /// Fully vouched candidates found so far, reported when resolution fails.
    partial: Vec<Option<VersionCandidate>>,
    /// Candidate versions of the last combination that failed to resolve.
    doomed: Vec<Option<ResourceVersion>>,
    /// Upstream builds that fed the job's build using the newest version of
    /// each resource, loaded on first use.
    last_used_passed_builds: BTreeMap<ResourceId, BTreeMap<JobId, BuildCursor>>,
    /// First input that exhausted its builds without ever being fully vouched.
    failed_input: Option<usize>,
}

impl GroupSearch {
    fn new(db: Arc<dyn VersionsDb>, inputs: Vec<InputConfig>) -> Self {
        let n = inputs.len();
        Self {
            db,
            inputs,
            pins: vec![None; n],
            candidates: vec![None; n],
            partial: vec![None; n],
            doomed: vec![None; n],
            last_used_passed_builds: BTreeMap::new(),
            failed_input: None,
        }
    }

    fn named(&self, candidates: Vec<Option<VersionCandidate>>) -> BTreeMap<String, VersionCandidate> {
        self.inputs
            .iter()
            .zip(candidates)
            .filter_map(|(input, candidate)| Some((input.name.clone(), candidate?)))
            .collect()
    }

    #[async_recursion]
    async fn try_resolve(&mut self) -> SchedulerResult<bool> {
        for index in 0..self.inputs.len() {
            if !self.try_satisfy_passed_constraints(index).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn try_satisfy_passed_constraints(&mut self, index: usize) -> SchedulerResult<bool> {
        let passed: Vec<JobId> = self.inputs[index].passed.iter().copied().collect();

        for job_id in passed {
            if self.candidates[index]
                .as_ref()
                .is_some_and(|c| c.is_vouched_for_by(job_id))
            {
                continue;
            }

            let Some(builds) = self.paginated_builds(index, job_id).await? else {
                debug!(input = %self.inputs[index].name, job_id = %job_id, "deferring selection to other jobs");
                continue;
            };

            if self.try_job_builds(index, job_id, builds).await? {
                break;
            }

            if self.failed_input.is_none() && self.partial[index].is_none() {
                self.failed_input = Some(index);
            }
            return Ok(false);
        }

        Ok(true)
    }

    async fn try_job_builds(
        &mut self,
        index: usize,
        job_id: JobId,
        mut builds: PaginatedBuilds,
    ) -> SchedulerResult<bool> {
        while let Some(build) = builds.next().await? {
            if self
                .try_build_outputs(index, job_id, build.id, builds.has_next())
                .await?
            {
                return Ok(true);
            }
        }

        debug!(input = %self.inputs[index].name, job_id = %job_id, "exhausted builds of passed job");
        Ok(false)
    }

    async fn try_build_outputs(
        &mut self,
        resolving: usize,
        job_id: JobId,
        build_id: BuildId,
        has_next: bool,
    ) -> SchedulerResult<bool> {
        let outputs = self.db.successful_build_outputs(build_id).await?;

        // Candidates replaced by this build, restored unless it resolves.
        let mut restore: BTreeMap<usize, Option<VersionCandidate>> = BTreeMap::new();
        let mut mismatch = false;

        'outputs: for output in &outputs {
            for c in 0..self.candidates.len() {
                if restore.contains_key(&c) {
                    continue;
                }

                match self.relate_output(output, c, job_id).await? {
                    OutputRelation::Unrelated => continue,
                    OutputRelation::Mismatch => {
                        mismatch = true;
                        break 'outputs;
                    }
                    OutputRelation::Matches => {}
                }

                if self.candidates[c].is_none()
                    && !self
                        .db
                        .version_exists(output.resource_id, &output.version)
                        .await?
                {
                    debug!(build_id = %build_id, resource_id = %output.resource_id, "build output version is unknown");
                    mismatch = true;
                    break 'outputs;
                }

                let previous = self.candidates[c].take();
                let candidate = VersionCandidate::vouched(
                    previous.as_ref(),
                    output.version.clone(),
                    job_id,
                    build_id,
                    has_next,
                );
                restore.insert(c, previous);

                if candidate.satisfies(&self.inputs[c].passed) {
                    self.partial[c] = Some(candidate.clone());
                }
                self.candidates[c] = Some(candidate);
            }
        }

        let vouched = self.candidates[resolving]
            .as_ref()
            .is_some_and(|c| c.is_vouched_for_by(job_id));

        if vouched && !mismatch {
            if self.candidates_are_doomed() {
                debug!(build_id = %build_id, "skipping combination that already failed");
            } else {
                if self.try_resolve().await? {
                    return Ok(true);
                }
                self.doom_candidates();
            }
        }

        if !restore.is_empty() {
            debug!(build_id = %build_id, restored = restore.len(), mismatch, "rolling back candidates");
        }
        for (c, previous) in restore {
            self.candidates[c] = previous;
        }

        Ok(false)
    }

    async fn relate_output(
        &self,
        output: &AlgorithmVersion,
        c: usize,
        job_id: JobId,
    ) -> SchedulerResult<OutputRelation> {
        let input = &self.inputs[c];
        if input.resource_id != output.resource_id || !input.passed.contains(&job_id) {
            return Ok(OutputRelation::Unrelated);
        }

        if let Some(candidate) = &self.candidates[c] {
            if candidate.version != output.version {
                return Ok(OutputRelation::Mismatch);
            }
        }

        if self
            .db
            .version_is_disabled(output.resource_id, &output.version)
            .await?
        {
            debug!(input = %input.name, version = %output.version, "version disabled");
            return Ok(OutputRelation::Mismatch);
        }

        if let Some(pin) = &self.pins[c] {
            if pin != &output.version {
                debug!(input = %input.name, output = %output.version, pin = %pin, "pin mismatch");
                return Ok(OutputRelation::Mismatch);
            }
        }

        Ok(OutputRelation::Matches)
    }

    /// Builds of `job_id` to try for input `index`, or `None` when the choice
    /// should be left to the input's other passed jobs.
    async fn paginated_builds(
        &mut self,
        index: usize,
        job_id: JobId,
    ) -> SchedulerResult<Option<PaginatedBuilds>> {
        let constraints = self.constraining_candidates(job_id);
        let has_candidate = self.candidates[index].is_some();
        let job_being_scheduled = self.inputs[index].job_id;
        let resource_id = self.inputs[index].resource_id;

        if self.inputs[index].uses_every_version() {
            if !self.last_used_passed_builds.contains_key(&resource_id) {
                let last_used = match self
                    .db
                    .latest_build_using_latest_version(job_being_scheduled, resource_id)
                    .await?
                {
                    Some(build_id) => self.db.latest_build_pipes(build_id).await?,
                    None => BTreeMap::new(),
                };
                self.last_used_passed_builds.insert(resource_id, last_used);
            }

            let input = &self.inputs[index];
            let related: BTreeMap<JobId, BuildCursor> = self
                .last_used_passed_builds
                .get(&resource_id)
                .into_iter()
                .flatten()
                .map(|(passed_job, build)| (*passed_job, *build))
                .filter(|(passed_job, _)| input.passed.contains(passed_job))
                .collect();

            if let Some(last_used_build) = related.get(&job_id) {
                let builds = if has_candidate {
                    self.db
                        .unused_builds_version_constrained(job_id, *last_used_build, &constraints)
                        .await?
                } else {
                    self.db.unused_builds(job_id, *last_used_build).await?
                };
                return Ok(Some(builds));
            }

            if !has_candidate && !related.is_empty() {
                return Ok(None);
            }
        }

        let builds = if has_candidate {
            self.db
                .successful_builds_version_constrained(job_id, &constraints)
                .await?
        } else {
            self.db.successful_builds(job_id).await?
        };
        Ok(Some(builds))
    }

    /// Versions already chosen for inputs that pass through `job_id`.
    fn constraining_candidates(&self, job_id: JobId) -> VersionConstraints {
        let mut constraints = VersionConstraints::new();
        for (input, candidate) in self.inputs.iter().zip(&self.candidates) {
            let Some(candidate) = candidate else { continue };
            if input.passed.contains(&job_id) {
                constraints
                    .entry(input.resource_id)
                    .or_default()
                    .insert(candidate.version.clone());
            }
        }
        constraints
    }

    fn candidates_are_doomed(&self) -> bool {
        self.candidates
            .iter()
            .zip(&self.doomed)
            .all(|(candidate, doomed)| candidate.as_ref().map(|c| &c.version) == doomed.as_ref())
    }

    fn doom_candidates(&mut self) {
        self.doomed = self
            .candidates
            .iter()
            .map(|c| c.as_ref().map(|c| c.version.clone()))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildit_core::{BuildStatus, JobSet, Version, VersionPolicy};
    use buildit_db::{MemoryVersionsDb, MemoryVersionsDbBuilder};

    const CURRENT: JobId = JobId::new(1);
    const SIMPLE_A: JobId = JobId::new(2);
    const SIMPLE_B: JobId = JobId::new(3);
    const FAN_IN: JobId = JobId::new(4);

    const RESOURCE_X: ResourceId = ResourceId::new(1);
    const RESOURCE_Y: ResourceId = ResourceId::new(2);

    fn v(name: &str) -> Version {
        Version::single("ver", name)
    }

    fn b(id: i64) -> BuildId {
        BuildId::new(id)
    }

    fn input(name: &str, resource_id: ResourceId, passed: &[JobId]) -> InputConfig {
        InputConfig {
            name: name.to_string(),
            resource_id,
            job_id: CURRENT,
            passed: passed.iter().copied().collect::<JobSet>(),
            policy: VersionPolicy::Latest,
        }
    }

    fn every(mut config: InputConfig) -> InputConfig {
        config.policy = VersionPolicy::Every;
        config
    }

    /// A succeeded build of `job` that output the given versions.
    fn outputs(
        builder: MemoryVersionsDbBuilder,
        job: JobId,
        build: i64,
        versions: &[(ResourceId, &str)],
    ) -> MemoryVersionsDbBuilder {
        versions.iter().fold(builder.succeeded(job, b(build)), |builder, (resource, ver)| {
            builder.output(b(build), *resource, v(ver))
        })
    }

    async fn resolve(db: MemoryVersionsDb, inputs: Vec<InputConfig>) -> Resolution {
        GroupResolver::new(Arc::new(db), inputs)
            .resolve()
            .await
            .expect("Should resolve without store errors")
    }

    fn version_of(resolution: &Resolution, input: &str) -> ResourceVersion {
        resolution.candidates[input].version.clone()
    }

    #[tokio::test]
    async fn test_fan_in_picks_version_passed_by_both_jobs() {
        let mut db = MemoryVersionsDb::builder();
        db = outputs(db, SIMPLE_A, 1, &[(RESOURCE_X, "rxv1")]);
        db = outputs(db, SIMPLE_B, 2, &[(RESOURCE_X, "rxv1")]);
        db = outputs(db, SIMPLE_A, 3, &[(RESOURCE_X, "rxv2")]);

        let resolution = resolve(
            db.build().unwrap(),
            vec![input("resource-x", RESOURCE_X, &[SIMPLE_A, SIMPLE_B])],
        )
        .await;

        assert!(resolution.is_resolved());
        let candidate = &resolution.candidates["resource-x"];
        assert_eq!(candidate.version, v("rxv1").digest());
        assert_eq!(candidate.source_build_ids, vec![b(1), b(2)]);
        assert!(candidate.satisfies(&[SIMPLE_A, SIMPLE_B].into_iter().collect()));
    }

    #[tokio::test]
    async fn test_propagates_resources_together() {
        let db = outputs(
            MemoryVersionsDb::builder(),
            SIMPLE_A,
            1,
            &[(RESOURCE_X, "rxv1"), (RESOURCE_Y, "ryv1")],
        );

        let resolution = resolve(
            db.build().unwrap(),
            vec![
                input("resource-x", RESOURCE_X, &[SIMPLE_A]),
                input("resource-y", RESOURCE_Y, &[SIMPLE_A]),
            ],
        )
        .await;

        assert_eq!(version_of(&resolution, "resource-x"), v("rxv1").digest());
        assert_eq!(version_of(&resolution, "resource-y"), v("ryv1").digest());
    }

    #[tokio::test]
    async fn test_correlates_inputs_by_build() {
        let mut db = MemoryVersionsDb::builder();
        db = outputs(db, SIMPLE_A, 1, &[(RESOURCE_X, "rxv1"), (RESOURCE_Y, "ryv1")]);
        db = outputs(db, FAN_IN, 3, &[(RESOURCE_X, "rxv1")]);
        db = outputs(db, SIMPLE_A, 4, &[(RESOURCE_X, "rxv2"), (RESOURCE_Y, "ryv2")]);

        let resolution = resolve(
            db.build().unwrap(),
            vec![
                input("resource-x", RESOURCE_X, &[SIMPLE_A, FAN_IN]),
                input("resource-y", RESOURCE_Y, &[SIMPLE_A]),
            ],
        )
        .await;

        // ryv2 never made it through the build relating simple-a to fan-in.
        assert_eq!(version_of(&resolution, "resource-x"), v("rxv1").digest());
        assert_eq!(version_of(&resolution, "resource-y"), v("ryv1").digest());
    }

    #[tokio::test]
    async fn test_finds_only_versions_that_passed_through_together() {
        let mut db = MemoryVersionsDb::builder();
        db = outputs(db, SIMPLE_A, 1, &[(RESOURCE_X, "rxv1"), (RESOURCE_Y, "ryv1")]);
        db = outputs(db, SIMPLE_B, 2, &[(RESOURCE_X, "rxv1"), (RESOURCE_Y, "ryv1")]);
        db = outputs(db, SIMPLE_A, 3, &[(RESOURCE_X, "rxv3"), (RESOURCE_Y, "ryv3")]);
        db = outputs(db, SIMPLE_B, 4, &[(RESOURCE_X, "rxv3"), (RESOURCE_Y, "ryv3")]);
        db = outputs(db, SIMPLE_A, 5, &[(RESOURCE_X, "rxv2"), (RESOURCE_Y, "ryv4")]);
        db = outputs(db, SIMPLE_B, 6, &[(RESOURCE_X, "rxv4"), (RESOURCE_Y, "rxv4")]);
        db = outputs(db, SIMPLE_B, 7, &[(RESOURCE_X, "rxv4"), (RESOURCE_Y, "rxv2")]);

        let resolution = resolve(
            db.build().unwrap(),
            vec![
                input("resource-x", RESOURCE_X, &[SIMPLE_A, SIMPLE_B]),
                input("resource-y", RESOURCE_Y, &[SIMPLE_A, SIMPLE_B]),
            ],
        )
        .await;

        assert_eq!(version_of(&resolution, "resource-x"), v("rxv3").digest());
        assert_eq!(version_of(&resolution, "resource-y"), v("ryv3").digest());
        assert_eq!(resolution.candidates["resource-x"].source_build_ids, vec![b(3), b(4)]);
        assert_eq!(resolution.candidates["resource-y"].source_build_ids, vec![b(3), b(4)]);
    }

    #[tokio::test]
    async fn test_distinct_versions_without_shared_jobs() {
        let mut db = MemoryVersionsDb::builder();
        db = outputs(db, SIMPLE_A, 1, &[(RESOURCE_X, "rxv1")]);
        db = outputs(db, SIMPLE_B, 2, &[(RESOURCE_X, "rxv1")]);
        db = outputs(db, SIMPLE_B, 3, &[(RESOURCE_X, "rxv2")]);

        let resolution = resolve(
            db.build().unwrap(),
            vec![
                input("simple-a-resource-x", RESOURCE_X, &[SIMPLE_A]),
                input("simple-b-resource-x", RESOURCE_X, &[SIMPLE_B]),
            ],
        )
        .await;

        assert_eq!(version_of(&resolution, "simple-a-resource-x"), v("rxv1").digest());
        assert_eq!(version_of(&resolution, "simple-b-resource-x"), v("rxv2").digest());
    }

    #[tokio::test]
    async fn test_no_satisfiable_builds() {
        let mut db = MemoryVersionsDb::builder();
        db = outputs(db, SIMPLE_A, 1, &[(RESOURCE_X, "rxv1")]);
        db = outputs(db, SIMPLE_B, 2, &[(RESOURCE_X, "rxv2")]);

        let resolution = resolve(
            db.build().unwrap(),
            vec![input("resource-x", RESOURCE_X, &[SIMPLE_A, SIMPLE_B])],
        )
        .await;

        let failure = resolution.failure.expect("Should fail");
        assert_eq!(failure.input, "resource-x");
        assert_eq!(failure.reason, ResolutionFailure::NoSatisfiableBuilds);
        assert!(resolution.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_passed_job_without_builds_fails() {
        let db = outputs(MemoryVersionsDb::builder(), SIMPLE_A, 1, &[(RESOURCE_X, "rxv1")]);

        let resolution = resolve(
            db.build().unwrap(),
            vec![
                input("resource-x", RESOURCE_X, &[SIMPLE_A]),
                input("resource-y", RESOURCE_Y, &[SIMPLE_A, SIMPLE_B]),
            ],
        )
        .await;

        let failure = resolution.failure.clone().expect("Should fail");
        assert_eq!(failure.input, "resource-y");
        assert_eq!(failure.reason, ResolutionFailure::NoSatisfiableBuilds);
        // resource-x was fully vouched for before resource-y gave up.
        assert_eq!(version_of(&resolution, "resource-x"), v("rxv1").digest());
    }

    #[tokio::test]
    async fn test_skips_builds_with_disabled_versions() {
        let mut db = MemoryVersionsDb::builder()
            .version(RESOURCE_X, v("rxv1"), 1)
            .disabled_version(RESOURCE_X, v("rxv2"), 2);
        db = outputs(db, SIMPLE_A, 1, &[(RESOURCE_X, "rxv1")]);
        db = outputs(db, SIMPLE_A, 2, &[(RESOURCE_X, "rxv2")]);

        let resolution = resolve(
            db.build().unwrap(),
            vec![input("resource-x", RESOURCE_X, &[SIMPLE_A])],
        )
        .await;

        assert_eq!(version_of(&resolution, "resource-x"), v("rxv1").digest());
        assert_eq!(resolution.candidates["resource-x"].source_build_ids, vec![b(1)]);
    }

    #[tokio::test]
    async fn test_pinned_with_passed_uses_matching_build() {
        let mut db = MemoryVersionsDb::builder();
        db = outputs(db, SIMPLE_A, 1, &[(RESOURCE_X, "rxv1"), (RESOURCE_Y, "ryv1")]);
        db = outputs(db, SIMPLE_A, 2, &[(RESOURCE_X, "rxv2"), (RESOURCE_Y, "ryv2")]);
        db = outputs(db, SIMPLE_A, 3, &[(RESOURCE_X, "rxv3"), (RESOURCE_Y, "ryv3")]);

        let mut pinned = input("resource-x", RESOURCE_X, &[SIMPLE_A]);
        pinned.policy = VersionPolicy::Pinned(v("rxv2"));

        let resolution = resolve(
            db.build().unwrap(),
            vec![pinned, input("resource-y", RESOURCE_Y, &[SIMPLE_A])],
        )
        .await;

        assert_eq!(version_of(&resolution, "resource-x"), v("rxv2").digest());
        assert_eq!(version_of(&resolution, "resource-y"), v("ryv2").digest());
    }

    #[tokio::test]
    async fn test_pin_not_passed_fails() {
        let db = outputs(MemoryVersionsDb::builder(), SIMPLE_A, 1, &[(RESOURCE_X, "rxv1")])
            .version(RESOURCE_X, v("rxv2"), 5);

        let mut pinned = input("resource-x", RESOURCE_X, &[SIMPLE_A]);
        pinned.policy = VersionPolicy::Pinned(v("rxv2"));
        let resolution = resolve(db.build().unwrap(), vec![pinned.clone()]).await;
        assert_eq!(
            resolution.failure.map(|f| f.reason),
            Some(ResolutionFailure::NoSatisfiableBuilds)
        );

        let db = outputs(MemoryVersionsDb::builder(), SIMPLE_A, 1, &[(RESOURCE_X, "rxv1")]);
        pinned.policy = VersionPolicy::Pinned(v("rxv9"));
        let resolution = resolve(db.build().unwrap(), vec![pinned]).await;
        assert_eq!(
            resolution.failure.map(|f| f.reason),
            Some(ResolutionFailure::PinnedVersionNotFound(v("rxv9")))
        );
    }

    #[tokio::test]
    async fn test_failed_builds_do_not_vouch() {
        let db = outputs(MemoryVersionsDb::builder(), SIMPLE_A, 1, &[(RESOURCE_X, "rxv1")])
            .job_build(SIMPLE_A, b(2), BuildStatus::Failed)
            .output(b(2), RESOURCE_X, v("rxv2"));

        let resolution = resolve(
            db.build().unwrap(),
            vec![input("resource-x", RESOURCE_X, &[SIMPLE_A])],
        )
        .await;
        assert_eq!(version_of(&resolution, "resource-x"), v("rxv1").digest());
    }

    #[tokio::test]
    async fn test_every_with_passed_takes_next_unused_build() {
        let mut db = MemoryVersionsDb::builder();
        db = outputs(db, SIMPLE_A, 1, &[(RESOURCE_X, "rxv1")]);
        db = outputs(db, SIMPLE_A, 2, &[(RESOURCE_X, "rxv2")]);
        db = outputs(db, SIMPLE_A, 3, &[(RESOURCE_X, "rxv3")]);
        let db = db
            .succeeded(CURRENT, b(10))
            .input(b(10), "resource-x", RESOURCE_X, v("rxv1"))
            .pipe(b(1), b(10));

        let resolution = resolve(
            db.build().unwrap(),
            vec![every(input("resource-x", RESOURCE_X, &[SIMPLE_A]))],
        )
        .await;

        let candidate = &resolution.candidates["resource-x"];
        assert_eq!(candidate.version, v("rxv2").digest());
        assert!(candidate.has_next_every_version);
    }

    #[tokio::test]
    async fn test_every_with_passed_has_no_next_when_caught_up() {
        let mut db = MemoryVersionsDb::builder();
        db = outputs(db, SIMPLE_A, 1, &[(RESOURCE_X, "rxv1")]);
        db = outputs(db, SIMPLE_A, 2, &[(RESOURCE_X, "rxv2")]);
        let db = db
            .succeeded(CURRENT, b(10))
            .input(b(10), "resource-x", RESOURCE_X, v("rxv2"))
            .pipe(b(2), b(10));

        let resolution = resolve(
            db.build().unwrap(),
            vec![every(input("resource-x", RESOURCE_X, &[SIMPLE_A]))],
        )
        .await;

        let candidate = &resolution.candidates["resource-x"];
        assert_eq!(candidate.version, v("rxv2").digest());
        assert!(!candidate.has_next_every_version);
    }

    #[tokio::test]
    async fn test_every_with_passed_last_unused_build_has_no_next() {
        let mut db = MemoryVersionsDb::builder();
        db = outputs(db, SIMPLE_A, 1, &[(RESOURCE_X, "rxv1")]);
        db = outputs(db, SIMPLE_A, 2, &[(RESOURCE_X, "rxv2")]);
        let db = db
            .succeeded(CURRENT, b(10))
            .input(b(10), "resource-x", RESOURCE_X, v("rxv1"))
            .pipe(b(1), b(10));

        let resolution = resolve(
            db.build().unwrap(),
            vec![every(input("resource-x", RESOURCE_X, &[SIMPLE_A]))],
        )
        .await;

        let candidate = &resolution.candidates["resource-x"];
        assert_eq!(candidate.version, v("rxv2").digest());
        assert!(!candidate.has_next_every_version);
    }

    #[tokio::test]
    async fn test_every_with_passed_ignores_rerun_as_latest_build() {
        let mut db = MemoryVersionsDb::builder();
        db = outputs(db, SIMPLE_A, 1, &[(RESOURCE_X, "rxv1")]);
        db = outputs(db, SIMPLE_A, 2, &[(RESOURCE_X, "rxv2")]);
        db = outputs(db, SIMPLE_A, 3, &[(RESOURCE_X, "rxv3")]);
        db = outputs(db, SIMPLE_A, 4, &[(RESOURCE_X, "rxv4")]);
        let db = db
            .succeeded(CURRENT, b(10))
            .input(b(10), "resource-x", RESOURCE_X, v("rxv3"))
            .pipe(b(3), b(10))
            .rerun(CURRENT, b(11), b(10), BuildStatus::Succeeded)
            .input(b(11), "resource-x", RESOURCE_X, v("rxv1"))
            .pipe(b(1), b(11));

        let resolution = resolve(
            db.build().unwrap(),
            vec![every(input("resource-x", RESOURCE_X, &[SIMPLE_A]))],
        )
        .await;

        assert_eq!(version_of(&resolution, "resource-x"), v("rxv4").digest());
    }

    #[tokio::test]
    async fn test_every_with_passed_cursors_from_newest_version_used() {
        let mut db = MemoryVersionsDb::builder();
        for (build, ver) in [(1, "rxv1"), (2, "rxv2"), (3, "rxv3"), (4, "rxv4")] {
            db = outputs(db, SIMPLE_A, build, &[(RESOURCE_X, ver)]);
        }
        // The job went back to rxv1 after rxv2, e.g. while pinned.
        let db = db
            .succeeded(CURRENT, b(100))
            .input(b(100), "resource-x", RESOURCE_X, v("rxv1"))
            .pipe(b(1), b(100))
            .succeeded(CURRENT, b(101))
            .input(b(101), "resource-x", RESOURCE_X, v("rxv2"))
            .pipe(b(2), b(101))
            .succeeded(CURRENT, b(102))
            .input(b(102), "resource-x", RESOURCE_X, v("rxv1"))
            .pipe(b(1), b(102));

        let resolution = resolve(
            db.build().unwrap(),
            vec![every(input("resource-x", RESOURCE_X, &[SIMPLE_A]))],
        )
        .await;

        let candidate = &resolution.candidates["resource-x"];
        assert_eq!(candidate.version, v("rxv3").digest());
        assert_eq!(candidate.source_build_ids, vec![b(3)]);
        assert!(candidate.has_next_every_version);
    }

    #[tokio::test]
    async fn test_every_with_passed_ignores_other_job_using_same_resource() {
        let mut db = MemoryVersionsDb::builder();
        for (build, ver) in [(1, "rxv1"), (2, "rxv2"), (3, "rxv3"), (4, "rxv4")] {
            db = outputs(db, SIMPLE_A, build, &[(RESOURCE_X, ver)]);
        }
        let db = db
            .succeeded(CURRENT, b(100))
            .input(b(100), "resource-x", RESOURCE_X, v("rxv1"))
            .pipe(b(1), b(100))
            .succeeded(FAN_IN, b(101))
            .input(b(101), "resource-x", RESOURCE_X, v("rxv4"))
            .pipe(b(4), b(101));

        let resolution = resolve(
            db.build().unwrap(),
            vec![every(input("resource-x", RESOURCE_X, &[SIMPLE_A]))],
        )
        .await;

        assert_eq!(version_of(&resolution, "resource-x"), v("rxv2").digest());
    }

    #[tokio::test]
    async fn test_every_with_passed_ignores_upstream_rerun() {
        let mut db = MemoryVersionsDb::builder();
        for (build, ver) in [(1, "rxv1"), (2, "rxv2"), (3, "rxv3"), (4, "rxv4")] {
            db = outputs(db, SIMPLE_A, build, &[(RESOURCE_X, ver)]);
        }
        // The rerun of build 2 has a higher ID than the last used build 4.
        let db = db
            .rerun(SIMPLE_A, b(5), b(2), BuildStatus::Succeeded)
            .output(b(5), RESOURCE_X, v("rxv2"))
            .succeeded(CURRENT, b(100))
            .input(b(100), "resource-x", RESOURCE_X, v("rxv4"))
            .pipe(b(4), b(100));

        let resolution = resolve(
            db.build().unwrap(),
            vec![every(input("resource-x", RESOURCE_X, &[SIMPLE_A]))],
        )
        .await;

        assert!(resolution.is_resolved());
        let candidate = &resolution.candidates["resource-x"];
        assert_eq!(candidate.version, v("rxv4").digest());
        assert_eq!(candidate.source_build_ids, vec![b(4)]);
        assert!(!candidate.has_next_every_version);
    }

    #[tokio::test]
    async fn test_every_with_passed_ignores_upstream_reruns_of_each_job() {
        let mut db = MemoryVersionsDb::builder();
        for (build, ver) in [(1, "rxv1"), (2, "rxv2"), (3, "rxv3"), (4, "rxv4")] {
            db = outputs(db, SIMPLE_A, build, &[(RESOURCE_X, ver)]);
        }
        for (build, ver) in [(6, "rxv1"), (7, "rxv2"), (8, "rxv3"), (9, "rxv4")] {
            db = outputs(db, SIMPLE_B, build, &[(RESOURCE_X, ver)]);
        }
        let db = db
            .rerun(SIMPLE_A, b(5), b(2), BuildStatus::Succeeded)
            .output(b(5), RESOURCE_X, v("rxv2"))
            .rerun(SIMPLE_B, b(10), b(7), BuildStatus::Succeeded)
            .output(b(10), RESOURCE_X, v("rxv2"))
            .succeeded(CURRENT, b(100))
            .input(b(100), "resource-x", RESOURCE_X, v("rxv4"))
            .pipe(b(4), b(100))
            .pipe(b(9), b(100));

        let resolution = resolve(
            db.build().unwrap(),
            vec![every(input("resource-x", RESOURCE_X, &[SIMPLE_A, SIMPLE_B]))],
        )
        .await;

        assert!(resolution.is_resolved());
        let candidate = &resolution.candidates["resource-x"];
        assert_eq!(candidate.version, v("rxv4").digest());
        assert_eq!(candidate.source_build_ids, vec![b(4), b(9)]);
    }

    #[tokio::test]
    async fn test_every_defers_job_that_never_fed_the_current_job() {
        let mut db = MemoryVersionsDb::builder();
        db = outputs(db, SIMPLE_A, 1, &[(RESOURCE_X, "rxv1")]);
        db = outputs(db, SIMPLE_A, 2, &[(RESOURCE_X, "rxv2")]);
        db = outputs(db, SIMPLE_B, 4, &[(RESOURCE_X, "rxv1")]);
        db = outputs(db, SIMPLE_B, 5, &[(RESOURCE_X, "rxv2")]);
        db = outputs(db, SIMPLE_B, 6, &[(RESOURCE_X, "rxv3")]);
        let db = db
            .succeeded(CURRENT, b(10))
            .input(b(10), "resource-x", RESOURCE_X, v("rxv1"))
            .pipe(b(4), b(10));

        let resolution = resolve(
            db.build().unwrap(),
            vec![every(input("resource-x", RESOURCE_X, &[SIMPLE_A, SIMPLE_B]))],
        )
        .await;

        // simple-a waits for simple-b to pick the next unused build, then
        // vouches for the same version.
        let candidate = &resolution.candidates["resource-x"];
        assert_eq!(candidate.version, v("rxv2").digest());
        assert_eq!(candidate.source_build_ids, vec![b(5), b(2)]);
        assert!(candidate.has_next_every_version);
    }

    #[tokio::test]
    async fn test_page_size_does_not_change_the_result() {
        let history = |page_size: usize| {
            let mut db = MemoryVersionsDb::builder().page_size(page_size);
            for build in 1..=9 {
                let name = format!("rxv{}", build);
                db = outputs(db, SIMPLE_A, build, &[(RESOURCE_X, name.as_str())]);
            }
            db = outputs(db, SIMPLE_B, 20, &[(RESOURCE_X, "rxv2")]);
            db.build().unwrap()
        };

        for page_size in [1, 2, 100] {
            let resolution = resolve(
                history(page_size),
                vec![input("resource-x", RESOURCE_X, &[SIMPLE_A, SIMPLE_B])],
            )
            .await;
            assert_eq!(version_of(&resolution, "resource-x"), v("rxv2").digest());
            assert_eq!(resolution.candidates["resource-x"].source_build_ids, vec![b(2), b(20)]);
        }
    }

    #[tokio::test]
    async fn test_builds_without_outputs_do_not_vouch() {
        let db = outputs(MemoryVersionsDb::builder(), SIMPLE_A, 1, &[(RESOURCE_X, "rxv1")])
            .succeeded(SIMPLE_A, b(2));

        let resolution = resolve(
            db.build().unwrap(),
            vec![input("resource-x", RESOURCE_X, &[SIMPLE_A])],
        )
        .await;
        assert_eq!(version_of(&resolution, "resource-x"), v("rxv1").digest());
        assert_eq!(resolution.candidates["resource-x"].source_build_ids, vec![b(1)]);
    }

    #[tokio::test]
    async fn test_second_input_revouching_does_not_repeat_builds() {
        let db = outputs(MemoryVersionsDb::builder(), SIMPLE_A, 1, &[(RESOURCE_X, "rxv1")]);

        let resolution = resolve(
            db.build().unwrap(),
            vec![
                input("resource-x", RESOURCE_X, &[SIMPLE_A]),
                input("resource-y", RESOURCE_Y, &[SIMPLE_A, SIMPLE_B]),
            ],
        )
        .await;

        assert!(!resolution.is_resolved());
        assert_eq!(resolution.candidates["resource-x"].source_build_ids, vec![b(1)]);
    }
}
