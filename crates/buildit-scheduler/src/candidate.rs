//! Version candidates proposed during resolution.

use buildit_core::{BuildId, JobId, JobSet, ResourceVersion};

/// A version proposed for an input, with the upstream jobs and builds that
/// vouched for it.
///
/// Candidates are replaced rather than mutated: vouching produces a new
/// candidate carrying the previous provenance forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCandidate {
    pub version: ResourceVersion,
    pub vouched_for_by: JobSet,
    /// Upstream builds whose outputs supplied the version, in vouching order.
    pub source_build_ids: Vec<BuildId>,
    /// Whether further every-version work remains after this candidate.
    pub has_next_every_version: bool,
}

impl VersionCandidate {
    pub fn new(version: ResourceVersion) -> Self {
        Self {
            version,
            vouched_for_by: JobSet::new(),
            source_build_ids: Vec::new(),
            has_next_every_version: false,
        }
    }

    pub fn with_has_next(mut self, has_next: bool) -> Self {
        self.has_next_every_version = has_next;
        self
    }

    /// `version` vouched for by `build_id` of `job_id`, keeping the vouchers
    /// and source builds of `previous`.
    pub fn vouched(
        previous: Option<&VersionCandidate>,
        version: ResourceVersion,
        job_id: JobId,
        build_id: BuildId,
        has_next: bool,
    ) -> Self {
        let mut candidate = match previous {
            Some(previous) => VersionCandidate {
                version,
                ..previous.clone()
            },
            None => VersionCandidate::new(version),
        };

        candidate.vouched_for_by.insert(job_id);
        if !candidate.source_build_ids.contains(&build_id) {
            candidate.source_build_ids.push(build_id);
        }
        candidate.has_next_every_version |= has_next;
        candidate
    }

    pub fn is_vouched_for_by(&self, job_id: JobId) -> bool {
        self.vouched_for_by.contains(&job_id)
    }

    /// Whether every job in `passed` has vouched for the version.
    pub fn satisfies(&self, passed: &JobSet) -> bool {
        passed.is_subset(&self.vouched_for_by)
    }
}
