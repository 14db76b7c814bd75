//! In-memory version and build history.
//!
//! Backs offline replays of [`HistoryDump`]s and the resolver tests. The
//! history is immutable once built and shared behind an [`Arc`], so clones
//! are cheap and concurrent reads need no locking.

use async_trait::async_trait;
use buildit_core::{
    AlgorithmVersion, BuildCursor, BuildId, BuildSet, BuildStatus, JobId, ResourceId,
    ResourceVersion, Version,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::dump::{BuildRecord, BuildVersionRecord, HistoryDump, PipeRecord, VersionRecord};
use crate::pagination::{BuildPageSource, PaginatedBuilds};
use crate::repo::versions::{BuildInput, EveryVersion, VersionConstraints, VersionsDb};
use crate::{DbError, DbResult};

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
struct StoredVersion {
    fields: Version,
    digest: ResourceVersion,
    check_order: i64,
    disabled: bool,
}

#[derive(Debug, Clone)]
struct StoredBuild {
    cursor: BuildCursor,
    job_id: JobId,
    status: BuildStatus,
    inputs: Vec<BuildInput>,
    outputs: Vec<AlgorithmVersion>,
}

#[derive(Debug, Default)]
struct History {
    versions: BTreeMap<ResourceId, Vec<StoredVersion>>,
    builds: BTreeMap<BuildId, StoredBuild>,
    /// Upstream builds by downstream build.
    pipes: BTreeMap<BuildId, BTreeSet<BuildId>>,
}

impl History {
    fn from_dump(dump: &HistoryDump) -> DbResult<Self> {
        let mut history = History::default();

        for record in &dump.versions {
            let digest = record.version.digest();
            let versions = history.versions.entry(record.resource_id).or_default();
            if versions.iter().any(|v| v.digest == digest) {
                return Err(DbError::Duplicate(format!(
                    "version {} of resource {}",
                    record.version, record.resource_id
                )));
            }
            versions.push(StoredVersion {
                fields: record.version.clone(),
                digest,
                check_order: record.check_order,
                disabled: record.disabled,
            });
        }

        for record in &dump.builds {
            if history.builds.contains_key(&record.id) {
                return Err(DbError::Duplicate(format!("build {}", record.id)));
            }
            history.builds.insert(
                record.id,
                StoredBuild {
                    cursor: BuildCursor {
                        id: record.id,
                        rerun_of: record.rerun_of,
                    },
                    job_id: record.job_id,
                    status: record.status,
                    inputs: Vec::new(),
                    outputs: Vec::new(),
                },
            );
        }

        for record in &dump.builds {
            if let Some(original) = record.rerun_of {
                if !history.builds.contains_key(&original) {
                    return Err(DbError::InvalidHistory(format!(
                        "build {} reruns unknown build {}",
                        record.id, original
                    )));
                }
            }
        }

        for record in &dump.inputs {
            let version = history.register(record.resource_id, &record.version);
            history.build_mut(record.build_id)?.inputs.push(BuildInput {
                name: record.name.clone(),
                resource_id: record.resource_id,
                version,
            });
        }

        for record in &dump.outputs {
            let version = history.register(record.resource_id, &record.version);
            history
                .build_mut(record.build_id)?
                .outputs
                .push(AlgorithmVersion::new(record.resource_id, version));
        }

        for pipe in &dump.pipes {
            for id in [pipe.from_build_id, pipe.to_build_id] {
                if !history.builds.contains_key(&id) {
                    return Err(DbError::InvalidHistory(format!(
                        "pipe references unknown build {}",
                        id
                    )));
                }
            }
            history
                .pipes
                .entry(pipe.to_build_id)
                .or_default()
                .insert(pipe.from_build_id);
        }

        Ok(history)
    }

    fn build_mut(&mut self, id: BuildId) -> DbResult<&mut StoredBuild> {
        self.builds
            .get_mut(&id)
            .ok_or_else(|| DbError::InvalidHistory(format!("unknown build {}", id)))
    }

    /// Digest of `fields`, recording it as the newest version of the
    /// resource if it was never checked.
    fn register(&mut self, resource_id: ResourceId, fields: &Version) -> ResourceVersion {
        let digest = fields.digest();
        let versions = self.versions.entry(resource_id).or_default();
        if !versions.iter().any(|v| v.digest == digest) {
            let check_order = versions.iter().map(|v| v.check_order).max().unwrap_or(0) + 1;
            versions.push(StoredVersion {
                fields: fields.clone(),
                digest: digest.clone(),
                check_order,
                disabled: false,
            });
        }
        digest
    }

    fn version(&self, resource_id: ResourceId, digest: &ResourceVersion) -> Option<&StoredVersion> {
        self.versions
            .get(&resource_id)?
            .iter()
            .find(|v| &v.digest == digest)
    }

    fn latest_enabled(&self, resource_id: ResourceId) -> Option<&StoredVersion> {
        self.versions
            .get(&resource_id)?
            .iter()
            .filter(|v| !v.disabled)
            .max_by_key(|v| v.check_order)
    }

    /// The job's build that fetched the highest checked version of the
    /// resource, with that version's check order. Reruns are skipped.
    fn newest_used_version(
        &self,
        job_id: JobId,
        resource_id: ResourceId,
    ) -> Option<(BuildId, i64)> {
        self.builds
            .values()
            .filter(|b| b.job_id == job_id && !b.cursor.is_rerun())
            .flat_map(|b| {
                b.inputs
                    .iter()
                    .filter(|i| i.resource_id == resource_id)
                    .filter_map(|i| self.version(resource_id, &i.version))
                    .map(move |v| (v.check_order, b.cursor.id))
            })
            .max()
            .map(|(check_order, id)| (id, check_order))
    }

    fn successful_outputs(&self, build: &StoredBuild) -> Vec<AlgorithmVersion> {
        if !build.status.is_success() {
            return Vec::new();
        }

        let inputs = build
            .inputs
            .iter()
            .map(|i| AlgorithmVersion::new(i.resource_id, i.version.clone()));

        let mut outputs: Vec<AlgorithmVersion> = Vec::new();
        for version in build.outputs.iter().cloned().chain(inputs) {
            if !outputs.contains(&version) {
                outputs.push(version);
            }
        }
        outputs.sort_by_key(|o| o.resource_id);
        outputs
    }

    /// Builds whose successful outputs contain every constraining version.
    fn builds_containing(&self, constraints: &VersionConstraints) -> BuildSet {
        self.builds
            .values()
            .filter(|build| {
                let outputs = self.successful_outputs(build);
                constraints.iter().all(|(resource_id, versions)| {
                    versions.iter().all(|version| {
                        outputs
                            .iter()
                            .any(|o| o.resource_id == *resource_id && &o.version == version)
                    })
                })
            })
            .map(|build| build.cursor.id)
            .collect()
    }
}

/// Pages of a job's succeeded builds.
struct MemoryBuildPages {
    history: Arc<History>,
    job_id: JobId,
    at_or_older_than: Option<BuildCursor>,
    only: Option<BuildSet>,
}

#[async_trait]
impl BuildPageSource for MemoryBuildPages {
    async fn page(
        &self,
        older_than: Option<BuildCursor>,
        limit: usize,
    ) -> DbResult<Vec<BuildCursor>> {
        let mut builds: Vec<BuildCursor> = self
            .history
            .builds
            .values()
            .filter(|b| b.job_id == self.job_id && b.status.is_success())
            .map(|b| b.cursor)
            .filter(|c| self.only.as_ref().is_none_or(|only| only.contains(c.id)))
            .filter(|c| self.at_or_older_than.is_none_or(|last| !c.is_newer_than(&last)))
            .filter(|c| older_than.is_none_or(|boundary| c.is_older_than(&boundary)))
            .collect();

        builds.sort_by(|a, b| b.cmp(a));
        builds.truncate(limit);
        Ok(builds)
    }
}

/// In-memory implementation of VersionsDb.
#[derive(Debug, Clone)]
pub struct MemoryVersionsDb {
    history: Arc<History>,
    page_size: usize,
}

impl MemoryVersionsDb {
    pub fn builder() -> MemoryVersionsDbBuilder {
        MemoryVersionsDbBuilder::default()
    }

    pub fn from_dump(dump: &HistoryDump, page_size: usize) -> DbResult<Self> {
        Ok(Self {
            history: Arc::new(History::from_dump(dump)?),
            page_size,
        })
    }

    fn pages(
        &self,
        job_id: JobId,
        at_or_older_than: Option<BuildCursor>,
        constraints: Option<&VersionConstraints>,
    ) -> Box<dyn BuildPageSource> {
        Box::new(MemoryBuildPages {
            history: self.history.clone(),
            job_id,
            at_or_older_than,
            only: constraints.map(|c| self.history.builds_containing(c)),
        })
    }

    fn newer_builds(&self, job_id: JobId, last_used: BuildCursor) -> Vec<BuildCursor> {
        let mut builds: Vec<BuildCursor> = self
            .history
            .builds
            .values()
            .filter(|b| b.job_id == job_id && b.status.is_success())
            .map(|b| b.cursor)
            .filter(|c| c.is_newer_than(&last_used))
            .collect();
        builds.sort();
        builds
    }
}

#[async_trait]
impl VersionsDb for MemoryVersionsDb {
    async fn latest_version_of_resource(
        &self,
        resource_id: ResourceId,
    ) -> DbResult<Option<ResourceVersion>> {
        Ok(self
            .history
            .latest_enabled(resource_id)
            .map(|v| v.digest.clone()))
    }

    async fn find_version_of_resource(
        &self,
        resource_id: ResourceId,
        version: &Version,
    ) -> DbResult<Option<ResourceVersion>> {
        Ok(self.history.versions.get(&resource_id).and_then(|versions| {
            versions
                .iter()
                .filter(|v| !v.disabled && v.fields.contains(version))
                .max_by_key(|v| v.check_order)
                .map(|v| v.digest.clone())
        }))
    }

    async fn version_is_disabled(
        &self,
        resource_id: ResourceId,
        version: &ResourceVersion,
    ) -> DbResult<bool> {
        Ok(self
            .history
            .version(resource_id, version)
            .is_some_and(|v| v.disabled))
    }

    async fn version_exists(
        &self,
        resource_id: ResourceId,
        version: &ResourceVersion,
    ) -> DbResult<bool> {
        Ok(self.history.version(resource_id, version).is_some())
    }

    async fn version_fields(
        &self,
        resource_id: ResourceId,
        version: &ResourceVersion,
    ) -> DbResult<Option<Version>> {
        Ok(self
            .history
            .version(resource_id, version)
            .map(|v| v.fields.clone()))
    }

    async fn latest_build_id(&self, job_id: JobId) -> DbResult<Option<BuildId>> {
        Ok(self
            .history
            .builds
            .values()
            .filter(|b| b.job_id == job_id && !b.cursor.is_rerun())
            .map(|b| b.cursor.id)
            .max())
    }

    async fn build_inputs(&self, build_id: BuildId) -> DbResult<Vec<BuildInput>> {
        Ok(self
            .history
            .builds
            .get(&build_id)
            .map(|b| b.inputs.clone())
            .unwrap_or_default())
    }

    async fn successful_builds(&self, job_id: JobId) -> DbResult<PaginatedBuilds> {
        Ok(PaginatedBuilds::new(
            self.pages(job_id, None, None),
            self.page_size,
        ))
    }

    async fn successful_builds_version_constrained(
        &self,
        job_id: JobId,
        constraints: &VersionConstraints,
    ) -> DbResult<PaginatedBuilds> {
        Ok(PaginatedBuilds::new(
            self.pages(job_id, None, Some(constraints)),
            self.page_size,
        ))
    }

    async fn unused_builds(
        &self,
        job_id: JobId,
        last_used: BuildCursor,
    ) -> DbResult<PaginatedBuilds> {
        Ok(PaginatedBuilds::with_unused(
            self.pages(job_id, Some(last_used), None),
            self.page_size,
            self.newer_builds(job_id, last_used),
        ))
    }

    async fn unused_builds_version_constrained(
        &self,
        job_id: JobId,
        last_used: BuildCursor,
        constraints: &VersionConstraints,
    ) -> DbResult<PaginatedBuilds> {
        Ok(PaginatedBuilds::with_unused(
            self.pages(job_id, Some(last_used), Some(constraints)),
            self.page_size,
            self.newer_builds(job_id, last_used),
        ))
    }

    async fn successful_build_outputs(
        &self,
        build_id: BuildId,
    ) -> DbResult<Vec<AlgorithmVersion>> {
        Ok(self
            .history
            .builds
            .get(&build_id)
            .map(|b| self.history.successful_outputs(b))
            .unwrap_or_default())
    }

    async fn latest_build_using_latest_version(
        &self,
        job_id: JobId,
        resource_id: ResourceId,
    ) -> DbResult<Option<BuildId>> {
        Ok(self
            .history
            .newest_used_version(job_id, resource_id)
            .map(|(build_id, _)| build_id))
    }

    async fn next_every_version(
        &self,
        job_id: JobId,
        resource_id: ResourceId,
    ) -> DbResult<Option<EveryVersion>> {
        let Some((_, used)) = self.history.newest_used_version(job_id, resource_id) else {
            return Ok(self
                .history
                .latest_enabled(resource_id)
                .map(|v| EveryVersion {
                    version: v.digest.clone(),
                    has_next: false,
                }));
        };

        let mut newer: Vec<&StoredVersion> = self
            .history
            .versions
            .get(&resource_id)
            .map(|versions| {
                versions
                    .iter()
                    .filter(|v| !v.disabled && v.check_order > used)
                    .collect()
            })
            .unwrap_or_default();
        newer.sort_by_key(|v| v.check_order);

        Ok(newer.first().map(|next| EveryVersion {
            version: next.digest.clone(),
            has_next: newer.len() > 1,
        }))
    }

    async fn latest_build_pipes(
        &self,
        build_id: BuildId,
    ) -> DbResult<BTreeMap<JobId, BuildCursor>> {
        let Some(upstream) = self.history.pipes.get(&build_id) else {
            return Ok(BTreeMap::new());
        };

        Ok(upstream
            .iter()
            .filter_map(|id| self.history.builds.get(id))
            .map(|b| (b.job_id, b.cursor))
            .collect())
    }
}

/// Assembles a [`MemoryVersionsDb`] record by record.
///
/// Versions referenced by inputs or outputs but never declared are recorded
/// as the newest version of their resource.
#[derive(Debug, Default)]
pub struct MemoryVersionsDbBuilder {
    dump: HistoryDump,
    page_size: Option<usize>,
}

impl MemoryVersionsDbBuilder {
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn version(mut self, resource_id: ResourceId, version: Version, check_order: i64) -> Self {
        self.dump.versions.push(VersionRecord {
            resource_id,
            version,
            check_order,
            disabled: false,
        });
        self
    }

    pub fn disabled_version(
        mut self,
        resource_id: ResourceId,
        version: Version,
        check_order: i64,
    ) -> Self {
        self.dump.versions.push(VersionRecord {
            resource_id,
            version,
            check_order,
            disabled: true,
        });
        self
    }

    pub fn job_build(mut self, job_id: JobId, id: BuildId, status: BuildStatus) -> Self {
        self.dump.builds.push(BuildRecord {
            id,
            job_id,
            status,
            rerun_of: None,
        });
        self
    }

    pub fn succeeded(self, job_id: JobId, id: BuildId) -> Self {
        self.job_build(job_id, id, BuildStatus::Succeeded)
    }

    pub fn rerun(mut self, job_id: JobId, id: BuildId, rerun_of: BuildId, status: BuildStatus) -> Self {
        self.dump.builds.push(BuildRecord {
            id,
            job_id,
            status,
            rerun_of: Some(rerun_of),
        });
        self
    }

    pub fn input(
        mut self,
        build_id: BuildId,
        name: impl Into<String>,
        resource_id: ResourceId,
        version: Version,
    ) -> Self {
        self.dump.inputs.push(BuildVersionRecord {
            build_id,
            name: name.into(),
            resource_id,
            version,
        });
        self
    }

    pub fn output(mut self, build_id: BuildId, resource_id: ResourceId, version: Version) -> Self {
        self.dump.outputs.push(BuildVersionRecord {
            build_id,
            name: resource_id.to_string(),
            resource_id,
            version,
        });
        self
    }

    pub fn pipe(mut self, from_build_id: BuildId, to_build_id: BuildId) -> Self {
        self.dump.pipes.push(PipeRecord {
            from_build_id,
            to_build_id,
        });
        self
    }

    pub fn build(self) -> DbResult<MemoryVersionsDb> {
        MemoryVersionsDb::from_dump(&self.dump, self.page_size.unwrap_or(DEFAULT_PAGE_SIZE))
    }
}
