//! Version and build history repository.

use async_trait::async_trait;
use buildit_core::{AlgorithmVersion, BuildCursor, BuildId, JobId, ResourceId, ResourceVersion, Version};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::pagination::{BuildPageSource, PaginatedBuilds};
use crate::DbResult;

/// Versions a build's successful outputs must all contain, by resource.
pub type VersionConstraints = BTreeMap<ResourceId, BTreeSet<ResourceVersion>>;

/// A version a build fetched, under the name of the input that fetched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInput {
    pub name: String,
    pub resource_id: ResourceId,
    pub version: ResourceVersion,
}

/// The version an every-version input should use next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EveryVersion {
    pub version: ResourceVersion,
    /// Whether newer versions remain after this one.
    pub has_next: bool,
}

/// Read access to resource versions and build history.
///
/// Implementations must be safe to share between concurrent resolutions.
#[async_trait]
pub trait VersionsDb: Send + Sync {
    /// Newest enabled version of the resource.
    async fn latest_version_of_resource(
        &self,
        resource_id: ResourceId,
    ) -> DbResult<Option<ResourceVersion>>;

    /// A version whose fields contain every field of `version`.
    async fn find_version_of_resource(
        &self,
        resource_id: ResourceId,
        version: &Version,
    ) -> DbResult<Option<ResourceVersion>>;

    async fn version_is_disabled(
        &self,
        resource_id: ResourceId,
        version: &ResourceVersion,
    ) -> DbResult<bool>;

    async fn version_exists(
        &self,
        resource_id: ResourceId,
        version: &ResourceVersion,
    ) -> DbResult<bool>;

    /// The fields of a stored version.
    async fn version_fields(
        &self,
        resource_id: ResourceId,
        version: &ResourceVersion,
    ) -> DbResult<Option<Version>>;

    /// The job's most recent build, ignoring reruns.
    async fn latest_build_id(&self, job_id: JobId) -> DbResult<Option<BuildId>>;

    /// Versions the build fetched, by input name.
    async fn build_inputs(&self, build_id: BuildId) -> DbResult<Vec<BuildInput>>;

    /// The job's succeeded builds, newest first.
    async fn successful_builds(&self, job_id: JobId) -> DbResult<PaginatedBuilds>;

    /// Like [`VersionsDb::successful_builds`], keeping only builds whose
    /// outputs contain every constraining version.
    async fn successful_builds_version_constrained(
        &self,
        job_id: JobId,
        constraints: &VersionConstraints,
    ) -> DbResult<PaginatedBuilds>;

    /// Succeeded builds newer than `last_used` oldest first, then
    /// `last_used` and older builds newest first.
    async fn unused_builds(
        &self,
        job_id: JobId,
        last_used: BuildCursor,
    ) -> DbResult<PaginatedBuilds>;

    /// Like [`VersionsDb::unused_builds`], with the backward walk restricted
    /// to builds whose outputs contain every constraining version.
    async fn unused_builds_version_constrained(
        &self,
        job_id: JobId,
        last_used: BuildCursor,
        constraints: &VersionConstraints,
    ) -> DbResult<PaginatedBuilds>;

    /// Outputs and inputs of a succeeded build, grouped by ascending resource
    /// ID. Empty for builds that did not succeed.
    async fn successful_build_outputs(&self, build_id: BuildId)
    -> DbResult<Vec<AlgorithmVersion>>;

    /// The job's build, ignoring reruns, that fetched the newest version of
    /// the resource the job has ever fetched. The newest such build wins ties.
    async fn latest_build_using_latest_version(
        &self,
        job_id: JobId,
        resource_id: ResourceId,
    ) -> DbResult<Option<BuildId>>;

    /// The first enabled version checked after the newest one the job's
    /// builds, ignoring reruns, fetched for the resource. `None` when nothing
    /// newer exists. Starts from the latest version when the job never
    /// fetched the resource.
    async fn next_every_version(
        &self,
        job_id: JobId,
        resource_id: ResourceId,
    ) -> DbResult<Option<EveryVersion>>;

    /// Upstream builds that fed `build_id`, by upstream job.
    async fn latest_build_pipes(&self, build_id: BuildId)
    -> DbResult<BTreeMap<JobId, BuildCursor>>;
}

/// PostgreSQL implementation of VersionsDb.
#[derive(Clone)]
pub struct PgVersionsDb {
    pool: PgPool,
    page_size: usize,
}

impl PgVersionsDb {
    pub fn new(pool: PgPool, page_size: usize) -> Self {
        Self { pool, page_size }
    }

    /// The job's build that fetched the highest checked version of the
    /// resource, with that version's check order. Reruns are skipped.
    async fn newest_used_version(
        &self,
        job_id: JobId,
        resource_id: ResourceId,
    ) -> DbResult<Option<(BuildId, i64)>> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT b.id, v.check_order FROM builds b
            JOIN build_inputs i ON i.build_id = b.id
            JOIN resource_versions v
              ON v.resource_id = i.resource_id AND v.version_md5 = i.version_md5
            WHERE b.job_id = $1 AND b.rerun_of IS NULL AND i.resource_id = $2
            ORDER BY v.check_order DESC, b.id DESC
            LIMIT 1
            "#,
        )
        .bind(job_id.get())
        .bind(resource_id.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, check_order)| (BuildId::new(id), check_order)))
    }

    fn pages(
        &self,
        job_id: JobId,
        at_or_older_than: Option<BuildCursor>,
        constraints: &VersionConstraints,
    ) -> Box<dyn BuildPageSource> {
        Box::new(PgBuildPages {
            pool: self.pool.clone(),
            job_id,
            at_or_older_than,
            constraints: constraints_json(constraints),
        })
    }

    async fn newer_builds(&self, job_id: JobId, last_used: BuildCursor) -> DbResult<Vec<BuildCursor>> {
        let (order, id) = sort_key(last_used);
        let rows = sqlx::query_as::<_, (i64, Option<i64>)>(
            r#"
            SELECT id, rerun_of FROM builds
            WHERE job_id = $1
              AND status = 'succeeded'
              AND (COALESCE(rerun_of, id), id) > ($2, $3)
            ORDER BY COALESCE(rerun_of, id) ASC, id ASC
            "#,
        )
        .bind(job_id.get())
        .bind(order)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(cursor_from_row).collect())
    }

    async fn latest_enabled(&self, resource_id: ResourceId) -> DbResult<Option<ResourceVersion>> {
        let row = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT v.version_md5 FROM resource_versions v
            WHERE v.resource_id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM resource_disabled_versions d
                  WHERE d.resource_id = v.resource_id AND d.version_md5 = v.version_md5)
            ORDER BY v.check_order DESC
            LIMIT 1
            "#,
        )
        .bind(resource_id.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(md5,)| ResourceVersion::from_digest(md5)))
    }
}

#[async_trait]
impl VersionsDb for PgVersionsDb {
    async fn latest_version_of_resource(
        &self,
        resource_id: ResourceId,
    ) -> DbResult<Option<ResourceVersion>> {
        self.latest_enabled(resource_id).await
    }

    async fn find_version_of_resource(
        &self,
        resource_id: ResourceId,
        version: &Version,
    ) -> DbResult<Option<ResourceVersion>> {
        let row = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT v.version_md5 FROM resource_versions v
            WHERE v.resource_id = $1 AND v.version @> $2::JSONB
              AND NOT EXISTS (
                  SELECT 1 FROM resource_disabled_versions d
                  WHERE d.resource_id = v.resource_id AND d.version_md5 = v.version_md5)
            ORDER BY v.check_order DESC
            LIMIT 1
            "#,
        )
        .bind(resource_id.get())
        .bind(serde_json::to_value(version)?)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(md5,)| ResourceVersion::from_digest(md5)))
    }

    async fn version_is_disabled(
        &self,
        resource_id: ResourceId,
        version: &ResourceVersion,
    ) -> DbResult<bool> {
        let (disabled,) = sqlx::query_as::<_, (bool,)>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM resource_disabled_versions
                WHERE resource_id = $1 AND version_md5 = $2)
            "#,
        )
        .bind(resource_id.get())
        .bind(version.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(disabled)
    }

    async fn version_exists(
        &self,
        resource_id: ResourceId,
        version: &ResourceVersion,
    ) -> DbResult<bool> {
        let (exists,) = sqlx::query_as::<_, (bool,)>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM resource_versions
                WHERE resource_id = $1 AND version_md5 = $2)
            "#,
        )
        .bind(resource_id.get())
        .bind(version.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn version_fields(
        &self,
        resource_id: ResourceId,
        version: &ResourceVersion,
    ) -> DbResult<Option<Version>> {
        let row = sqlx::query_as::<_, (serde_json::Value,)>(
            "SELECT version FROM resource_versions WHERE resource_id = $1 AND version_md5 = $2",
        )
        .bind(resource_id.get())
        .bind(version.as_str())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some((fields,)) => Ok(Some(serde_json::from_value::<Version>(fields)?)),
            None => Ok(None),
        }
    }

    async fn latest_build_id(&self, job_id: JobId) -> DbResult<Option<BuildId>> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT id FROM builds
            WHERE job_id = $1 AND rerun_of IS NULL
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(job_id.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id,)| BuildId::new(id)))
    }

    async fn build_inputs(&self, build_id: BuildId) -> DbResult<Vec<BuildInput>> {
        let rows = sqlx::query_as::<_, (String, i64, String)>(
            "SELECT name, resource_id, version_md5 FROM build_inputs WHERE build_id = $1 ORDER BY name",
        )
        .bind(build_id.get())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, resource_id, md5)| BuildInput {
                name,
                resource_id: ResourceId::new(resource_id),
                version: ResourceVersion::from_digest(md5),
            })
            .collect())
    }

    async fn successful_builds(&self, job_id: JobId) -> DbResult<PaginatedBuilds> {
        let source = self.pages(job_id, None, &VersionConstraints::new());
        Ok(PaginatedBuilds::new(source, self.page_size))
    }

    async fn successful_builds_version_constrained(
        &self,
        job_id: JobId,
        constraints: &VersionConstraints,
    ) -> DbResult<PaginatedBuilds> {
        let source = self.pages(job_id, None, constraints);
        Ok(PaginatedBuilds::new(source, self.page_size))
    }

    async fn unused_builds(
        &self,
        job_id: JobId,
        last_used: BuildCursor,
    ) -> DbResult<PaginatedBuilds> {
        self.unused_builds_version_constrained(job_id, last_used, &VersionConstraints::new())
            .await
    }

    async fn unused_builds_version_constrained(
        &self,
        job_id: JobId,
        last_used: BuildCursor,
        constraints: &VersionConstraints,
    ) -> DbResult<PaginatedBuilds> {
        let newer = self.newer_builds(job_id, last_used).await?;
        debug!(job_id = %job_id, last_used = %last_used.id, newer = newer.len(), "found unused builds");
        let source = self.pages(job_id, Some(last_used), constraints);
        Ok(PaginatedBuilds::with_unused(source, self.page_size, newer))
    }

    async fn successful_build_outputs(
        &self,
        build_id: BuildId,
    ) -> DbResult<Vec<AlgorithmVersion>> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            r#"
            SELECT resource_id, version_md5 FROM (
                SELECT o.resource_id, o.version_md5, 0 AS source
                FROM build_outputs o WHERE o.build_id = $1
                UNION ALL
                SELECT i.resource_id, i.version_md5, 1 AS source
                FROM build_inputs i WHERE i.build_id = $1
            ) AS v
            WHERE EXISTS (SELECT 1 FROM builds b WHERE b.id = $1 AND b.status = 'succeeded')
            ORDER BY resource_id, source
            "#,
        )
        .bind(build_id.get())
        .fetch_all(&self.pool)
        .await?;

        let mut outputs: Vec<AlgorithmVersion> = Vec::with_capacity(rows.len());
        for (resource_id, md5) in rows {
            let output = AlgorithmVersion::new(
                ResourceId::new(resource_id),
                ResourceVersion::from_digest(md5),
            );
            if !outputs.contains(&output) {
                outputs.push(output);
            }
        }
        Ok(outputs)
    }

    async fn latest_build_using_latest_version(
        &self,
        job_id: JobId,
        resource_id: ResourceId,
    ) -> DbResult<Option<BuildId>> {
        Ok(self
            .newest_used_version(job_id, resource_id)
            .await?
            .map(|(build_id, _)| build_id))
    }

    async fn next_every_version(
        &self,
        job_id: JobId,
        resource_id: ResourceId,
    ) -> DbResult<Option<EveryVersion>> {
        let used = self.newest_used_version(job_id, resource_id).await?;

        let Some((_, check_order)) = used else {
            let latest = self.latest_version_of_resource(resource_id).await?;
            return Ok(latest.map(|version| EveryVersion {
                version,
                has_next: false,
            }));
        };

        let next = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT v.version_md5 FROM resource_versions v
            WHERE v.resource_id = $1
              AND v.check_order > $2
              AND NOT EXISTS (
                  SELECT 1 FROM resource_disabled_versions d
                  WHERE d.resource_id = v.resource_id AND d.version_md5 = v.version_md5)
            ORDER BY v.check_order ASC
            LIMIT 2
            "#,
        )
        .bind(resource_id.get())
        .bind(check_order)
        .fetch_all(&self.pool)
        .await?;

        let has_next = next.len() > 1;
        Ok(next.into_iter().next().map(|(md5,)| EveryVersion {
            version: ResourceVersion::from_digest(md5),
            has_next,
        }))
    }

    async fn latest_build_pipes(
        &self,
        build_id: BuildId,
    ) -> DbResult<BTreeMap<JobId, BuildCursor>> {
        let rows = sqlx::query_as::<_, (i64, Option<i64>, i64)>(
            r#"
            SELECT p.from_build_id, b.rerun_of, b.job_id
            FROM build_pipes p
            JOIN builds b ON b.id = p.from_build_id
            WHERE p.to_build_id = $1
            "#,
        )
        .bind(build_id.get())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, rerun_of, job_id)| (JobId::new(job_id), cursor_from_row((id, rerun_of))))
            .collect())
    }
}

/// Pages of a job's succeeded builds.
struct PgBuildPages {
    pool: PgPool,
    job_id: JobId,
    at_or_older_than: Option<BuildCursor>,
    constraints: serde_json::Value,
}

#[async_trait]
impl BuildPageSource for PgBuildPages {
    async fn page(
        &self,
        older_than: Option<BuildCursor>,
        limit: usize,
    ) -> DbResult<Vec<BuildCursor>> {
        let older_than = older_than.map(sort_key);
        let upper = self.at_or_older_than.map(sort_key);

        let rows = sqlx::query_as::<_, (i64, Option<i64>)>(
            r#"
            SELECT b.id, b.rerun_of FROM builds b
            WHERE b.job_id = $1
              AND b.status = 'succeeded'
              AND ($2::BIGINT IS NULL OR (COALESCE(b.rerun_of, b.id), b.id) < ($2, $3))
              AND ($4::BIGINT IS NULL OR (COALESCE(b.rerun_of, b.id), b.id) <= ($4, $5))
              AND NOT EXISTS (
                  SELECT 1 FROM jsonb_to_recordset($6::JSONB) AS c(resource_id BIGINT, version_md5 TEXT)
                  WHERE NOT EXISTS (
                      SELECT 1 FROM build_outputs o
                      WHERE o.build_id = b.id
                        AND o.resource_id = c.resource_id
                        AND o.version_md5 = c.version_md5
                      UNION ALL
                      SELECT 1 FROM build_inputs i
                      WHERE i.build_id = b.id
                        AND i.resource_id = c.resource_id
                        AND i.version_md5 = c.version_md5))
            ORDER BY COALESCE(b.rerun_of, b.id) DESC, b.id DESC
            LIMIT $7
            "#,
        )
        .bind(self.job_id.get())
        .bind(older_than.map(|(order, _)| order))
        .bind(older_than.map(|(_, id)| id))
        .bind(upper.map(|(order, _)| order))
        .bind(upper.map(|(_, id)| id))
        .bind(&self.constraints)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(cursor_from_row).collect())
    }
}

fn sort_key(cursor: BuildCursor) -> (i64, i64) {
    (cursor.rerun_of.unwrap_or(cursor.id).get(), cursor.id.get())
}

fn cursor_from_row((id, rerun_of): (i64, Option<i64>)) -> BuildCursor {
    BuildCursor {
        id: BuildId::new(id),
        rerun_of: rerun_of.map(BuildId::new),
    }
}

fn constraints_json(constraints: &VersionConstraints) -> serde_json::Value {
    constraints
        .iter()
        .flat_map(|(resource_id, versions)| {
            versions.iter().map(move |version| {
                serde_json::json!({
                    "resource_id": resource_id.get(),
                    "version_md5": version.as_str(),
                })
            })
        })
        .collect()
}
