//! Lazy, paginated iteration over a job's build history.

use async_trait::async_trait;
use buildit_core::BuildCursor;
use std::collections::VecDeque;

use crate::DbResult;

/// A store query that yields a job's builds a page at a time, newest first.
#[async_trait]
pub trait BuildPageSource: Send + Sync {
    /// Up to `limit` builds strictly older than `older_than` (from the newest
    /// build when `None`), ordered newest first.
    async fn page(
        &self,
        older_than: Option<BuildCursor>,
        limit: usize,
    ) -> DbResult<Vec<BuildCursor>>;
}

/// Iterates builds, fetching pages from a [`BuildPageSource`] on demand.
///
/// Iteration over unused builds first walks the builds newer than the last
/// used one, oldest first, then continues backwards through the paged history.
pub struct PaginatedBuilds {
    source: Box<dyn BuildPageSource>,
    limit: usize,
    forward: VecDeque<BuildCursor>,
    page: VecDeque<BuildCursor>,
    boundary: Option<BuildCursor>,
    exhausted: bool,
}

impl PaginatedBuilds {
    pub fn new(source: Box<dyn BuildPageSource>, limit: usize) -> Self {
        Self::with_unused(source, limit, Vec::new())
    }

    /// `unused` are the builds newer than the last used build, oldest first.
    pub fn with_unused(
        source: Box<dyn BuildPageSource>,
        limit: usize,
        unused: Vec<BuildCursor>,
    ) -> Self {
        Self {
            source,
            limit: limit.max(1),
            forward: unused.into(),
            page: VecDeque::new(),
            boundary: None,
            exhausted: false,
        }
    }

    /// Next build, or `None` once history is exhausted.
    pub async fn next(&mut self) -> DbResult<Option<BuildCursor>> {
        if let Some(build) = self.forward.pop_front() {
            return Ok(Some(build));
        }

        if self.page.is_empty() {
            if self.exhausted {
                return Ok(None);
            }

            let builds = self.source.page(self.boundary, self.limit).await?;
            if builds.len() < self.limit {
                self.exhausted = true;
            }
            let Some(last) = builds.last() else {
                return Ok(None);
            };
            self.boundary = Some(*last);
            self.page = builds.into();
        }

        Ok(self.page.pop_front())
    }

    /// Whether unused builds newer than the last used build remain.
    pub fn has_next(&self) -> bool {
        !self.forward.is_empty()
    }
}
