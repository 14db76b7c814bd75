//! Build cursors.
//!
//! Build history is ordered by `(rerun_of or id, id)`: a rerun sorts directly
//! after the build it reran instead of at the head of history.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::BuildId;

/// Position of a build in its job's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildCursor {
    pub id: BuildId,
    pub rerun_of: Option<BuildId>,
}

impl BuildCursor {
    pub fn new(id: BuildId) -> Self {
        Self { id, rerun_of: None }
    }

    /// Cursor for a build that reran `original`.
    pub fn rerun(id: BuildId, original: BuildId) -> Self {
        Self {
            id,
            rerun_of: Some(original),
        }
    }

    pub fn is_rerun(&self) -> bool {
        self.rerun_of.is_some()
    }

    fn sort_key(&self) -> (BuildId, BuildId) {
        (self.rerun_of.unwrap_or(self.id), self.id)
    }

    /// Whether this build comes strictly before `other` in history.
    pub fn is_older_than(&self, other: &BuildCursor) -> bool {
        self.sort_key() < other.sort_key()
    }

    /// Whether this build comes strictly after `other` in history.
    pub fn is_newer_than(&self, other: &BuildCursor) -> bool {
        self.sort_key() > other.sort_key()
    }
}

impl Ord for BuildCursor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.rerun_of.cmp(&other.rerun_of))
    }
}

impl PartialOrd for BuildCursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Final state of a build. Only succeeded builds can vouch for versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    #[display("pending")]
    Pending,
    #[display("started")]
    Started,
    #[display("succeeded")]
    Succeeded,
    #[display("failed")]
    Failed,
    #[display("errored")]
    Errored,
    #[display("aborted")]
    Aborted,
}

impl BuildStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Succeeded)
    }
}
