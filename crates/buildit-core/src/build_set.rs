//! Sets of build identifiers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::BuildId;

/// An immutable set of builds, used to correlate builds across inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildSet(BTreeSet<BuildId>);

impl BuildSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: BuildId) -> bool {
        self.0.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Builds in ascending ID order.
    pub fn iter(&self) -> impl Iterator<Item = BuildId> + '_ {
        self.0.iter().copied()
    }

    pub fn union(&self, other: &BuildSet) -> BuildSet {
        Self(self.0.union(&other.0).copied().collect())
    }

    pub fn intersect(&self, other: &BuildSet) -> BuildSet {
        Self(self.0.intersection(&other.0).copied().collect())
    }

    /// Whether the two sets share at least one build.
    pub fn overlaps(&self, other: &BuildSet) -> bool {
        !self.0.is_disjoint(&other.0)
    }
}

impl FromIterator<BuildId> for BuildSet {
    fn from_iter<I: IntoIterator<Item = BuildId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[BuildId; N]> for BuildSet {
    fn from(ids: [BuildId; N]) -> Self {
        ids.into_iter().collect()
    }
}
