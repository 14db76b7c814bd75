//! The resolver abstraction shared by every resolution strategy.

use async_trait::async_trait;
use buildit_core::{InputConfig, ResolutionFailure};
use std::collections::BTreeMap;

use crate::candidate::VersionCandidate;
use crate::SchedulerResult;

/// Selects versions for a fixed set of inputs.
///
/// Resolvers hold no state between calls; each `resolve` starts fresh, so a
/// resolver can be shared and resolved concurrently.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// The inputs this resolver is responsible for, in configured order.
    fn input_configs(&self) -> &[InputConfig];

    async fn resolve(&self) -> SchedulerResult<Resolution>;
}

/// An input that could not be resolved, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFailure {
    pub input: String,
    pub reason: ResolutionFailure,
}

/// Outcome of one resolver.
///
/// On success `candidates` holds a candidate for every input. On failure it
/// holds whatever fully vouched candidates were found before giving up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub candidates: BTreeMap<String, VersionCandidate>,
    pub failure: Option<InputFailure>,
}

impl Resolution {
    pub fn resolved(candidates: BTreeMap<String, VersionCandidate>) -> Self {
        Self {
            candidates,
            failure: None,
        }
    }

    pub fn single(input: impl Into<String>, candidate: VersionCandidate) -> Self {
        Self::resolved(BTreeMap::from([(input.into(), candidate)]))
    }

    pub fn failed(input: impl Into<String>, reason: ResolutionFailure) -> Self {
        Self {
            candidates: BTreeMap::new(),
            failure: Some(InputFailure {
                input: input.into(),
                reason,
            }),
        }
    }

    pub fn with_partial(mut self, candidates: BTreeMap<String, VersionCandidate>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.failure.is_none()
    }
}
