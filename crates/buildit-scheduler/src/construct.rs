//! Partitioning of a job's inputs into resolvers.

use buildit_core::{InputConfig, JobSet};
use buildit_db::VersionsDb;
use std::sync::Arc;
use tracing::debug;

use crate::group::GroupResolver;
use crate::individual::IndividualResolver;
use crate::pinned::PinnedResolver;
use crate::resolver::Resolver;

/// Inputs joined by passed jobs they have in common.
#[derive(Debug, Default)]
struct InputGroup {
    indices: Vec<usize>,
    jobs: JobSet,
}

/// Creates one resolver per independent set of inputs.
///
/// Pinned inputs without passed constraints and unconstrained inputs each
/// get their own resolver. Inputs with passed constraints are grouped by the
/// transitive closure of shared passed jobs. Resolvers are returned in the
/// order of their first input.
pub fn construct_resolvers(
    db: Arc<dyn VersionsDb>,
    inputs: &[InputConfig],
) -> Vec<Box<dyn Resolver>> {
    let mut resolvers: Vec<(usize, Box<dyn Resolver>)> = Vec::new();
    let mut groups: Vec<InputGroup> = Vec::new();

    for (index, input) in inputs.iter().enumerate() {
        if !input.has_passed() {
            let resolver: Box<dyn Resolver> = match input.pinned_version() {
                Some(_) => Box::new(PinnedResolver::new(db.clone(), input.clone())),
                None => Box::new(IndividualResolver::new(db.clone(), input.clone())),
            };
            resolvers.push((index, resolver));
            continue;
        }

        let mut merged = InputGroup {
            indices: vec![index],
            jobs: input.passed.clone(),
        };
        let (related, unrelated): (Vec<_>, Vec<_>) = groups
            .into_iter()
            .partition(|group| !group.jobs.is_disjoint(&input.passed));
        for group in related {
            merged.indices.extend(group.indices);
            merged.jobs.extend(group.jobs);
        }
        groups = unrelated;
        groups.push(merged);
    }

    for mut group in groups {
        group.indices.sort_unstable();
        let configs: Vec<InputConfig> = group.indices.iter().map(|&i| inputs[i].clone()).collect();
        debug!(inputs = %buildit_core::input_names(&configs), "grouped inputs");
        resolvers.push((
            group.indices[0],
            Box::new(GroupResolver::new(db.clone(), configs)),
        ));
    }

    resolvers.sort_by_key(|(first, _)| *first);
    resolvers.into_iter().map(|(_, resolver)| resolver).collect()
}
