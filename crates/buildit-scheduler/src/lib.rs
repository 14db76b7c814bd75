//! Input resolution for BuildIt jobs.
//!
//! Chooses the resource versions a job's next build should fetch. Inputs
//! without passed constraints resolve on their own; inputs that must have
//! passed through the same upstream jobs are searched jointly so that the
//! chosen versions travelled together through the same builds.

pub mod candidate;
pub mod construct;
pub mod error;
pub mod group;
pub mod individual;
pub mod input_configs;
pub mod mapper;
pub mod pinned;
pub mod resolver;

pub use candidate::VersionCandidate;
pub use construct::construct_resolvers;
pub use error::{SchedulerError, SchedulerResult};
pub use group::GroupResolver;
pub use individual::IndividualResolver;
pub use input_configs::build_input_configs;
pub use mapper::{InputMapper, MappingOutcome};
pub use pinned::PinnedResolver;
pub use resolver::{InputFailure, Resolution, Resolver};
