//! Repository traits and implementations.

pub mod memory;
pub mod versions;

pub use memory::{MemoryVersionsDb, MemoryVersionsDbBuilder};
pub use versions::{BuildInput, EveryVersion, PgVersionsDb, VersionConstraints, VersionsDb};
