//! Resource, job and build identifiers.
//!
//! All identifiers are database integers. Their numeric ordering is part of
//! the resolution contract: passed jobs are visited in ascending job ID order
//! and builds are ordered by ID.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
            Display,
            From,
        )]
        #[display("{_0}")]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the underlying integer.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

integer_id!(
    /// Identifier of a resource in a pipeline.
    ResourceId
);

integer_id!(
    /// Identifier of a job in a pipeline.
    JobId
);

integer_id!(
    /// Identifier of a single build of a job.
    BuildId
);
