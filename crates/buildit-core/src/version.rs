//! Resource versions.
//!
//! A [`Version`] is the user-facing key/value form emitted by a resource
//! (e.g. `{"ver": "rxv1"}`). Stores and the resolver work with the opaque
//! [`ResourceVersion`] digest of that map instead.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ResourceId;

/// A version as reported by a resource, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(BTreeMap<String, String>);

impl Version {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a version with a single field.
    pub fn single(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(key.into(), value.into());
        Self(fields)
    }

    /// Add a field, returning the version for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether every field of `other` is present in this version with the
    /// same value. A pin matches any stored version that contains it.
    pub fn contains(&self, other: &Version) -> bool {
        other
            .0
            .iter()
            .all(|(key, value)| self.0.get(key) == Some(value))
    }

    /// The opaque digest identifying this version.
    pub fn digest(&self) -> ResourceVersion {
        // BTreeMap serializes with sorted keys, so equal versions always
        // produce the same digest.
        let canonical = serde_json::to_string(&self.0).unwrap_or_default();
        ResourceVersion(format!("{:x}", md5::compute(canonical.as_bytes())))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}:{}", key, value)?;
            first = false;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Version {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Opaque identifier of a stored resource version (MD5 of its canonical JSON).
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct ResourceVersion(String);

impl ResourceVersion {
    /// Wrap an already computed digest.
    pub fn from_digest(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&Version> for ResourceVersion {
    fn from(version: &Version) -> Self {
        version.digest()
    }
}

/// A version of a specific resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AlgorithmVersion {
    pub resource_id: ResourceId,
    pub version: ResourceVersion,
}

impl AlgorithmVersion {
    pub fn new(resource_id: ResourceId, version: ResourceVersion) -> Self {
        Self {
            resource_id,
            version,
        }
    }
}
