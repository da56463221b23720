use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ResourceConfigId, ResourceVersionId};

/// Named partition of a resource's version stream.
///
/// A resource may expose several independent lineages of versions (for
/// example one per tag namespace); each lineage lives in its own space.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Space(pub String);

impl Space {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Space {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Space {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Opaque version document emitted by a resource check.
pub type Version = BTreeMap<String, String>;

/// Space to version mapping handed to a check as its starting point.
pub type VersionSet = HashMap<Space, Version>;

/// Single `name: value` metadata pair attached to a discovered version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataField {
    pub name: String,
    pub value: String,
}

/// Persisted version row belonging to exactly one resource config and space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceVersion {
    pub id: ResourceVersionId,
    pub resource_config_id: ResourceConfigId,
    pub space: Space,
    pub version: Version,
    /// Monotonically increasing position in the config's version stream.
    pub check_order: i64,
    #[serde(default)]
    pub metadata: Vec<MetadataField>,
    #[serde(default)]
    pub partial: bool,
    pub discovered_at: DateTime<Utc>,
}

/// Build a [`Version`] from string pairs.
pub fn version<I, K, V>(pairs: I) -> Version
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
