use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::version::{Space, Version};

/// Free-form resource configuration block, possibly containing `((var))`
/// credential placeholders until evaluated.
pub type Source = Map<String, Value>;

/// Worker tags a container must be placed on.
pub type Tags = Vec<String>;

/// Declared configuration of a pipeline resource-type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceTypeConfig {
    pub name: String,
    /// Base type: either a worker-provided type or another custom type's name.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_every: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<Space>,
    #[serde(default)]
    pub privileged: bool,
}

impl ResourceTypeConfig {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_check_every(mut self, check_every: impl Into<String>) -> Self {
        self.check_every = Some(check_every.into());
        self
    }
}

/// A resource-type configuration paired with its currently discovered version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedResourceType {
    #[serde(flatten)]
    pub resource_type: ResourceTypeConfig,
    #[serde(default)]
    pub version: Option<Version>,
}

impl VersionedResourceType {
    pub fn name(&self) -> &str {
        &self.resource_type.name
    }
}

/// Ordered set of custom resource-types a check container may need to build
/// its image from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionedResourceTypes(pub Vec<VersionedResourceType>);

impl VersionedResourceTypes {
    pub fn new(types: Vec<VersionedResourceType>) -> Self {
        Self(types)
    }

    /// Every type except the one called `name`.
    pub fn without(&self, name: &str) -> Self {
        Self(
            self.0
                .iter()
                .filter(|t| t.name() != name)
                .cloned()
                .collect(),
        )
    }

    pub fn lookup(&self, name: &str) -> Option<&VersionedResourceType> {
        self.0.iter().find(|t| t.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionedResourceType> {
        self.0.iter()
    }
}

impl FromIterator<VersionedResourceType> for VersionedResourceTypes {
    fn from_iter<T: IntoIterator<Item = VersionedResourceType>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
