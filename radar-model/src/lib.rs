//! Core data model definitions shared across Radar crates.
#![allow(missing_docs)]

pub mod ids;
pub mod resource_type;
pub mod version;

pub use ids::{
    PipelineId, ResourceConfigId, ResourceTypeId, ResourceVersionId, TeamId,
};
pub use resource_type::{
    ResourceTypeConfig, Source, Tags, VersionedResourceType,
    VersionedResourceTypes,
};
pub use version::{
    MetadataField, ResourceVersion, Space, Version, VersionSet, version,
};
