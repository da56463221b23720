//! Storage-facing contracts for pipelines and their resource-types.

use std::sync::Arc;

use async_trait::async_trait;
use radar_model::{
    PipelineId, ResourceTypeConfig, ResourceTypeId, Source, Space, Tags, TeamId,
    Version, VersionedResourceType, VersionedResourceTypes,
};

use crate::error::{Result, ScanError};
use crate::resource_config::ResourceConfig;

/// Read access to the pipeline whose resource-types are being scanned.
#[async_trait]
pub trait Pipeline: Send + Sync {
    fn id(&self) -> PipelineId;

    fn name(&self) -> &str;

    fn team_id(&self) -> TeamId;

    /// Fresh snapshot of every resource-type declared by the pipeline.
    async fn resource_types(&self) -> Result<Vec<Arc<dyn ResourceType>>>;

    async fn resource_type(
        &self,
        name: &str,
    ) -> Result<Option<Arc<dyn ResourceType>>>;

    async fn check_paused(&self) -> Result<bool>;
}

/// Snapshot of a resource-type row plus the mutations the scanner performs
/// on it.
#[async_trait]
pub trait ResourceType: Send + Sync {
    fn id(&self) -> ResourceTypeId;

    fn name(&self) -> &str;

    /// Declared base type; either worker-provided or another custom type.
    fn type_name(&self) -> &str;

    fn source(&self) -> &Source;

    fn tags(&self) -> &Tags;

    fn check_every(&self) -> Option<&str>;

    fn version(&self) -> Option<&Version>;

    /// Default space the type's versions are grouped under, if declared.
    fn space(&self) -> Option<&Space> {
        None
    }

    fn privileged(&self) -> bool {
        false
    }

    /// Bind the type to the config identified by its evaluated source and the
    /// custom types it may be built from, creating the config on first use.
    async fn set_resource_config(
        &self,
        source: Source,
        resource_types: VersionedResourceTypes,
    ) -> Result<Arc<dyn ResourceConfig>>;

    /// Record (or clear, with `None`) the error that prevented a check from
    /// being set up.
    async fn set_check_setup_error(&self, err: Option<&ScanError>) -> Result<()>;
}

/// Configuration and current version of `resource_type`, in the shape handed
/// to workers that need to build custom type images.
pub fn versioned(resource_type: &dyn ResourceType) -> VersionedResourceType {
    VersionedResourceType {
        resource_type: ResourceTypeConfig {
            name: resource_type.name().to_string(),
            type_name: resource_type.type_name().to_string(),
            source: resource_type.source().clone(),
            check_every: resource_type.check_every().map(str::to_string),
            tags: resource_type.tags().clone(),
            space: resource_type.space().cloned(),
            privileged: resource_type.privileged(),
        },
        version: resource_type.version().cloned(),
    }
}

pub fn versioned_all(
    resource_types: &[Arc<dyn ResourceType>],
) -> VersionedResourceTypes {
    resource_types.iter().map(|t| versioned(t.as_ref())).collect()
}
