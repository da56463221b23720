//! Contracts for running a check inside a container and sinking its output.

use std::sync::Arc;

use async_trait::async_trait;
use radar_model::{MetadataField, Source, Space, Version, VersionSet};

use crate::error::Result;
use crate::resource_config::ResourceConfig;
use crate::worker::Container;

/// Sink for the events a check emits while it runs. Persisting discovered
/// versions is the handler's job.
#[async_trait]
pub trait CheckEventHandler: Send + Sync {
    /// The space versions without an explicit space belong to.
    async fn default_space(&self, space: Space) -> Result<()>;

    async fn discovered(
        &self,
        space: Space,
        version: Version,
        metadata: Vec<MetadataField>,
    ) -> Result<()>;

    /// Called once after the last version has been emitted.
    async fn finish(&self) -> Result<()>;
}

/// Builds the handler that receives the events of one check.
pub trait CheckEventHandlerFactory: Send + Sync {
    fn handler_for(
        &self,
        resource_config: Arc<dyn ResourceConfig>,
    ) -> Arc<dyn CheckEventHandler>;
}

/// A resource bound to a running container.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Run the check script starting from `from`, reporting discoveries to
    /// `handler`. Script failures come back as
    /// [`ScanError::ScriptFailed`](crate::error::ScanError::ScriptFailed).
    async fn check(
        &self,
        handler: Arc<dyn CheckEventHandler>,
        source: &Source,
        from: &VersionSet,
    ) -> Result<()>;
}

pub trait ResourceFactory: Send + Sync {
    fn new_resource_for_container(
        &self,
        container: Arc<dyn Container>,
    ) -> Arc<dyn Resource>;
}
