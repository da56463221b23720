//! Scripted checks and the event handler that persists their results.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use radar_model::{MetadataField, ResourceConfigId, Source, Space, Version, VersionSet};

use super::MemoryStore;
use crate::error::Result;
use crate::resource::{CheckEventHandler, CheckEventHandlerFactory, Resource, ResourceFactory};
use crate::resource_config::ResourceConfig;
use crate::worker::Container;

/// One version reported by a scripted check.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscoveredVersion {
    pub space: Space,
    pub version: Version,
    pub metadata: Vec<MetadataField>,
}

impl DiscoveredVersion {
    pub fn new(space: impl Into<Space>, version: Version) -> Self {
        Self {
            space: space.into(),
            version,
            metadata: Vec::new(),
        }
    }
}

type CheckScript = dyn Fn(&Source, &VersionSet) -> Result<Vec<DiscoveredVersion>> + Send + Sync;

/// Resources whose check runs an in-process closure instead of a script in
/// the container. The first reported space becomes the default space.
#[derive(Clone)]
pub struct ScriptedResourceFactory {
    script: Arc<CheckScript>,
}

impl fmt::Debug for ScriptedResourceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedResourceFactory").finish_non_exhaustive()
    }
}

impl ScriptedResourceFactory {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&Source, &VersionSet) -> Result<Vec<DiscoveredVersion>> + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
        }
    }
}

impl ResourceFactory for ScriptedResourceFactory {
    fn new_resource_for_container(&self, container: Arc<dyn Container>) -> Arc<dyn Resource> {
        Arc::new(ScriptedResource {
            script: Arc::clone(&self.script),
            container,
        })
    }
}

struct ScriptedResource {
    script: Arc<CheckScript>,
    container: Arc<dyn Container>,
}

#[async_trait]
impl Resource for ScriptedResource {
    async fn check(
        &self,
        handler: Arc<dyn CheckEventHandler>,
        source: &Source,
        from: &VersionSet,
    ) -> Result<()> {
        let discovered = (self.script)(source, from)?;
        tracing::debug!(
            target: "radar::memory",
            container = self.container.handle(),
            discovered = discovered.len(),
            "scripted check finished"
        );

        if let Some(first) = discovered.first() {
            handler.default_space(first.space.clone()).await?;
        }
        for found in discovered {
            handler
                .discovered(found.space, found.version, found.metadata)
                .await?;
        }
        handler.finish().await
    }
}

/// Persists check events into a [`MemoryStore`].
#[derive(Clone, Debug)]
pub struct MemoryCheckEventHandlerFactory {
    store: MemoryStore,
}

impl MemoryCheckEventHandlerFactory {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

impl CheckEventHandlerFactory for MemoryCheckEventHandlerFactory {
    fn handler_for(&self, resource_config: Arc<dyn ResourceConfig>) -> Arc<dyn CheckEventHandler> {
        Arc::new(MemoryCheckEventHandler {
            store: self.store.clone(),
            config_id: resource_config.id(),
        })
    }
}

/// Saves the events of one check against its resource-config.
#[derive(Clone, Debug)]
pub struct MemoryCheckEventHandler {
    store: MemoryStore,
    config_id: ResourceConfigId,
}

#[async_trait]
impl CheckEventHandler for MemoryCheckEventHandler {
    async fn default_space(&self, space: Space) -> Result<()> {
        self.store.set_default_space(self.config_id, space).await
    }

    async fn discovered(
        &self,
        space: Space,
        version: Version,
        metadata: Vec<MetadataField>,
    ) -> Result<()> {
        self.store
            .save_version(self.config_id, space, version, metadata)
            .await
            .map(|_| ())
    }

    async fn finish(&self) -> Result<()> {
        tracing::trace!(
            target: "radar::memory",
            resource_config = %self.config_id,
            "check events flushed"
        );
        Ok(())
    }
}
