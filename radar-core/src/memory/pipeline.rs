//! Pipeline and resource-type views over a [`MemoryStore`].

use std::sync::Arc;

use async_trait::async_trait;
use radar_model::{
    PipelineId, ResourceTypeConfig, ResourceTypeId, Source, Space, Tags, TeamId, Version,
    VersionedResourceTypes,
};

use super::{MemoryResourceConfig, MemoryStore};
use crate::error::{Result, ScanError};
use crate::pipeline::{Pipeline, ResourceType};
use crate::resource_config::ResourceConfig;

/// Pipeline row of a [`MemoryStore`].
#[derive(Clone, Debug)]
pub struct MemoryPipeline {
    store: MemoryStore,
    id: PipelineId,
    name: String,
    team_id: TeamId,
}

impl MemoryPipeline {
    pub(super) fn new(store: MemoryStore, id: PipelineId, name: String, team_id: TeamId) -> Self {
        Self {
            store,
            id,
            name,
            team_id,
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait]
impl Pipeline for MemoryPipeline {
    fn id(&self) -> PipelineId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn team_id(&self) -> TeamId {
        self.team_id
    }

    async fn resource_types(&self) -> Result<Vec<Arc<dyn ResourceType>>> {
        let records = self.store.snapshot_types(self.id).await?;
        Ok(records
            .into_iter()
            .map(|(record, version)| {
                Arc::new(MemoryResourceType {
                    store: self.store.clone(),
                    pipeline_id: self.id,
                    id: record.id,
                    config: record.config,
                    version,
                }) as Arc<dyn ResourceType>
            })
            .collect())
    }

    async fn resource_type(&self, name: &str) -> Result<Option<Arc<dyn ResourceType>>> {
        Ok(self
            .resource_types()
            .await?
            .into_iter()
            .find(|resource_type| resource_type.name() == name))
    }

    async fn check_paused(&self) -> Result<bool> {
        self.store.is_paused(self.id).await
    }
}

/// Snapshot of a resource-type row taken when the pipeline was read.
/// Mutations go straight to the store.
#[derive(Clone, Debug)]
pub struct MemoryResourceType {
    store: MemoryStore,
    pipeline_id: PipelineId,
    id: ResourceTypeId,
    config: ResourceTypeConfig,
    version: Option<Version>,
}

#[async_trait]
impl ResourceType for MemoryResourceType {
    fn id(&self) -> ResourceTypeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn type_name(&self) -> &str {
        &self.config.type_name
    }

    fn source(&self) -> &Source {
        &self.config.source
    }

    fn tags(&self) -> &Tags {
        &self.config.tags
    }

    fn check_every(&self) -> Option<&str> {
        self.config.check_every.as_deref()
    }

    fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    fn space(&self) -> Option<&Space> {
        self.config.space.as_ref()
    }

    fn privileged(&self) -> bool {
        self.config.privileged
    }

    async fn set_resource_config(
        &self,
        source: Source,
        resource_types: VersionedResourceTypes,
    ) -> Result<Arc<dyn ResourceConfig>> {
        let id = self
            .store
            .bind_config(self.pipeline_id, self.name(), &source, &resource_types)
            .await?;
        Ok(Arc::new(MemoryResourceConfig::new(self.store.clone(), id)))
    }

    async fn set_check_setup_error(&self, err: Option<&ScanError>) -> Result<()> {
        self.store
            .set_check_setup_error(self.pipeline_id, self.name(), err.map(ToString::to_string))
            .await
    }
}
