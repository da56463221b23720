//! In-process implementations of every scanner collaborator.
//!
//! A [`MemoryStore`] plays the part of the database: pipelines, their
//! resource-types, resource-configs (lock, cooldown stamp, check error) and
//! discovered versions all live behind one async mutex. Workers, containers
//! and check scripts are simulated by the types in [`worker`] and [`check`].
//! Useful for single-node setups and for exercising the scanner end to end.

pub mod check;
pub mod pipeline;
pub mod worker;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use radar_model::{
    MetadataField, PipelineId, ResourceConfigId, ResourceTypeConfig, ResourceTypeId,
    ResourceVersion, ResourceVersionId, Source, Space, TeamId, Version,
    VersionedResourceTypes,
};
use tokio::sync::Mutex;

use crate::clock::{Clock, to_delta};
use crate::error::{Result, ScanError};
use crate::resource_config::{Lock, ResourceConfig};

pub use check::{
    DiscoveredVersion, MemoryCheckEventHandler, MemoryCheckEventHandlerFactory,
    ScriptedResourceFactory,
};
pub use pipeline::{MemoryPipeline, MemoryResourceType};
pub use worker::{MemoryContainer, MemoryWorker, MemoryWorkerPool};

#[derive(Debug, Default)]
struct StoreState {
    pipelines: HashMap<PipelineId, PipelineRecord>,
    configs: HashMap<ResourceConfigId, ConfigRecord>,
    config_keys: HashMap<ConfigKey, ResourceConfigId>,
    next_pipeline_id: i32,
    next_type_id: i32,
    next_config_id: i32,
    next_version_id: i64,
}

#[derive(Debug)]
struct PipelineRecord {
    name: String,
    team_id: TeamId,
    paused: bool,
    resource_types: Vec<TypeRecord>,
}

#[derive(Debug, Clone)]
struct TypeRecord {
    id: ResourceTypeId,
    config: ResourceTypeConfig,
    pinned_version: Option<Version>,
    check_setup_error: Option<String>,
    resource_config_id: Option<ResourceConfigId>,
}

/// Resource-configs are shared by every type with the same base type,
/// evaluated source and parent version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConfigKey {
    type_name: String,
    source: String,
    parent_version: Option<String>,
}

#[derive(Debug)]
struct ConfigRecord {
    locked: bool,
    last_checked: Option<DateTime<Utc>>,
    check_error: Option<String>,
    default_space: Option<Space>,
    versions: Vec<ResourceVersion>,
    next_check_order: i64,
}

impl ConfigRecord {
    fn new() -> Self {
        Self {
            locked: false,
            last_checked: None,
            check_error: None,
            default_space: None,
            versions: Vec::new(),
            next_check_order: 1,
        }
    }

    fn latest_versions(&self) -> Vec<ResourceVersion> {
        let mut latest: HashMap<&Space, &ResourceVersion> = HashMap::new();
        for row in &self.versions {
            let newer = latest
                .get(&row.space)
                .is_none_or(|current| row.check_order > current.check_order);
            if newer {
                latest.insert(&row.space, row);
            }
        }
        let mut rows: Vec<ResourceVersion> = latest.into_values().cloned().collect();
        rows.sort_by(|a, b| a.space.cmp(&b.space));
        rows
    }

    /// The version a resource-type bound to this config currently has.
    fn current_version(&self, space: Option<&Space>) -> Option<Version> {
        let wanted = space.or(self.default_space.as_ref());
        self.versions
            .iter()
            .filter(|row| wanted.is_none_or(|space| &row.space == space))
            .max_by_key(|row| row.check_order)
            .map(|row| row.version.clone())
    }
}

/// Observable state of a resource-type row.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceTypeState {
    pub id: ResourceTypeId,
    pub version: Option<Version>,
    pub check_setup_error: Option<String>,
    pub resource_config_id: Option<ResourceConfigId>,
}

/// Observable state of a resource-config row.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceConfigState {
    pub id: ResourceConfigId,
    pub locked: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub check_error: Option<String>,
    pub default_space: Option<Space>,
    pub versions: Vec<ResourceVersion>,
}

/// Shared in-process database.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("MemoryStore");
        debug.field("clock", &self.clock);
        match self.state.try_lock() {
            Ok(state) => {
                debug
                    .field("pipelines", &state.pipelines.len())
                    .field("configs", &state.configs.len());
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            clock,
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Register a pipeline declaring `resource_types`.
    pub async fn create_pipeline(
        &self,
        name: impl Into<String>,
        team_id: TeamId,
        resource_types: Vec<ResourceTypeConfig>,
    ) -> MemoryPipeline {
        let name = name.into();
        let mut state = self.state.lock().await;
        state.next_pipeline_id += 1;
        let id = PipelineId(state.next_pipeline_id);

        let mut records = Vec::with_capacity(resource_types.len());
        for config in resource_types {
            state.next_type_id += 1;
            records.push(TypeRecord {
                id: ResourceTypeId(state.next_type_id),
                config,
                pinned_version: None,
                check_setup_error: None,
                resource_config_id: None,
            });
        }

        state.pipelines.insert(
            id,
            PipelineRecord {
                name: name.clone(),
                team_id,
                paused: false,
                resource_types: records,
            },
        );
        tracing::debug!(target: "radar::memory", pipeline = %name, id = %id, "pipeline created");

        MemoryPipeline::new(self.clone(), id, name, team_id)
    }

    pub async fn pipeline(&self, id: PipelineId) -> Option<MemoryPipeline> {
        let state = self.state.lock().await;
        let record = state.pipelines.get(&id)?;
        Some(MemoryPipeline::new(
            self.clone(),
            id,
            record.name.clone(),
            record.team_id,
        ))
    }

    pub async fn set_paused(&self, pipeline_id: PipelineId, paused: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let pipeline = state
            .pipelines
            .get_mut(&pipeline_id)
            .ok_or_else(|| missing_pipeline(pipeline_id))?;
        pipeline.paused = paused;
        Ok(())
    }

    /// Fix the version of a resource-type regardless of what its config has
    /// discovered.
    pub async fn pin_version(
        &self,
        pipeline_id: PipelineId,
        name: &str,
        version: Option<Version>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let record = type_record_mut(&mut state, pipeline_id, name)?;
        record.pinned_version = version;
        Ok(())
    }

    pub async fn resource_type_state(
        &self,
        pipeline_id: PipelineId,
        name: &str,
    ) -> Option<ResourceTypeState> {
        let state = self.state.lock().await;
        let pipeline = state.pipelines.get(&pipeline_id)?;
        let record = pipeline
            .resource_types
            .iter()
            .find(|t| t.config.name == name)?;
        Some(ResourceTypeState {
            id: record.id,
            version: effective_version(&state, record),
            check_setup_error: record.check_setup_error.clone(),
            resource_config_id: record.resource_config_id,
        })
    }

    pub async fn resource_config_state(
        &self,
        id: ResourceConfigId,
    ) -> Option<ResourceConfigState> {
        let state = self.state.lock().await;
        state.configs.get(&id).map(|config| ResourceConfigState {
            id,
            locked: config.locked,
            last_checked: config.last_checked,
            check_error: config.check_error.clone(),
            default_space: config.default_space.clone(),
            versions: config.versions.clone(),
        })
    }

    /// Persist a version discovered for `config_id`. Rediscovering a known
    /// version moves it to the end of the space's check order.
    pub async fn save_version(
        &self,
        config_id: ResourceConfigId,
        space: Space,
        version: Version,
        metadata: Vec<MetadataField>,
    ) -> Result<ResourceVersion> {
        let now = self.clock.now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let config = state
            .configs
            .get_mut(&config_id)
            .ok_or_else(|| missing_config(config_id))?;

        let check_order = config.next_check_order;
        config.next_check_order += 1;

        if let Some(existing) = config
            .versions
            .iter_mut()
            .find(|row| row.space == space && row.version == version)
        {
            existing.check_order = check_order;
            existing.metadata = metadata;
            return Ok(existing.clone());
        }

        state.next_version_id += 1;
        let row = ResourceVersion {
            id: ResourceVersionId(state.next_version_id),
            resource_config_id: config_id,
            space,
            version,
            check_order,
            metadata,
            partial: false,
            discovered_at: now,
        };
        config.versions.push(row.clone());
        Ok(row)
    }

    async fn set_default_space(&self, config_id: ResourceConfigId, space: Space) -> Result<()> {
        let mut state = self.state.lock().await;
        let config = state
            .configs
            .get_mut(&config_id)
            .ok_or_else(|| missing_config(config_id))?;
        config.default_space = Some(space);
        Ok(())
    }

    async fn snapshot_types(
        &self,
        pipeline_id: PipelineId,
    ) -> Result<Vec<(TypeRecord, Option<Version>)>> {
        let state = self.state.lock().await;
        let pipeline = state
            .pipelines
            .get(&pipeline_id)
            .ok_or_else(|| missing_pipeline(pipeline_id))?;
        Ok(pipeline
            .resource_types
            .iter()
            .map(|record| (record.clone(), effective_version(&state, record)))
            .collect())
    }

    async fn is_paused(&self, pipeline_id: PipelineId) -> Result<bool> {
        let state = self.state.lock().await;
        state
            .pipelines
            .get(&pipeline_id)
            .map(|pipeline| pipeline.paused)
            .ok_or_else(|| missing_pipeline(pipeline_id))
    }

    async fn bind_config(
        &self,
        pipeline_id: PipelineId,
        name: &str,
        source: &Source,
        resource_types: &VersionedResourceTypes,
    ) -> Result<ResourceConfigId> {
        let mut state = self.state.lock().await;
        let type_name = type_record_mut(&mut state, pipeline_id, name)?
            .config
            .type_name
            .clone();

        let parent_version = match resource_types.lookup(&type_name) {
            Some(parent) => Some(encode(&parent.version)?),
            None => None,
        };
        let key = ConfigKey {
            type_name,
            source: encode(source)?,
            parent_version,
        };

        let id = match state.config_keys.get(&key).copied() {
            Some(id) => id,
            None => {
                state.next_config_id += 1;
                let id = ResourceConfigId(state.next_config_id);
                state.configs.insert(id, ConfigRecord::new());
                state.config_keys.insert(key, id);
                id
            }
        };

        type_record_mut(&mut state, pipeline_id, name)?.resource_config_id = Some(id);
        Ok(id)
    }

    async fn set_check_setup_error(
        &self,
        pipeline_id: PipelineId,
        name: &str,
        err: Option<String>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        type_record_mut(&mut state, pipeline_id, name)?.check_setup_error = err;
        Ok(())
    }
}

fn effective_version(state: &StoreState, record: &TypeRecord) -> Option<Version> {
    if record.pinned_version.is_some() {
        return record.pinned_version.clone();
    }
    record
        .resource_config_id
        .and_then(|id| state.configs.get(&id))
        .and_then(|config| config.current_version(record.config.space.as_ref()))
}

fn type_record_mut<'a>(
    state: &'a mut StoreState,
    pipeline_id: PipelineId,
    name: &str,
) -> Result<&'a mut TypeRecord> {
    state
        .pipelines
        .get_mut(&pipeline_id)
        .ok_or_else(|| missing_pipeline(pipeline_id))?
        .resource_types
        .iter_mut()
        .find(|t| t.config.name == name)
        .ok_or_else(|| ScanError::ResourceTypeNotFound {
            name: name.to_string(),
        })
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|err| ScanError::Storage(err.to_string()))
}

fn missing_pipeline(id: PipelineId) -> ScanError {
    ScanError::Storage(format!("pipeline {id} not found"))
}

fn missing_config(id: ResourceConfigId) -> ScanError {
    ScanError::Storage(format!("resource config {id} not found"))
}

/// Handle on a resource-config row of a [`MemoryStore`].
#[derive(Clone, Debug)]
pub struct MemoryResourceConfig {
    id: ResourceConfigId,
    store: MemoryStore,
}

impl MemoryResourceConfig {
    pub fn new(store: MemoryStore, id: ResourceConfigId) -> Self {
        Self { id, store }
    }
}

#[async_trait]
impl ResourceConfig for MemoryResourceConfig {
    fn id(&self) -> ResourceConfigId {
        self.id
    }

    async fn acquire_resource_checking_lock(&self) -> Result<Option<Box<dyn Lock>>> {
        let mut state = self.store.state.lock().await;
        let config = state
            .configs
            .get_mut(&self.id)
            .ok_or_else(|| missing_config(self.id))?;
        if config.locked {
            return Ok(None);
        }
        config.locked = true;
        Ok(Some(Box::new(MemoryLock {
            config_id: self.id,
            store: self.store.clone(),
            released: AtomicBool::new(false),
        })))
    }

    async fn update_last_checked(&self, interval: Duration, immediate: bool) -> Result<bool> {
        let now = self.store.clock.now();
        let mut state = self.store.state.lock().await;
        let config = state
            .configs
            .get_mut(&self.id)
            .ok_or_else(|| missing_config(self.id))?;

        let cooling_down = config
            .last_checked
            .is_some_and(|last| now - last < to_delta(interval));
        if cooling_down && !immediate {
            return Ok(false);
        }
        config.last_checked = Some(now);
        Ok(true)
    }

    async fn latest_versions(&self) -> Result<Vec<ResourceVersion>> {
        let state = self.store.state.lock().await;
        state
            .configs
            .get(&self.id)
            .map(ConfigRecord::latest_versions)
            .ok_or_else(|| missing_config(self.id))
    }

    async fn set_check_error(&self, err: Option<&ScanError>) -> Result<()> {
        let mut state = self.store.state.lock().await;
        let config = state
            .configs
            .get_mut(&self.id)
            .ok_or_else(|| missing_config(self.id))?;
        config.check_error = err.map(ToString::to_string);
        Ok(())
    }
}

/// Checking lock of a [`MemoryResourceConfig`].
#[derive(Debug)]
pub struct MemoryLock {
    config_id: ResourceConfigId,
    store: MemoryStore,
    released: AtomicBool,
}

#[async_trait]
impl Lock for MemoryLock {
    async fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Err(ScanError::Storage(format!(
                "checking lock of resource config {} already released",
                self.config_id
            )));
        }
        let mut state = self.store.state.lock().await;
        if let Some(config) = state.configs.get_mut(&self.config_id) {
            config.locked = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::pipeline::Pipeline;
    use radar_model::version;

    async fn store_with_config() -> (MemoryStore, VirtualClock, MemoryResourceConfig) {
        let clock = VirtualClock::new();
        let store = MemoryStore::new(Arc::new(clock.clone()));
        let pipeline = store
            .create_pipeline(
                "main",
                TeamId(1),
                vec![ResourceTypeConfig::new("custom", "registry-image")],
            )
            .await;
        let id = store
            .bind_config(
                pipeline.id(),
                "custom",
                &Source::new(),
                &VersionedResourceTypes::default(),
            )
            .await
            .unwrap();
        (store.clone(), clock, MemoryResourceConfig::new(store, id))
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let (_store, _clock, config) = store_with_config().await;

        let lock = config.acquire_resource_checking_lock().await.unwrap().unwrap();
        assert!(config.acquire_resource_checking_lock().await.unwrap().is_none());

        lock.release().await.unwrap();
        assert!(lock.release().await.is_err());
        assert!(config.acquire_resource_checking_lock().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cooldown_only_applies_to_periodic_checks() {
        let (_store, clock, config) = store_with_config().await;
        let interval = Duration::from_secs(60);

        assert!(config.update_last_checked(interval, false).await.unwrap());
        assert!(!config.update_last_checked(interval, false).await.unwrap());
        assert!(config.update_last_checked(interval, true).await.unwrap());

        clock.advance(Duration::from_secs(59));
        assert!(!config.update_last_checked(interval, false).await.unwrap());
        clock.advance(Duration::from_secs(1));
        assert!(config.update_last_checked(interval, false).await.unwrap());
    }

    #[tokio::test]
    async fn latest_versions_keep_one_row_per_space() {
        let (store, _clock, config) = store_with_config().await;
        let id = config.id();

        store
            .save_version(id, Space::from("a"), version([("v", "1")]), vec![])
            .await
            .unwrap();
        store
            .save_version(id, Space::from("a"), version([("v", "2")]), vec![])
            .await
            .unwrap();
        store
            .save_version(id, Space::from("b"), version([("v", "1")]), vec![])
            .await
            .unwrap();
        // Rediscovering v1 makes it the newest again.
        store
            .save_version(id, Space::from("a"), version([("v", "1")]), vec![])
            .await
            .unwrap();

        let latest = config.latest_versions().await.unwrap();
        let summary: Vec<_> = latest
            .iter()
            .map(|row| (row.space.as_str().to_string(), row.version["v"].clone()))
            .collect();
        assert_eq!(
            summary,
            vec![("a".to_string(), "1".to_string()), ("b".to_string(), "1".to_string())]
        );
    }
}
