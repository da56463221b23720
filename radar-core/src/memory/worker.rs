use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use radar_model::{Tags, TeamId, VersionedResourceTypes};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Result, ScanError};
use crate::worker::{
    Container, ContainerMetadata, ContainerOwner, ContainerPlacementStrategy, ContainerSpec,
    Worker, WorkerPool, WorkerSpec,
};

/// Simulated check container.
#[derive(Clone, Debug)]
pub struct MemoryContainer {
    handle: String,
    worker_name: String,
    spec: ContainerSpec,
    resource_types: VersionedResourceTypes,
}

impl MemoryContainer {
    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    pub fn resource_types(&self) -> &VersionedResourceTypes {
        &self.resource_types
    }
}

impl Container for MemoryContainer {
    fn handle(&self) -> &str {
        &self.handle
    }

    fn worker_name(&self) -> &str {
        &self.worker_name
    }
}

/// Simulated worker advertising a set of base resource types and tags,
/// optionally dedicated to a single team.
pub struct MemoryWorker {
    name: String,
    base_types: HashSet<String>,
    tags: Tags,
    team_id: Option<TeamId>,
    containers: Mutex<HashMap<ContainerOwner, Arc<MemoryContainer>>>,
}

impl fmt::Debug for MemoryWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut base_types: Vec<_> = self.base_types.iter().collect();
        base_types.sort();
        f.debug_struct("MemoryWorker")
            .field("name", &self.name)
            .field("base_types", &base_types)
            .field("tags", &self.tags)
            .field("team_id", &self.team_id)
            .finish_non_exhaustive()
    }
}

impl MemoryWorker {
    pub fn new<I, S>(name: impl Into<String>, base_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            base_types: base_types.into_iter().map(Into::into).collect(),
            tags: Tags::new(),
            team_id: None,
            containers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn for_team(mut self, team_id: TeamId) -> Self {
        self.team_id = Some(team_id);
        self
    }

    pub async fn containers(&self) -> Vec<Arc<MemoryContainer>> {
        self.containers.lock().await.values().cloned().collect()
    }

    /// Follow custom types down to the base type a worker has to provide.
    fn base_type_of<'a>(resource_type: &'a str, resource_types: &'a VersionedResourceTypes) -> Option<&'a str> {
        let mut current = resource_type;
        for _ in 0..=resource_types.len() {
            match resource_types.lookup(current) {
                Some(custom) if custom.resource_type.type_name != current => {
                    current = &custom.resource_type.type_name;
                }
                _ => return Some(current),
            }
        }
        None
    }
}

#[async_trait]
impl Worker for MemoryWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn satisfies(&self, spec: &WorkerSpec) -> bool {
        let provides_type = Self::base_type_of(&spec.resource_type, &spec.resource_types)
            .is_some_and(|base| self.base_types.contains(base));
        let has_tags = spec.tags.iter().all(|tag| self.tags.contains(tag));
        let serves_team = self.team_id.is_none_or(|team| team == spec.team_id);
        provides_type && has_tags && serves_team
    }

    async fn find_or_create_container(
        &self,
        owner: &ContainerOwner,
        _metadata: &ContainerMetadata,
        container_spec: &ContainerSpec,
        resource_types: &VersionedResourceTypes,
    ) -> Result<Arc<dyn Container>> {
        let mut containers = self.containers.lock().await;
        if let Some(existing) = containers.get(owner) {
            return Ok(Arc::clone(existing) as Arc<dyn Container>);
        }

        let container = Arc::new(MemoryContainer {
            handle: Uuid::new_v4().to_string(),
            worker_name: self.name.clone(),
            spec: container_spec.clone(),
            resource_types: resource_types.clone(),
        });
        tracing::debug!(
            target: "radar::memory",
            worker = %self.name,
            owner = %owner,
            handle = %container.handle,
            "container created"
        );
        containers.insert(owner.clone(), Arc::clone(&container));
        Ok(container)
    }
}

/// Fixed set of [`MemoryWorker`]s. Owners stick to the worker that first
/// hosted them while it still satisfies the request.
#[derive(Default)]
pub struct MemoryWorkerPool {
    workers: Vec<Arc<MemoryWorker>>,
    assignments: Mutex<HashMap<ContainerOwner, String>>,
}

impl fmt::Debug for MemoryWorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.workers.iter().map(|w| w.name.as_str()).collect();
        f.debug_struct("MemoryWorkerPool")
            .field("workers", &names)
            .finish_non_exhaustive()
    }
}

impl MemoryWorkerPool {
    pub fn new(workers: Vec<Arc<MemoryWorker>>) -> Self {
        Self {
            workers,
            assignments: Mutex::new(HashMap::new()),
        }
    }

    pub fn worker(&self, name: &str) -> Option<Arc<MemoryWorker>> {
        self.workers.iter().find(|w| w.name == name).cloned()
    }
}

#[async_trait]
impl WorkerPool for MemoryWorkerPool {
    async fn find_or_choose_worker_for_container(
        &self,
        owner: &ContainerOwner,
        container_spec: &ContainerSpec,
        worker_spec: &WorkerSpec,
        strategy: &dyn ContainerPlacementStrategy,
    ) -> Result<Arc<dyn Worker>> {
        let mut assignments = self.assignments.lock().await;

        if let Some(assigned) = assignments
            .get(owner)
            .and_then(|name| self.worker(name))
            .filter(|worker| worker.satisfies(worker_spec))
        {
            return Ok(assigned as Arc<dyn Worker>);
        }

        let candidates: Vec<Arc<dyn Worker>> = self
            .workers
            .iter()
            .filter(|worker| worker.satisfies(worker_spec))
            .map(|worker| Arc::clone(worker) as Arc<dyn Worker>)
            .collect();
        if candidates.is_empty() {
            return Err(ScanError::Placement(format!(
                "no workers satisfying: resource type '{}', tags {:?}, team {}",
                worker_spec.resource_type, worker_spec.tags, worker_spec.team_id
            )));
        }

        let chosen = strategy.choose(&candidates, container_spec)?;
        assignments.insert(owner.clone(), chosen.name().to_string());
        Ok(chosen)
    }
}
