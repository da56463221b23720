//! Container placement contracts consumed by the check executor.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use radar_model::{ResourceConfigId, Tags, TeamId, VersionedResourceTypes};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// Lifetime bounds for containers owned by a check session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerOwnerExpiries {
    pub min: Duration,
    pub max: Duration,
}

/// Check containers live at least five minutes and at most an hour.
pub const CONTAINER_EXPIRIES: ContainerOwnerExpiries = ContainerOwnerExpiries {
    min: Duration::from_secs(5 * 60),
    max: Duration::from_secs(60 * 60),
};

/// Identity that owns a container. Containers with equal owners are reused.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerOwner {
    ResourceConfigCheckSession {
        resource_config_id: ResourceConfigId,
        expiries: ContainerOwnerExpiries,
    },
}

impl ContainerOwner {
    pub fn check_session(
        resource_config_id: ResourceConfigId,
        expiries: ContainerOwnerExpiries,
    ) -> Self {
        ContainerOwner::ResourceConfigCheckSession {
            resource_config_id,
            expiries,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerKind {
    Check,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMetadata {
    pub kind: ContainerKind,
}

/// Image a container is started from: the base resource type to run.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageSpec {
    pub resource_type: String,
    #[serde(default)]
    pub privileged: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image_spec: ImageSpec,
    pub tags: Tags,
    pub team_id: TeamId,
    #[serde(default)]
    pub env: Vec<String>,
}

/// Requirements a worker has to meet to host a container.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub resource_type: String,
    pub tags: Tags,
    pub resource_types: VersionedResourceTypes,
    pub team_id: TeamId,
}

pub trait Container: Send + Sync {
    fn handle(&self) -> &str;

    fn worker_name(&self) -> &str;
}

#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this worker can host containers matching `spec`.
    fn satisfies(&self, spec: &WorkerSpec) -> bool;

    async fn find_or_create_container(
        &self,
        owner: &ContainerOwner,
        metadata: &ContainerMetadata,
        container_spec: &ContainerSpec,
        resource_types: &VersionedResourceTypes,
    ) -> Result<Arc<dyn Container>>;
}

/// Picks one worker among those able to host a container.
pub trait ContainerPlacementStrategy: Send + Sync {
    fn choose(
        &self,
        candidates: &[Arc<dyn Worker>],
        spec: &ContainerSpec,
    ) -> Result<Arc<dyn Worker>>;
}

#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Return the worker already hosting a container for `owner`, or choose
    /// a compatible one with `strategy`.
    async fn find_or_choose_worker_for_container(
        &self,
        owner: &ContainerOwner,
        container_spec: &ContainerSpec,
        worker_spec: &WorkerSpec,
        strategy: &dyn ContainerPlacementStrategy,
    ) -> Result<Arc<dyn Worker>>;
}

/// Uniformly random choice among compatible workers.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomPlacementStrategy;

impl ContainerPlacementStrategy for RandomPlacementStrategy {
    fn choose(
        &self,
        candidates: &[Arc<dyn Worker>],
        spec: &ContainerSpec,
    ) -> Result<Arc<dyn Worker>> {
        candidates.choose(&mut rand::rng()).cloned().ok_or_else(|| {
            ScanError::Placement(format!(
                "no workers satisfying: resource type '{}', tags {:?}, team {}",
                spec.image_spec.resource_type, spec.tags, spec.team_id
            ))
        })
    }
}

impl fmt::Display for ContainerOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerOwner::ResourceConfigCheckSession {
                resource_config_id,
                ..
            } => write!(f, "check-session(resource-config {resource_config_id})"),
        }
    }
}
