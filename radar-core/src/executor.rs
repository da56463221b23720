//! Runs a single check of a bound resource-config inside a worker container.

use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;

use radar_model::{Source, TeamId, VersionSet, VersionedResourceTypes};

use crate::error::{Result, ScanError};
use crate::pipeline::ResourceType;
use crate::resource::{CheckEventHandlerFactory, ResourceFactory};
use crate::resource_config::ResourceConfig;
use crate::worker::{
    CONTAINER_EXPIRIES, ContainerKind, ContainerMetadata, ContainerOwner,
    ContainerPlacementStrategy, ContainerSpec, ImageSpec, WorkerPool, WorkerSpec,
};

/// Everything a single check needs besides its collaborators.
pub struct CheckRequest<'a> {
    pub resource_type: &'a dyn ResourceType,
    pub resource_config: Arc<dyn ResourceConfig>,
    /// Evaluated source, free of credential placeholders.
    pub source: &'a Source,
    /// Custom types the container may need, excluding the checked type.
    pub resource_types: &'a VersionedResourceTypes,
    pub from: &'a VersionSet,
}

impl fmt::Debug for CheckRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckRequest")
            .field("resource_type", &self.resource_type.name())
            .field("resource_config", &self.resource_config.id())
            .field("resource_types", &self.resource_types.len())
            .field("from", self.from)
            .finish()
    }
}

/// Places check containers and runs checks in them on behalf of one team.
pub struct CheckExecutor {
    pool: Arc<dyn WorkerPool>,
    strategy: Arc<dyn ContainerPlacementStrategy>,
    resource_factory: Arc<dyn ResourceFactory>,
    handler_factory: Arc<dyn CheckEventHandlerFactory>,
    team_id: TeamId,
    external_url: String,
}

impl fmt::Debug for CheckExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckExecutor")
            .field("pool", &type_name_of_val(self.pool.as_ref()))
            .field("strategy", &type_name_of_val(self.strategy.as_ref()))
            .field("team_id", &self.team_id)
            .field("external_url", &self.external_url)
            .finish()
    }
}

impl CheckExecutor {
    pub fn new(
        pool: Arc<dyn WorkerPool>,
        strategy: Arc<dyn ContainerPlacementStrategy>,
        resource_factory: Arc<dyn ResourceFactory>,
        handler_factory: Arc<dyn CheckEventHandlerFactory>,
        team_id: TeamId,
        external_url: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            strategy,
            resource_factory,
            handler_factory,
            team_id,
            external_url: external_url.into(),
        }
    }

    pub fn container_spec(&self, resource_type: &dyn ResourceType) -> ContainerSpec {
        ContainerSpec {
            image_spec: ImageSpec {
                resource_type: resource_type.type_name().to_string(),
                privileged: resource_type.privileged(),
            },
            tags: resource_type.tags().clone(),
            team_id: self.team_id,
            env: vec![format!("ATC_EXTERNAL_URL={}", self.external_url)],
        }
    }

    pub fn worker_spec(
        &self,
        resource_type: &dyn ResourceType,
        resource_types: &VersionedResourceTypes,
    ) -> WorkerSpec {
        WorkerSpec {
            resource_type: resource_type.type_name().to_string(),
            tags: resource_type.tags().clone(),
            resource_types: resource_types.clone(),
            team_id: self.team_id,
        }
    }

    /// Place a check container and run the check in it.
    ///
    /// Placement failures and check failures are recorded as the config's
    /// check error before being returned; a successful check clears it.
    pub async fn execute(&self, request: CheckRequest<'_>) -> Result<()> {
        let config = request.resource_config.as_ref();
        let owner = ContainerOwner::check_session(config.id(), CONTAINER_EXPIRIES);
        let container_spec = self.container_spec(request.resource_type);
        let worker_spec = self.worker_spec(request.resource_type, request.resource_types);

        let worker = match self
            .pool
            .find_or_choose_worker_for_container(
                &owner,
                &container_spec,
                &worker_spec,
                self.strategy.as_ref(),
            )
            .await
        {
            Ok(worker) => worker,
            Err(err) => {
                tracing::error!(
                    target: "radar::check",
                    resource_type = request.resource_type.name(),
                    error = %err,
                    "failed to choose a worker"
                );
                record_check_error(config, &err).await;
                return Err(err);
            }
        };

        let metadata = ContainerMetadata {
            kind: ContainerKind::Check,
        };
        let container = match worker
            .find_or_create_container(
                &owner,
                &metadata,
                &container_spec,
                request.resource_types,
            )
            .await
        {
            Ok(container) => container,
            Err(err) => {
                tracing::error!(
                    target: "radar::check",
                    resource_type = request.resource_type.name(),
                    worker = worker.name(),
                    error = %err,
                    "failed to create check container"
                );
                record_check_error(config, &err).await;
                return Err(err);
            }
        };

        tracing::debug!(
            target: "radar::check",
            resource_type = request.resource_type.name(),
            worker = worker.name(),
            container = container.handle(),
            spaces = request.from.len(),
            "checking"
        );

        let resource = self.resource_factory.new_resource_for_container(container);
        let handler = self
            .handler_factory
            .handler_for(Arc::clone(&request.resource_config));

        match resource.check(handler, request.source, request.from).await {
            Ok(()) => config.set_check_error(None).await,
            Err(err) => {
                tracing::warn!(
                    target: "radar::check",
                    resource_type = request.resource_type.name(),
                    error = %err,
                    "check failed"
                );
                record_check_error(config, &err).await;
                Err(err)
            }
        }
    }
}

pub(crate) async fn record_check_error(config: &dyn ResourceConfig, err: &ScanError) {
    if let Err(save_err) = config.set_check_error(Some(err)).await {
        tracing::warn!(
            target: "radar::check",
            resource_config = %config.id(),
            error = %save_err,
            "failed to record check error"
        );
    }
}
