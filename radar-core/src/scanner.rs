//! Run / Scan / ScanFromVersion entry points for pipeline resource-types.

use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use radar_model::{Source, VersionSet, VersionedResourceTypes};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::clock::Clock;
use crate::coordinator::{CheckMode, LockCoordinator};
use crate::creds::{Variables, evaluate_source};
use crate::error::{Result, ScanError};
use crate::executor::{CheckExecutor, CheckRequest, record_check_error};
use crate::pipeline::{Pipeline, ResourceType, versioned_all};
use crate::resolver::{self, ResolutionChain};
use crate::resource::{CheckEventHandlerFactory, ResourceFactory};
use crate::resource_config::ResourceConfig;
use crate::settings::ScannerSettings;
use crate::versions::merge_versions;
use crate::worker::{ContainerPlacementStrategy, WorkerPool};

/// Version discovery for the named resource-types of one pipeline.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Periodic check respecting the cooldown. Returns the interval until the
    /// next attempt; a busy lock or an unexpired cooldown yields
    /// [`ScanError::FailedToAcquireLock`] carrying that interval.
    async fn run(&self, name: &str) -> Result<Duration>;

    /// Immediate check, waiting for the lock as long as it takes.
    async fn scan(&self, name: &str) -> Result<()>;

    /// Like [`Scanner::scan`], checking from `from_version` for every space
    /// without a persisted version.
    async fn scan_from_version(
        &self,
        name: &str,
        from_version: Option<VersionSet>,
    ) -> Result<()>;
}

/// Collaborators a [`ResourceTypeScanner`] is built from.
#[derive(Clone)]
pub struct ScannerDeps {
    pub pipeline: Arc<dyn Pipeline>,
    pub clock: Arc<dyn Clock>,
    pub pool: Arc<dyn WorkerPool>,
    pub strategy: Arc<dyn ContainerPlacementStrategy>,
    pub resource_factory: Arc<dyn ResourceFactory>,
    pub handler_factory: Arc<dyn CheckEventHandlerFactory>,
    pub variables: Arc<dyn Variables>,
}

impl fmt::Debug for ScannerDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannerDeps")
            .field("pipeline", &self.pipeline.name())
            .field("clock", &self.clock)
            .field("pool", &type_name_of_val(self.pool.as_ref()))
            .field("strategy", &type_name_of_val(self.strategy.as_ref()))
            .finish_non_exhaustive()
    }
}

/// [`Scanner`] for the resource-types of one pipeline.
///
/// Each call resolves the type and any unversioned parent types, binds the
/// resource-config, passes the lock and cooldown gates, then hands the check
/// to the [`CheckExecutor`]. Failures are recorded on the type (setup) or the
/// config (check) before being returned.
pub struct ResourceTypeScanner {
    pipeline: Arc<dyn Pipeline>,
    variables: Arc<dyn Variables>,
    coordinator: LockCoordinator,
    executor: CheckExecutor,
    settings: ScannerSettings,
}

impl fmt::Debug for ResourceTypeScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTypeScanner")
            .field("pipeline", &self.pipeline.name())
            .field("coordinator", &self.coordinator)
            .field("executor", &self.executor)
            .field("settings", &self.settings)
            .finish()
    }
}

impl ResourceTypeScanner {
    pub fn new(deps: ScannerDeps, settings: ScannerSettings) -> Self {
        Self::with_cancellation(deps, settings, CancellationToken::new())
    }

    /// Scanner whose lock retry waits end with [`ScanError::Cancelled`] once
    /// `cancel` fires.
    pub fn with_cancellation(
        deps: ScannerDeps,
        settings: ScannerSettings,
        cancel: CancellationToken,
    ) -> Self {
        let coordinator =
            LockCoordinator::new(deps.clock, settings.lock_retry_interval(), cancel);
        let executor = CheckExecutor::new(
            deps.pool,
            deps.strategy,
            deps.resource_factory,
            deps.handler_factory,
            deps.pipeline.team_id(),
            settings.external_url.clone(),
        );
        Self {
            pipeline: deps.pipeline,
            variables: deps.variables,
            coordinator,
            executor,
            settings,
        }
    }

    pub fn settings(&self) -> &ScannerSettings {
        &self.settings
    }

    /// Effective check interval of `resource_type`.
    pub fn interval_for(&self, resource_type: &dyn ResourceType) -> Result<Duration> {
        match resource_type.check_every() {
            Some(value) if !value.is_empty() => parse_interval(value),
            _ => Ok(self.settings.default_interval()),
        }
    }

    pub(crate) async fn scan_ancestor(
        &self,
        name: &str,
        chain: &ResolutionChain,
    ) -> Result<()> {
        self.scan_type(name, CheckMode::Immediate, None, chain.clone())
            .await
            .map(|_| ())
    }

    fn scan_type<'a>(
        &'a self,
        name: &'a str,
        mode: CheckMode,
        from_version: Option<VersionSet>,
        chain: ResolutionChain,
    ) -> BoxFuture<'a, Result<Duration>> {
        let span = tracing::info_span!(
            target: "radar::scan",
            "scan_resource_type",
            pipeline = self.pipeline.name(),
            resource_type = name,
            mode = %mode,
            depth = chain.depth(),
        );
        async move {
            if self.pipeline.check_paused().await? {
                tracing::debug!(target: "radar::scan", "pipeline paused, skipping check");
                return Ok(self.settings.default_interval());
            }

            let Some(resource_type) = self.pipeline.resource_type(name).await? else {
                return Err(ScanError::ResourceTypeNotFound {
                    name: name.to_string(),
                });
            };

            let interval = match self.interval_for(resource_type.as_ref()) {
                Ok(interval) => interval,
                Err(err) => {
                    tracing::error!(target: "radar::scan", error = %err, "failed to parse check interval");
                    record_setup_error(resource_type.as_ref(), &err).await;
                    return Err(err);
                }
            };

            let chain = chain.enter(name);
            let resource_types = self.pipeline.resource_types().await?;
            if let Err(err) =
                resolver::resolve_ancestors(self, resource_type.as_ref(), &resource_types, &chain)
                    .await
            {
                tracing::error!(target: "radar::scan", error = %err, "failed to resolve parent resource type");
                record_setup_error(resource_type.as_ref(), &err).await;
                return Err(err);
            }

            // Parents may have gained versions while being resolved.
            let resource_types = match self.pipeline.resource_types().await {
                Ok(resource_types) => resource_types,
                Err(err) => {
                    tracing::error!(target: "radar::scan", error = %err, "failed to reload resource types");
                    record_setup_error(resource_type.as_ref(), &err).await;
                    return Err(err);
                }
            };
            let Some(resource_type) = resource_types.iter().find(|t| t.name() == name).cloned()
            else {
                let err = ScanError::ResourceTypeNotFound {
                    name: name.to_string(),
                };
                tracing::error!(target: "radar::scan", "resource type removed while resolving parents");
                record_setup_error(resource_type.as_ref(), &err).await;
                return Err(err);
            };

            let dependents = versioned_all(&resource_types).without(name);
            let (config, source) = self
                .bind_config(resource_type.as_ref(), dependents.clone())
                .await?;

            let lock = self
                .coordinator
                .acquire(config.as_ref(), interval, mode)
                .await?;

            let outcome = async {
                let latest = match config.latest_versions().await {
                    Ok(latest) => latest,
                    Err(err) => {
                        tracing::error!(target: "radar::scan", error = %err, "failed to load latest versions");
                        record_check_error(config.as_ref(), &err).await;
                        return Err(err);
                    }
                };
                let from = merge_versions(from_version, &latest);
                self.executor
                    .execute(CheckRequest {
                        resource_type: resource_type.as_ref(),
                        resource_config: Arc::clone(&config),
                        source: &source,
                        resource_types: &dependents,
                        from: &from,
                    })
                    .await
            }
            .await;
            lock.release_quietly().await;

            outcome.map(|()| interval)
        }
        .instrument(span)
        .boxed()
    }

    /// Evaluate the source and bind the type to its resource-config, keeping
    /// the type's check-setup error in sync with the outcome.
    async fn bind_config(
        &self,
        resource_type: &dyn ResourceType,
        dependents: VersionedResourceTypes,
    ) -> Result<(Arc<dyn ResourceConfig>, Source)> {
        let bound = match evaluate_source(self.variables.as_ref(), resource_type.source()).await
        {
            Ok(source) => resource_type
                .set_resource_config(source.clone(), dependents)
                .await
                .map(|config| (config, source)),
            Err(err) => Err(err),
        };

        match bound {
            Ok(bound) => {
                resource_type.set_check_setup_error(None).await?;
                Ok(bound)
            }
            Err(err) => {
                tracing::error!(target: "radar::scan", error = %err, "failed to set resource config");
                record_setup_error(resource_type, &err).await;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl Scanner for ResourceTypeScanner {
    async fn run(&self, name: &str) -> Result<Duration> {
        self.scan_type(name, CheckMode::Periodic, None, ResolutionChain::default())
            .await
    }

    async fn scan(&self, name: &str) -> Result<()> {
        self.scan_type(name, CheckMode::Immediate, None, ResolutionChain::default())
            .await
            .map(|_| ())
    }

    async fn scan_from_version(
        &self,
        name: &str,
        from_version: Option<VersionSet>,
    ) -> Result<()> {
        self.scan_type(
            name,
            CheckMode::Immediate,
            from_version,
            ResolutionChain::default(),
        )
        .await
        .map(|_| ())
    }
}

/// Parse a `check_every` value such as `10ms`, `1m` or `1h 30m`.
pub fn parse_interval(value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim()).map_err(|_| ScanError::InvalidInterval {
        value: value.to_string(),
    })
}

async fn record_setup_error(resource_type: &dyn ResourceType, err: &ScanError) {
    if let Err(save_err) = resource_type.set_check_setup_error(Some(err)).await {
        tracing::warn!(
            target: "radar::scan",
            resource_type = resource_type.name(),
            error = %save_err,
            "failed to record check setup error"
        );
    }
}
