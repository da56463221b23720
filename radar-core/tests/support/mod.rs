//! Recording fakes for every scanner collaborator.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use radar_core::clock::VirtualClock;
use radar_core::creds::StaticVariables;
use radar_core::error::{Result, ScanError};
use radar_core::pipeline::{Pipeline, ResourceType};
use radar_core::resource::{CheckEventHandler, CheckEventHandlerFactory, Resource, ResourceFactory};
use radar_core::resource_config::{Lock, ResourceConfig};
use radar_core::scanner::{ResourceTypeScanner, ScannerDeps};
use radar_core::settings::ScannerSettings;
use radar_core::worker::{
    Container, ContainerMetadata, ContainerOwner, ContainerPlacementStrategy, ContainerSpec,
    RandomPlacementStrategy, Worker, WorkerPool, WorkerSpec,
};
use radar_model::{
    MetadataField, PipelineId, ResourceConfigId, ResourceTypeId, ResourceVersion, Source, Space,
    Tags, TeamId, Version, VersionSet, VersionedResourceTypes,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn source(value: Value) -> Source {
    match value {
        Value::Object(map) => map,
        other => panic!("source must be a JSON object, got {other}"),
    }
}

#[derive(Default)]
pub struct FakeLock {
    releases: AtomicUsize,
}

impl FakeLock {
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

struct SharedLock(Arc<FakeLock>);

#[async_trait]
impl Lock for SharedLock {
    async fn release(&self) -> Result<()> {
        self.0.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeResourceConfig {
    id: ResourceConfigId,
    pub lock: Arc<FakeLock>,
    acquire_results: Mutex<VecDeque<bool>>,
    update_results: Mutex<VecDeque<bool>>,
    acquire_calls: AtomicUsize,
    update_args: Mutex<Vec<(Duration, bool)>>,
    latest: Mutex<Result<Vec<ResourceVersion>>>,
    check_errors: Mutex<Vec<Option<String>>>,
    cancel_on_acquire: Mutex<Option<(usize, CancellationToken)>>,
}

impl FakeResourceConfig {
    pub fn new(id: i32) -> Arc<Self> {
        Arc::new(Self {
            id: ResourceConfigId(id),
            lock: Arc::new(FakeLock::default()),
            acquire_results: Mutex::new(VecDeque::new()),
            update_results: Mutex::new(VecDeque::new()),
            acquire_calls: AtomicUsize::new(0),
            update_args: Mutex::new(Vec::new()),
            latest: Mutex::new(Ok(Vec::new())),
            check_errors: Mutex::new(Vec::new()),
            cancel_on_acquire: Mutex::new(None),
        })
    }

    /// Queue lock acquisition outcomes; once drained, acquisition succeeds.
    pub fn acquire_returns(&self, results: impl IntoIterator<Item = bool>) {
        locked(&self.acquire_results).extend(results);
    }

    /// Queue cooldown outcomes; once drained, updates succeed.
    pub fn update_last_checked_returns(&self, results: impl IntoIterator<Item = bool>) {
        locked(&self.update_results).extend(results);
    }

    pub fn never_acquire(&self) {
        locked(&self.acquire_results).extend(std::iter::repeat_n(false, 1_000));
    }

    pub fn cancel_on_acquire_call(&self, call: usize, token: CancellationToken) {
        *locked(&self.cancel_on_acquire) = Some((call, token));
    }

    pub fn set_latest_versions(&self, rows: Vec<ResourceVersion>) {
        *locked(&self.latest) = Ok(rows);
    }

    pub fn latest_versions_fail(&self, err: ScanError) {
        *locked(&self.latest) = Err(err);
    }

    pub fn acquire_call_count(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn update_last_checked_args(&self) -> Vec<(Duration, bool)> {
        locked(&self.update_args).clone()
    }

    pub fn check_errors(&self) -> Vec<Option<String>> {
        locked(&self.check_errors).clone()
    }
}

#[async_trait]
impl ResourceConfig for FakeResourceConfig {
    fn id(&self) -> ResourceConfigId {
        self.id
    }

    async fn acquire_resource_checking_lock(&self) -> Result<Option<Box<dyn Lock>>> {
        let call = self.acquire_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = locked(&self.cancel_on_acquire).as_ref()
            && *at == call
        {
            token.cancel();
        }
        let acquired = locked(&self.acquire_results).pop_front().unwrap_or(true);
        Ok(acquired.then(|| Box::new(SharedLock(Arc::clone(&self.lock))) as Box<dyn Lock>))
    }

    async fn update_last_checked(&self, interval: Duration, immediate: bool) -> Result<bool> {
        locked(&self.update_args).push((interval, immediate));
        Ok(locked(&self.update_results).pop_front().unwrap_or(true))
    }

    async fn latest_versions(&self) -> Result<Vec<ResourceVersion>> {
        locked(&self.latest).clone()
    }

    async fn set_check_error(&self, err: Option<&ScanError>) -> Result<()> {
        locked(&self.check_errors).push(err.map(ToString::to_string));
        Ok(())
    }
}

pub struct FakeResourceType {
    id: ResourceTypeId,
    name: String,
    type_name: String,
    source: Source,
    tags: Tags,
    check_every: Option<String>,
    version: Option<Version>,
    config: Mutex<Result<Arc<dyn ResourceConfig>>>,
    set_config_args: Mutex<Vec<(Source, VersionedResourceTypes)>>,
    setup_errors: Mutex<Vec<Option<String>>>,
}

impl FakeResourceType {
    pub fn new(id: i32, name: &str, type_name: &str) -> Self {
        Self {
            id: ResourceTypeId(id),
            name: name.to_string(),
            type_name: type_name.to_string(),
            source: Source::new(),
            tags: Tags::new(),
            check_every: None,
            version: None,
            config: Mutex::new(Err(ScanError::Storage("no resource config configured".into()))),
            set_config_args: Mutex::new(Vec::new()),
            setup_errors: Mutex::new(Vec::new()),
        }
    }

    pub fn with_source(mut self, value: Value) -> Self {
        self.source = source(value);
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_check_every(mut self, value: &str) -> Self {
        self.check_every = Some(value.to_string());
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn returning_config(self, config: Arc<dyn ResourceConfig>) -> Self {
        *locked(&self.config) = Ok(config);
        self
    }

    pub fn set_resource_config_fails(&self, err: ScanError) {
        *locked(&self.config) = Err(err);
    }

    pub fn set_resource_config_args(&self) -> Vec<(Source, VersionedResourceTypes)> {
        locked(&self.set_config_args).clone()
    }

    pub fn setup_errors(&self) -> Vec<Option<String>> {
        locked(&self.setup_errors).clone()
    }

    /// Recorded setup errors, without the clears.
    pub fn recorded_setup_errors(&self) -> Vec<String> {
        self.setup_errors().into_iter().flatten().collect()
    }
}

#[async_trait]
impl ResourceType for FakeResourceType {
    fn id(&self) -> ResourceTypeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn source(&self) -> &Source {
        &self.source
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn check_every(&self) -> Option<&str> {
        self.check_every.as_deref()
    }

    fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    async fn set_resource_config(
        &self,
        source: Source,
        resource_types: VersionedResourceTypes,
    ) -> Result<Arc<dyn ResourceConfig>> {
        locked(&self.set_config_args).push((source, resource_types));
        locked(&self.config).clone()
    }

    async fn set_check_setup_error(&self, err: Option<&ScanError>) -> Result<()> {
        locked(&self.setup_errors).push(err.map(ToString::to_string));
        Ok(())
    }
}

type LookupResult = Result<Option<Arc<dyn ResourceType>>>;
type TypesResult = Result<Vec<Arc<dyn ResourceType>>>;

pub struct FakePipeline {
    types: Mutex<Vec<Arc<dyn ResourceType>>>,
    types_on_call: Mutex<HashMap<usize, TypesResult>>,
    lookup_on_call: Mutex<HashMap<usize, LookupResult>>,
    types_calls: AtomicUsize,
    lookup_args: Mutex<Vec<String>>,
    paused: AtomicBool,
}

impl FakePipeline {
    pub fn new(types: Vec<Arc<dyn ResourceType>>) -> Self {
        Self {
            types: Mutex::new(types),
            types_on_call: Mutex::new(HashMap::new()),
            lookup_on_call: Mutex::new(HashMap::new()),
            types_calls: AtomicUsize::new(0),
            lookup_args: Mutex::new(Vec::new()),
            paused: AtomicBool::new(false),
        }
    }

    pub fn set_resource_types(&self, types: Vec<Arc<dyn ResourceType>>) {
        *locked(&self.types) = types;
    }

    /// Override the result of the `call`-th (zero based) `resource_types()`.
    pub fn resource_types_on_call(&self, call: usize, result: TypesResult) {
        locked(&self.types_on_call).insert(call, result);
    }

    /// Override the result of the `call`-th (zero based) `resource_type()`.
    pub fn resource_type_on_call(&self, call: usize, result: LookupResult) {
        locked(&self.lookup_on_call).insert(call, result);
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn resource_types_call_count(&self) -> usize {
        self.types_calls.load(Ordering::SeqCst)
    }

    pub fn resource_type_args(&self) -> Vec<String> {
        locked(&self.lookup_args).clone()
    }
}

#[async_trait]
impl Pipeline for FakePipeline {
    fn id(&self) -> PipelineId {
        PipelineId(42)
    }

    fn name(&self) -> &str {
        "some-pipeline"
    }

    fn team_id(&self) -> TeamId {
        TeamId(123)
    }

    async fn resource_types(&self) -> Result<Vec<Arc<dyn ResourceType>>> {
        let call = self.types_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = locked(&self.types_on_call).get(&call) {
            return result.clone();
        }
        Ok(locked(&self.types).clone())
    }

    async fn resource_type(&self, name: &str) -> Result<Option<Arc<dyn ResourceType>>> {
        let call = {
            let mut args = locked(&self.lookup_args);
            args.push(name.to_string());
            args.len() - 1
        };
        if let Some(result) = locked(&self.lookup_on_call).get(&call) {
            return result.clone();
        }
        Ok(locked(&self.types)
            .iter()
            .find(|t| t.name() == name)
            .cloned())
    }

    async fn check_paused(&self) -> Result<bool> {
        Ok(self.paused.load(Ordering::SeqCst))
    }
}

pub struct FakeContainer {
    handle: String,
}

impl Container for FakeContainer {
    fn handle(&self) -> &str {
        &self.handle
    }

    fn worker_name(&self) -> &str {
        "some-worker"
    }
}

pub struct FakeWorker {
    container: Mutex<Result<Arc<dyn Container>>>,
    calls: Mutex<Vec<(ContainerOwner, ContainerMetadata, ContainerSpec, VersionedResourceTypes)>>,
}

impl FakeWorker {
    pub fn new() -> Self {
        Self {
            container: Mutex::new(Ok(Arc::new(FakeContainer {
                handle: "some-handle".into(),
            }))),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn container_fails(&self, err: ScanError) {
        *locked(&self.container) = Err(err);
    }

    pub fn calls(
        &self,
    ) -> Vec<(ContainerOwner, ContainerMetadata, ContainerSpec, VersionedResourceTypes)> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl Worker for FakeWorker {
    fn name(&self) -> &str {
        "some-worker"
    }

    fn satisfies(&self, _spec: &WorkerSpec) -> bool {
        true
    }

    async fn find_or_create_container(
        &self,
        owner: &ContainerOwner,
        metadata: &ContainerMetadata,
        container_spec: &ContainerSpec,
        resource_types: &VersionedResourceTypes,
    ) -> Result<Arc<dyn Container>> {
        locked(&self.calls).push((
            owner.clone(),
            metadata.clone(),
            container_spec.clone(),
            resource_types.clone(),
        ));
        locked(&self.container).clone()
    }
}

pub struct FakePool {
    worker: Mutex<Result<Arc<dyn Worker>>>,
    calls: Mutex<Vec<(ContainerOwner, ContainerSpec, WorkerSpec)>>,
}

impl FakePool {
    pub fn new(worker: Arc<dyn Worker>) -> Self {
        Self {
            worker: Mutex::new(Ok(worker)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn choose_fails(&self, err: ScanError) {
        *locked(&self.worker) = Err(err);
    }

    pub fn calls(&self) -> Vec<(ContainerOwner, ContainerSpec, WorkerSpec)> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl WorkerPool for FakePool {
    async fn find_or_choose_worker_for_container(
        &self,
        owner: &ContainerOwner,
        container_spec: &ContainerSpec,
        worker_spec: &WorkerSpec,
        _strategy: &dyn ContainerPlacementStrategy,
    ) -> Result<Arc<dyn Worker>> {
        locked(&self.calls).push((owner.clone(), container_spec.clone(), worker_spec.clone()));
        locked(&self.worker).clone()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CheckBehaviour {
    Return,
    Panic,
    Hang,
}

pub struct FakeResource {
    result: Mutex<Result<()>>,
    behaviour: Mutex<CheckBehaviour>,
    calls: Mutex<Vec<(Source, VersionSet)>>,
}

impl FakeResource {
    pub fn new() -> Self {
        Self {
            result: Mutex::new(Ok(())),
            behaviour: Mutex::new(CheckBehaviour::Return),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn check_panics(&self) {
        *locked(&self.behaviour) = CheckBehaviour::Panic;
    }

    /// The check never completes.
    pub fn check_hangs(&self) {
        *locked(&self.behaviour) = CheckBehaviour::Hang;
    }

    pub fn check_fails(&self, err: ScanError) {
        *locked(&self.result) = Err(err);
    }

    pub fn check_count(&self) -> usize {
        locked(&self.calls).len()
    }

    pub fn checks(&self) -> Vec<(Source, VersionSet)> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl Resource for FakeResource {
    async fn check(
        &self,
        _handler: Arc<dyn CheckEventHandler>,
        source: &Source,
        from: &VersionSet,
    ) -> Result<()> {
        locked(&self.calls).push((source.clone(), from.clone()));
        let behaviour = *locked(&self.behaviour);
        match behaviour {
            CheckBehaviour::Return => locked(&self.result).clone(),
            CheckBehaviour::Panic => panic!("check script crashed"),
            CheckBehaviour::Hang => std::future::pending().await,
        }
    }
}

pub struct FakeResourceFactory {
    resource: Arc<FakeResource>,
    containers: Mutex<Vec<String>>,
}

impl FakeResourceFactory {
    pub fn new(resource: Arc<FakeResource>) -> Self {
        Self {
            resource,
            containers: Mutex::new(Vec::new()),
        }
    }

    pub fn container_handles(&self) -> Vec<String> {
        locked(&self.containers).clone()
    }
}

impl ResourceFactory for FakeResourceFactory {
    fn new_resource_for_container(&self, container: Arc<dyn Container>) -> Arc<dyn Resource> {
        locked(&self.containers).push(container.handle().to_string());
        Arc::clone(&self.resource) as Arc<dyn Resource>
    }
}

struct NoopHandler;

#[async_trait]
impl CheckEventHandler for NoopHandler {
    async fn default_space(&self, _space: Space) -> Result<()> {
        Ok(())
    }

    async fn discovered(
        &self,
        _space: Space,
        _version: Version,
        _metadata: Vec<MetadataField>,
    ) -> Result<()> {
        Ok(())
    }

    async fn finish(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeHandlerFactory {
    configs: Mutex<Vec<ResourceConfigId>>,
}

impl FakeHandlerFactory {
    pub fn config_ids(&self) -> Vec<ResourceConfigId> {
        locked(&self.configs).clone()
    }
}

impl CheckEventHandlerFactory for FakeHandlerFactory {
    fn handler_for(&self, resource_config: Arc<dyn ResourceConfig>) -> Arc<dyn CheckEventHandler> {
        locked(&self.configs).push(resource_config.id());
        Arc::new(NoopHandler)
    }
}

/// Yield to the runtime until `condition` holds, for work handed to
/// background tasks.
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not met after 100 yields");
}

pub const INTERVAL: Duration = Duration::from_secs(60);
pub const EXTERNAL_URL: &str = "https://www.example.com";

/// One pipeline declaring `some-custom-resource` (a versioned custom type
/// built from `registry-image`) wired to recording fakes.
pub struct Harness {
    pub pipeline: Arc<FakePipeline>,
    pub resource_type: Arc<FakeResourceType>,
    pub config: Arc<FakeResourceConfig>,
    pub pool: Arc<FakePool>,
    pub worker: Arc<FakeWorker>,
    pub resource: Arc<FakeResource>,
    pub resource_factory: Arc<FakeResourceFactory>,
    pub handler_factory: Arc<FakeHandlerFactory>,
    pub clock: VirtualClock,
    pub cancel: CancellationToken,
}

impl Harness {
    pub fn new() -> Self {
        let config = FakeResourceConfig::new(123);
        Self::with_resource_type(
            FakeResourceType::new(39, "some-custom-resource", "registry-image")
                .with_source(json!({"custom": "((source-params))"}))
                .with_tags(&["some-tag"])
                .with_version(radar_model::version([("custom", "version")]))
                .returning_config(config.clone()),
            config,
        )
    }

    pub fn with_resource_type(
        resource_type: FakeResourceType,
        config: Arc<FakeResourceConfig>,
    ) -> Self {
        let resource_type = Arc::new(resource_type);
        let pipeline = Arc::new(FakePipeline::new(vec![
            Arc::clone(&resource_type) as Arc<dyn ResourceType>
        ]));
        let worker = Arc::new(FakeWorker::new());
        let resource = Arc::new(FakeResource::new());
        Self {
            pipeline,
            resource_type,
            config,
            pool: Arc::new(FakePool::new(Arc::clone(&worker) as Arc<dyn Worker>)),
            worker,
            resource_factory: Arc::new(FakeResourceFactory::new(Arc::clone(&resource))),
            resource,
            handler_factory: Arc::new(FakeHandlerFactory::default()),
            clock: VirtualClock::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn scanner(&self) -> ResourceTypeScanner {
        let deps = ScannerDeps {
            pipeline: Arc::clone(&self.pipeline) as Arc<dyn Pipeline>,
            clock: Arc::new(self.clock.clone()),
            pool: Arc::clone(&self.pool) as Arc<dyn WorkerPool>,
            strategy: Arc::new(RandomPlacementStrategy),
            resource_factory: Arc::clone(&self.resource_factory) as Arc<dyn ResourceFactory>,
            handler_factory: Arc::clone(&self.handler_factory) as Arc<dyn CheckEventHandlerFactory>,
            variables: Arc::new(
                StaticVariables::new().with("source-params", "some-secret-sauce"),
            ),
        };
        let settings = ScannerSettings::default()
            .with_default_interval(INTERVAL)
            .with_external_url(EXTERNAL_URL);
        ResourceTypeScanner::with_cancellation(deps, settings, self.cancel.clone())
    }
}
