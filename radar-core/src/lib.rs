//! # Radar Core
//!
//! Version discovery for the custom resource-types declared by a pipeline.
//!
//! ## Overview
//!
//! For every resource-type the scanner decides whether a check is due, makes
//! sure only one node checks a given resource-config at a time, bootstraps
//! custom types that are themselves built from other custom types, and runs
//! the check from the newest known version of every space.
//!
//! - **Scanning**: [`scanner::Scanner`] with periodic (`run`) and immediate
//!   (`scan`, `scan_from_version`) entry points
//! - **Locking**: [`coordinator::LockCoordinator`] for the checking lock and
//!   the cooldown stamp
//! - **Version merging**: [`versions::merge_versions`]
//! - **Collaborators**: storage, placement and check contracts in
//!   [`pipeline`], [`resource_config`], [`worker`] and [`resource`]
//! - **In-memory backend**: [`memory`] implements every collaborator in
//!   process
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use radar_core::clock::SystemClock;
//! use radar_core::creds::StaticVariables;
//! use radar_core::memory::{
//!     MemoryCheckEventHandlerFactory, MemoryStore, MemoryWorker, MemoryWorkerPool,
//!     ScriptedResourceFactory,
//! };
//! use radar_core::scanner::{ResourceTypeScanner, Scanner, ScannerDeps};
//! use radar_core::settings::ScannerSettings;
//! use radar_core::worker::RandomPlacementStrategy;
//! use radar_model::{ResourceTypeConfig, TeamId};
//!
//! async fn check_now() -> radar_core::error::Result<()> {
//!     let store = MemoryStore::new(Arc::new(SystemClock));
//!     let pipeline = store
//!         .create_pipeline(
//!             "main",
//!             TeamId(1),
//!             vec![ResourceTypeConfig::new("git-lfs", "registry-image")],
//!         )
//!         .await;
//!
//!     let scanner = ResourceTypeScanner::new(
//!         ScannerDeps {
//!             pipeline: Arc::new(pipeline),
//!             clock: store.clock(),
//!             pool: Arc::new(MemoryWorkerPool::new(vec![Arc::new(MemoryWorker::new(
//!                 "worker-1",
//!                 ["registry-image"],
//!             ))])),
//!             strategy: Arc::new(RandomPlacementStrategy),
//!             resource_factory: Arc::new(ScriptedResourceFactory::new(|_, _| Ok(vec![]))),
//!             handler_factory: Arc::new(MemoryCheckEventHandlerFactory::new(store.clone())),
//!             variables: Arc::new(StaticVariables::new()),
//!         },
//!         ScannerSettings::default(),
//!     );
//!
//!     scanner.scan("git-lfs").await
//! }
//! ```

#![allow(missing_docs)]

/// Time source used by retry waits and cooldowns
pub mod clock;

/// Lock and cooldown gates
pub mod coordinator;

/// `((var))` credential interpolation
pub mod creds;

pub mod error;

/// Container placement and check invocation
pub mod executor;

/// In-process implementations of every collaborator
pub mod memory;

pub mod pipeline;

mod resolver;

pub mod resource;

pub mod resource_config;

/// Periodic driver for a single resource-type
pub mod runner;

/// Run / Scan / ScanFromVersion state machine
pub mod scanner;

pub mod settings;

pub mod versions;

pub mod worker;

pub use error::{Result, ScanError, ScriptFailure};
pub use scanner::{ResourceTypeScanner, Scanner, ScannerDeps};
pub use settings::ScannerSettings;
