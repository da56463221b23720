use std::time::Duration;

use async_trait::async_trait;
use radar_model::{ResourceConfigId, ResourceVersion};

use crate::error::{Result, ScanError};

/// Leased, exclusive handle on a resource config's check lock.
#[async_trait]
pub trait Lock: Send + Sync {
    /// Give the lock back. Called exactly once per successful acquisition.
    async fn release(&self) -> Result<()>;
}

/// Resolved, checkable identity shared by every resource-type bound to the
/// same (type, evaluated source) pair. Owns the check lock, the
/// last-checked stamp and the version history.
#[async_trait]
pub trait ResourceConfig: Send + Sync {
    fn id(&self) -> ResourceConfigId;

    /// Try to take the cluster-wide checking lock. `Ok(None)` means another
    /// holder has it, which is not an error.
    async fn acquire_resource_checking_lock(&self) -> Result<Option<Box<dyn Lock>>>;

    /// Atomically check and stamp the last-checked time. Returns `false` when
    /// `immediate` is unset and less than `interval` has elapsed since the
    /// previous stamp.
    async fn update_last_checked(
        &self,
        interval: Duration,
        immediate: bool,
    ) -> Result<bool>;

    /// The newest version of every space.
    async fn latest_versions(&self) -> Result<Vec<ResourceVersion>>;

    /// Record (or clear, with `None`) the error produced by the last check.
    async fn set_check_error(&self, err: Option<&ScanError>) -> Result<()>;
}
