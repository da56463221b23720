//! Lock and cooldown gates guarding a resource-config check.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use radar_model::ResourceConfigId;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::{Result, ScanError};
use crate::resource_config::{Lock, ResourceConfig};

/// Lower bound on the wait between lock attempts of an immediate scan.
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// How a caller reacts when either gate is closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CheckMode {
    /// Scheduler tick: respect the cooldown, give up at once when blocked.
    Periodic,
    /// Operator request: bypass the cooldown, wait for the lock.
    Immediate,
}

impl CheckMode {
    pub fn is_immediate(self) -> bool {
        matches!(self, CheckMode::Immediate)
    }
}

impl fmt::Display for CheckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckMode::Periodic => f.write_str("periodic"),
            CheckMode::Immediate => f.write_str("immediate"),
        }
    }
}

/// Takes the checking lock and stamps the cooldown for one resource-config.
#[derive(Clone)]
pub struct LockCoordinator {
    clock: Arc<dyn Clock>,
    retry_interval: Duration,
    cancel: CancellationToken,
}

impl fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("clock", &self.clock)
            .field("retry_interval", &self.retry_interval)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl LockCoordinator {
    pub fn new(
        clock: Arc<dyn Clock>,
        retry_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            clock,
            retry_interval: retry_interval.max(MIN_RETRY_INTERVAL),
            cancel,
        }
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Pass both gates and hand back the held lock.
    ///
    /// In [`CheckMode::Periodic`] a closed gate returns
    /// [`ScanError::FailedToAcquireLock`] carrying `interval`. In
    /// [`CheckMode::Immediate`] the caller waits `retry_interval` on the
    /// clock and both gates are tried again, until they open or the
    /// cancellation token fires. A lock taken while the cooldown gate stays
    /// closed is released before returning or retrying.
    pub async fn acquire(
        &self,
        config: &dyn ResourceConfig,
        interval: Duration,
        mode: CheckMode,
    ) -> Result<LockGuard> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if let Some(lock) = self.try_gates(config, interval, mode).await? {
                tracing::debug!(
                    target: "radar::lock",
                    resource_config = %config.id(),
                    attempt,
                    mode = %mode,
                    "checking lock acquired"
                );
                return Ok(lock);
            }

            if !mode.is_immediate() {
                return Err(ScanError::FailedToAcquireLock { interval });
            }

            tracing::debug!(
                target: "radar::lock",
                resource_config = %config.id(),
                attempt,
                retry_in = ?self.retry_interval,
                "checking lock unavailable, retrying"
            );
            self.wait().await?;
        }
    }

    async fn try_gates(
        &self,
        config: &dyn ResourceConfig,
        interval: Duration,
        mode: CheckMode,
    ) -> Result<Option<LockGuard>> {
        let Some(lock) = config.acquire_resource_checking_lock().await? else {
            return Ok(None);
        };
        let guard = LockGuard::new(lock, config.id());

        match config
            .update_last_checked(interval, mode.is_immediate())
            .await
        {
            Ok(true) => Ok(Some(guard)),
            Ok(false) => {
                guard.release().await?;
                Ok(None)
            }
            Err(err) => {
                guard.release_quietly().await;
                Err(err)
            }
        }
    }

    async fn wait(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ScanError::Cancelled),
            _ = self.clock.sleep(self.retry_interval) => Ok(()),
        }
    }
}

/// Held checking lock of one resource-config.
///
/// Released explicitly with [`LockGuard::release`] or
/// [`LockGuard::release_quietly`]. A guard dropped while still holding the
/// lock (the check panicked or the scan future was abandoned) hands the
/// release to the current tokio runtime.
pub struct LockGuard {
    lock: Option<Box<dyn Lock>>,
    resource_config: ResourceConfigId,
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("resource_config", &self.resource_config)
            .field("held", &self.lock.is_some())
            .finish()
    }
}

impl LockGuard {
    pub fn new(lock: Box<dyn Lock>, resource_config: ResourceConfigId) -> Self {
        Self {
            lock: Some(lock),
            resource_config,
        }
    }

    pub fn resource_config(&self) -> ResourceConfigId {
        self.resource_config
    }

    pub async fn release(mut self) -> Result<()> {
        match self.lock.take() {
            Some(lock) => lock.release().await,
            None => Ok(()),
        }
    }

    /// Release, logging instead of failing. Used on exit paths where an
    /// earlier outcome is already being returned.
    pub async fn release_quietly(self) {
        let resource_config = self.resource_config;
        if let Err(err) = self.release().await {
            log_release_failure(resource_config, &err);
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(lock) = self.lock.take() else {
            return;
        };
        let resource_config = self.resource_config;
        tracing::warn!(
            target: "radar::lock",
            resource_config = %resource_config,
            "checking lock dropped while held, releasing in background"
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = lock.release().await {
                        log_release_failure(resource_config, &err);
                    }
                });
            }
            Err(_) => tracing::error!(
                target: "radar::lock",
                resource_config = %resource_config,
                "no runtime to release dropped checking lock"
            ),
        }
    }
}

fn log_release_failure(resource_config: ResourceConfigId, err: &ScanError) {
    tracing::warn!(
        target: "radar::lock",
        resource_config = %resource_config,
        error = %err,
        "failed to release checking lock"
    );
}
