use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::scanner::Scanner;

/// Drives [`Scanner::run`] for a single resource-type until cancelled.
pub struct IntervalRunner {
    scanner: Arc<dyn Scanner>,
    clock: Arc<dyn Clock>,
    name: String,
    default_interval: Duration,
    cancel: CancellationToken,
}

impl fmt::Debug for IntervalRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalRunner")
            .field("name", &self.name)
            .field("default_interval", &self.default_interval)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl IntervalRunner {
    pub fn new(
        scanner: Arc<dyn Scanner>,
        clock: Arc<dyn Clock>,
        name: impl Into<String>,
        default_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            scanner,
            clock,
            name: name.into(),
            default_interval,
            cancel,
        }
    }

    /// Loop until the token fires. Returns the number of completed ticks.
    ///
    /// A tick waits the interval returned by the scanner. Lock contention
    /// waits the interval carried by the error; any other failure is logged
    /// and waits the default interval.
    pub async fn run(&self) -> u64 {
        let mut ticks = 0;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let wait = tokio::select! {
                _ = self.cancel.cancelled() => break,
                outcome = self.scanner.run(&self.name) => self.next_wait(outcome),
            };
            ticks += 1;
            if self.cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.clock.sleep(wait) => {}
            }
        }

        tracing::info!(
            target: "radar::runner",
            resource_type = %self.name,
            ticks,
            "interval runner stopped"
        );
        ticks
    }

    fn next_wait(&self, outcome: crate::error::Result<Duration>) -> Duration {
        match outcome {
            Ok(interval) => interval,
            Err(err) => match err.retry_interval() {
                Some(interval) => {
                    tracing::debug!(
                        target: "radar::runner",
                        resource_type = %self.name,
                        "resource type checked elsewhere or too recently"
                    );
                    interval
                }
                None => {
                    tracing::warn!(
                        target: "radar::runner",
                        resource_type = %self.name,
                        error = %err,
                        "failed to check resource type"
                    );
                    self.default_interval
                }
            },
        }
    }
}
