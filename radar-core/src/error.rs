use std::time::Duration;

use thiserror::Error;

/// Structured failure of a resource script run inside a check container.
///
/// Carries its own diagnostics, so it travels through the scanner untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq, Default)]
#[error("resource script '{path} {args:?}' failed: exit status {exit_status}{}", stderr_suffix(.stderr))]
pub struct ScriptFailure {
    pub path: String,
    pub args: Vec<String>,
    pub exit_status: i32,
    pub stderr: String,
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\n\nstderr:\n{stderr}")
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Another node holds the check lock or the cooldown has not elapsed.
    /// Periodic callers should retry after `interval`.
    #[error("failed to acquire lock")]
    FailedToAcquireLock { interval: Duration },

    #[error("resource type not found: {name}")]
    ResourceTypeNotFound { name: String },

    #[error("time: invalid duration {value}")]
    InvalidInterval { value: String },

    #[error("resource type cycle detected: {}", chain.join(" -> "))]
    ResourceTypeCycle { chain: Vec<String> },

    #[error("undefined vars: {}", names.join(", "))]
    UndefinedVariables { names: Vec<String> },

    #[error(transparent)]
    ScriptFailed(#[from] ScriptFailure),

    #[error("{0}")]
    Check(String),

    #[error("{0}")]
    Placement(String),

    #[error("{0}")]
    Container(String),

    #[error("{0}")]
    Storage(String),

    #[error("scan cancelled")]
    Cancelled,
}

impl ScanError {
    /// True for the "try again later" sentinel returned by periodic runs.
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, ScanError::FailedToAcquireLock { .. })
    }

    /// Interval the caller should wait before the next periodic attempt, when
    /// the error carries one.
    pub fn retry_interval(&self) -> Option<Duration> {
        match self {
            ScanError::FailedToAcquireLock { interval } => Some(*interval),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
