//! Core error types for fleetrun-core

use thiserror::Error;

use fleetrun_exec::BuildError;
use fleetrun_playbook::PlaybookError;

/// Process-fatal errors: the run is aborted and no host results are produced
///
/// Host-scoped failures never show up here, they live in `HostResult`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    /// Task not found in the playbook
    #[error("unknown task {0:?}")]
    UnknownTask(String),

    /// Target not found, or it resolved to no hosts
    #[error("unknown target {0:?}")]
    UnknownTarget(String),

    /// Target inventory could not be loaded
    #[error("can't load inventory for target {target:?}: {reason}")]
    Inventory {
        /// Target being resolved
        target: String,
        /// Underlying inventory failure
        reason: String,
    },

    /// Playbook could not be read or is invalid
    #[error("playbook error: {0}")]
    Playbook(String),

    /// Connector could not be constructed from the resolved credentials
    #[error("can't create connector: {0}")]
    ConnectorBuild(String),

    /// Cancellation arrived before any host completed
    #[error("run canceled before any host completed")]
    Canceled,
}

impl From<PlaybookError> for RunnerError {
    fn from(err: PlaybookError) -> Self {
        match err {
            PlaybookError::UnknownTask(name) => RunnerError::UnknownTask(name),
            PlaybookError::UnknownTarget(name) => RunnerError::UnknownTarget(name),
            PlaybookError::Inventory { target, source } => RunnerError::Inventory {
                target,
                reason: source.to_string(),
            },
            other => RunnerError::Playbook(other.to_string()),
        }
    }
}

impl From<BuildError> for RunnerError {
    fn from(err: BuildError) -> Self {
        RunnerError::ConnectorBuild(err.to_string())
    }
}
