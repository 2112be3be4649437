//! Error types for fleetrun-playbook

use thiserror::Error;

use fleetrun_exec::HostParseError;

/// Errors loading a playbook or resolving its tasks and targets
#[derive(Error, Debug)]
pub enum PlaybookError {
    /// Playbook file could not be read
    #[error("can't read playbook {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Playbook file is not valid TOML/YAML for the expected shape
    #[error("can't parse playbook: {0}")]
    Parse(String),

    /// Playbook parsed but violates a structural rule
    #[error("invalid playbook: {0}")]
    Invalid(String),

    /// No task with this name
    #[error("unknown task {0:?}")]
    UnknownTask(String),

    /// No target with this name, or it resolved to no hosts
    #[error("unknown target {0:?}")]
    UnknownTarget(String),

    /// Inventory source could not be loaded
    #[error("inventory for target {target:?}: {source}")]
    Inventory {
        target: String,
        #[source]
        source: InventoryError,
    },
}

/// Errors loading an inventory file or endpoint
#[derive(Error, Debug)]
pub enum InventoryError {
    /// Inventory path could not be expanded
    #[error("can't expand inventory path {path}: {reason}")]
    Expand { path: String, reason: String },

    /// Inventory file could not be read
    #[error("can't read inventory file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// HTTP request failed
    #[error("inventory request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    /// HTTP endpoint returned an error status
    #[error("inventory endpoint {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// A line is not a valid host
    #[error("{origin}:{line}: {source}")]
    InvalidHost {
        origin: String,
        line: usize,
        #[source]
        source: HostParseError,
    },
}
