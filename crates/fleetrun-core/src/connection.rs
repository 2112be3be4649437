//! Effective SSH user and key resolution
//!
//! The same setting may be supplied on the command line, on the task and as
//! a playbook default. The first layer that sets it wins, in that order.

use std::sync::Arc;

use fleetrun_exec::{ConnectionSpec, Connector, DEFAULT_KEY_PATH, SshConnector};
use fleetrun_playbook::{PlayBook, Task};

use crate::error::RunnerError;

/// User and key as supplied by one configuration layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionLayer {
    pub user: Option<String>,
    pub ssh_key: Option<String>,
}

impl ConnectionLayer {
    pub fn new(user: Option<&str>, ssh_key: Option<&str>) -> Self {
        Self {
            user: user.map(str::to_string),
            ssh_key: ssh_key.map(str::to_string),
        }
    }

    /// Task-level overrides
    #[must_use]
    pub fn from_task(task: &Task) -> Self {
        Self::new(task.user.as_deref(), task.ssh_key.as_deref())
    }

    /// Playbook-wide defaults
    #[must_use]
    pub fn from_playbook(playbook: &PlayBook) -> Self {
        Self::new(playbook.user.as_deref(), playbook.ssh_key.as_deref())
    }
}

fn first_set<'a>(values: [Option<&'a str>; 3]) -> Option<&'a str> {
    values
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
}

/// Effective (user, key): command line > task > global
///
/// Empty strings count as unset. When no layer names a key the default
/// `~/.ssh/id_rsa` is used; when no layer names a user the result has an
/// empty user, which connector construction rejects.
#[must_use]
pub fn connection_spec(
    cmdline: &ConnectionLayer,
    task: &ConnectionLayer,
    global: &ConnectionLayer,
) -> ConnectionSpec {
    let user = first_set([
        cmdline.user.as_deref(),
        task.user.as_deref(),
        global.user.as_deref(),
    ])
    .unwrap_or_default();

    let key = first_set([
        cmdline.ssh_key.as_deref(),
        task.ssh_key.as_deref(),
        global.ssh_key.as_deref(),
    ])
    .unwrap_or(DEFAULT_KEY_PATH);

    ConnectionSpec::new(user, key)
}

/// Build the SSH connector for a resolved spec
///
/// # Errors
/// Returns `RunnerError::ConnectorBuild` if the user is empty or the key
/// can't be expanded or read.
pub fn ssh_connector(spec: &ConnectionSpec) -> Result<Arc<dyn Connector>, RunnerError> {
    let key = spec.key_path.to_string_lossy();
    let connector = SshConnector::new(&spec.user, &key)?;
    Ok(Arc::new(connector))
}
