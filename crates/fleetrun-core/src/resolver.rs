//! Task and target resolution seam

use async_trait::async_trait;

use fleetrun_exec::Host;
use fleetrun_playbook::{PlayBook, PlaybookError, Task};

/// Turns task and target names into commands and hosts
///
/// Target overrides are part of the resolver's own state.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Look up a task by name
    fn task(&self, name: &str) -> Result<Task, PlaybookError>;

    /// Resolve a target to its deduplicated host list, in inventory order
    async fn target_hosts(&self, name: &str) -> Result<Vec<Host>, PlaybookError>;
}

#[async_trait]
impl Resolver for PlayBook {
    fn task(&self, name: &str) -> Result<Task, PlaybookError> {
        PlayBook::task(self, name).cloned()
    }

    async fn target_hosts(&self, name: &str) -> Result<Vec<Host>, PlaybookError> {
        PlayBook::target_hosts(self, name).await
    }
}
