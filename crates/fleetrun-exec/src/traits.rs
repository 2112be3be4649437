//! Connector and session traits

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ConnectError, ExecError};
use crate::result::{CommandResult, Host};

/// Establishes authenticated sessions with remote hosts
///
/// A connector is built once per run with the resolved credentials and is
/// shared read-only by every host's unit of work.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open an authenticated session to `host`, giving up after `timeout`
    async fn connect(&self, host: &Host, timeout: Duration)
    -> Result<Box<dyn Session>, ConnectError>;

    fn connector_type(&self) -> &'static str;
}

/// One live connection to a single host
///
/// Owned exclusively by the unit of work for that host.
#[async_trait]
pub trait Session: Send {
    /// Run one command line in the remote shell
    ///
    /// A non-zero exit status is a normal `CommandResult`. Returns
    /// `ExecError::Canceled` promptly once `cancel` fires and
    /// `ExecError::Timeout` if `timeout` elapses first.
    async fn run(
        &mut self,
        cmd: &str,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<CommandResult, ExecError>;

    /// Release the connection. Calling it again is a no-op.
    async fn close(&mut self);
}
