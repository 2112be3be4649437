//! fleetrun-exec: Remote execution abstraction
//!
//! Provides the `Connector`/`Session` traits and their SSH implementation.

pub mod error;
pub mod keys;
pub mod result;
pub mod ssh;
pub mod traits;

pub use error::{BuildError, ConnectError, ExecError};
pub use keys::{DEFAULT_KEY_PATH, KeyError};
pub use result::{CommandResult, ConnectionSpec, DEFAULT_PORT, Host, HostParseError};
pub use ssh::{SshConnector, SshSession};
pub use traits::{Connector, Session};
pub use tokio_util::sync::CancellationToken;
