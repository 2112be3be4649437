//! fleetrun-core: Task execution engine
//!
//! Resolves a task and target into commands and hosts, then runs the
//! commands on every host concurrently through a `Connector`, bounded by a
//! concurrency limit and interruptible through a shared cancellation token.

pub mod connection;
pub mod error;
pub mod filter;
pub mod resolver;
pub mod result;
pub mod runner;

pub use connection::{ConnectionLayer, connection_spec, ssh_connector};
pub use error::RunnerError;
pub use filter::CommandFilter;
pub use resolver::Resolver;
pub use result::{CommandOutcome, CommandStatus, HostResult, HostStatus, RunResult};
pub use runner::{DEFAULT_CONNECT_TIMEOUT, Process};
