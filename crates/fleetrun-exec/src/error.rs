//! Error types for fleetrun-exec

use std::time::Duration;

use thiserror::Error;

/// Errors raised while establishing a session with one host
///
/// All variants are host-scoped: they fail that host's run and nothing else.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// Host address was empty or otherwise unusable
    #[error("invalid host: {0}")]
    InvalidHost(String),

    /// TCP connect or SSH handshake failed
    #[error("host unreachable: {0}")]
    Unreachable(String),

    /// Server rejected the credentials
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Private key could not be read or decoded
    #[error("private key unreadable: {0}")]
    KeyUnreadable(String),

    /// Connection and authentication did not finish in time
    #[error("connect timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },
}

/// Errors that can occur while running a command on an open session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// Command did not complete before its deadline
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// Cancellation was requested while the command was running
    #[error("command canceled")]
    Canceled,

    /// Channel-level failure talking to the remote host
    #[error("I/O error: {0}")]
    IoError(String),

    /// Session was already closed
    #[error("not connected")]
    NotConnected,
}

/// Errors raised while building a connector
#[derive(Error, Debug)]
pub enum BuildError {
    /// No user was supplied at any layer
    #[error("ssh user is empty")]
    EmptyUser,

    /// Key path could not be expanded or read
    #[error(transparent)]
    Key(#[from] crate::keys::KeyError),
}
