//! Host, connection and command result types

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Result of a command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit status code (0 for success, -1 if the server sent none)
    pub status: i32,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Combine stdout and stderr
    #[must_use]
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// A destination host with optional per-host overrides
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    /// IP address or hostname
    pub address: String,
    /// Port (default 22)
    #[serde(default = "default_port")]
    pub port: u16,
    /// User override for this host only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Host {
    /// Create a host on the default port
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: DEFAULT_PORT,
            user: None,
        }
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set per-host user
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// `address:port`, used for deduplication and log fields
    ///
    /// IPv6 addresses are bracketed so the port stays unambiguous.
    #[must_use]
    pub fn endpoint(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{user}@")?;
        }
        f.write_str(&self.endpoint())
    }
}

/// Error parsing a `[user@]address[:port]` host string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostParseError {
    #[error("empty host")]
    Empty,

    #[error("empty user in host {0:?}")]
    EmptyUser(String),

    #[error("invalid port in host {0:?}")]
    InvalidPort(String),

    #[error("unclosed '[' in host {0:?}")]
    Unclosed(String),
}

impl FromStr for Host {
    type Err = HostParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(HostParseError::Empty);
        }

        let (user, rest) = match s.rsplit_once('@') {
            Some((user, _)) if user.is_empty() => {
                return Err(HostParseError::EmptyUser(s.to_string()));
            }
            Some((user, rest)) => (Some(user.to_string()), rest),
            None => (None, s),
        };

        let invalid_port = || HostParseError::InvalidPort(s.to_string());

        let (address, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            // [v6addr] or [v6addr]:port
            let (addr, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| HostParseError::Unclosed(s.to_string()))?;
            let port = match tail {
                "" => DEFAULT_PORT,
                _ => tail
                    .strip_prefix(':')
                    .and_then(|p| p.parse::<u16>().ok())
                    .ok_or_else(invalid_port)?,
            };
            (addr, port)
        } else {
            // bare IPv6 addresses contain colons, only split when it's unambiguous
            match rest.rsplit_once(':') {
                Some((addr, port)) if !addr.contains(':') => {
                    (addr, port.parse::<u16>().map_err(|_| invalid_port())?)
                }
                _ => (rest, DEFAULT_PORT),
            }
        };

        if address.is_empty() {
            return Err(HostParseError::Empty);
        }

        Ok(Self {
            address: address.to_string(),
            port,
            user,
        })
    }
}

/// Resolved credentials used to authenticate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSpec {
    /// SSH user
    pub user: String,
    /// Path to the private key, may still contain `~`
    pub key_path: PathBuf,
}

impl ConnectionSpec {
    /// Create a new connection spec
    pub fn new(user: impl Into<String>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            user: user.into(),
            key_path: key_path.into(),
        }
    }

    /// User for a given host, honoring the host-level override
    #[must_use]
    pub fn user_for<'a>(&'a self, host: &'a Host) -> &'a str {
        host.user.as_deref().unwrap_or(&self.user)
    }
}
