//! SSH connector and session using russh crate

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::keys::ssh_key;
use russh::keys::{PrivateKeyWithHashAlg, decode_secret_key};
use russh::{Channel, ChannelMsg, Disconnect, client};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{BuildError, ConnectError, ExecError};
use crate::keys::resolve_key_path;
use crate::result::{CommandResult, ConnectionSpec, Host};
use crate::traits::{Connector, Session};

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all server keys (like StrictHostKeyChecking=no)
        Ok(true)
    }
}

/// SSH connector
///
/// Holds the resolved user and key path. Safe to share across host tasks;
/// every `connect` opens a fresh session.
#[derive(Debug, Clone)]
pub struct SshConnector {
    /// Resolved credentials, key path already expanded
    spec: ConnectionSpec,
    /// russh client configuration
    config: Arc<client::Config>,
}

impl SshConnector {
    /// Create a connector for `user` authenticating with the key at `key_path`
    ///
    /// `key_path` may start with `~` or reference environment variables.
    ///
    /// # Errors
    /// Returns `BuildError` if the user is empty or the key can't be expanded
    /// or read.
    pub fn new(user: &str, key_path: &str) -> Result<Self, BuildError> {
        let user = user.trim();
        if user.is_empty() {
            return Err(BuildError::EmptyUser);
        }

        let key_path = resolve_key_path(key_path)?;

        info!(user = %user, key = %key_path.display(), "created SSH connector");

        Ok(Self {
            spec: ConnectionSpec::new(user, key_path),
            config: Arc::new(client::Config::default()),
        })
    }

    async fn load_key(&self) -> Result<ssh_key::PrivateKey, ConnectError> {
        let path = &self.spec.key_path;
        let unreadable = |e: &dyn std::fmt::Display| {
            ConnectError::KeyUnreadable(format!("{}: {e}", path.display()))
        };

        let pem = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| unreadable(&e))?;
        decode_secret_key(&pem, None).map_err(|e| unreadable(&e))
    }

    async fn open(&self, host: &Host, user: &str) -> Result<SshSession, ConnectError> {
        let mut handle = client::connect(
            self.config.clone(),
            (host.address.as_str(), host.port),
            SshClientHandler,
        )
        .await
        .map_err(|e| ConnectError::Unreachable(format!("{}: {e}", host.endpoint())))?;

        let key_pair = self.load_key().await?;

        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        let key = PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg);
        let auth_res = handle
            .authenticate_publickey(user, key)
            .await
            .map_err(|e| ConnectError::AuthFailed(e.to_string()))?;

        if !auth_res.success() {
            return Err(ConnectError::AuthFailed(format!(
                "public key rejected for {user}@{}",
                host.address
            )));
        }

        Ok(SshSession {
            host: host.clone(),
            handle: Some(handle),
        })
    }
}

#[async_trait]
impl Connector for SshConnector {
    #[instrument(skip(self), fields(host = %host.endpoint()))]
    async fn connect(
        &self,
        host: &Host,
        timeout: Duration,
    ) -> Result<Box<dyn Session>, ConnectError> {
        if host.address.trim().is_empty() {
            return Err(ConnectError::InvalidHost("empty address".to_string()));
        }

        let user = self.spec.user_for(host);
        if user.is_empty() {
            return Err(ConnectError::AuthFailed(format!(
                "empty user for {}",
                host.address
            )));
        }

        debug!(user = %user, timeout = ?timeout, "connecting to SSH");

        let session = tokio::time::timeout(timeout, self.open(host, user))
            .await
            .map_err(|_| ConnectError::Timeout { timeout })??;

        info!(user = %user, "SSH connected and authenticated");

        Ok(Box::new(session))
    }

    fn connector_type(&self) -> &'static str {
        "ssh"
    }
}

/// One authenticated SSH connection
pub struct SshSession {
    host: Host,
    handle: Option<client::Handle<SshClientHandler>>,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("host", &self.host)
            .field("connected", &self.handle.is_some())
            .finish()
    }
}

/// Read channel messages until the server closes the channel
async fn collect_output(channel: &mut Channel<client::Msg>) -> (i32, Vec<u8>, Vec<u8>) {
    let mut status = -1;
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    // exit-status may arrive after EOF, so wait for the channel to close
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
            ChannelMsg::ExtendedData { data, ext } if ext == 1 => {
                stderr.extend_from_slice(&data);
            }
            ChannelMsg::ExitStatus { exit_status } => status = exit_status.cast_signed(),
            ChannelMsg::Close => break,
            _ => {}
        }
    }

    (status, stdout, stderr)
}

/// Drive one remote exchange under the command timeout and the cancel token
///
/// Dropping `exchange` drops its channel, so an interrupted command is no
/// longer listened to but keeps running on the remote side.
async fn interruptible<T>(
    exchange: impl Future<Output = Result<T, ExecError>>,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<T, ExecError> {
    let limited = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| ExecError::Timeout { timeout: limit })?,
            None => exchange.await,
        }
    };

    tokio::select! {
        () = cancel.cancelled() => Err(ExecError::Canceled),
        res = limited => res,
    }
}

#[async_trait]
impl Session for SshSession {
    #[instrument(skip(self, cancel), fields(host = %self.host.endpoint()))]
    async fn run(
        &mut self,
        cmd: &str,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<CommandResult, ExecError> {
        let handle = self.handle.as_ref().ok_or(ExecError::NotConnected)?;

        if cancel.is_cancelled() {
            return Err(ExecError::Canceled);
        }

        debug!(command = %cmd, "executing remote command");
        let start = Instant::now();

        // every remote round trip, channel open included, is interruptible
        let exchange = async {
            let mut channel = handle
                .channel_open_session()
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;

            channel
                .exec(true, cmd)
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;

            Ok::<_, ExecError>(collect_output(&mut channel).await)
        };

        let outcome = interruptible(exchange, timeout, cancel).await;

        let (status, stdout, stderr) = match outcome {
            Ok(collected) => collected,
            Err(e) => {
                warn!(
                    command = %cmd,
                    error = %e,
                    elapsed = ?start.elapsed(),
                    "remote command interrupted"
                );
                return Err(e);
            }
        };

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&stdout).to_string();
        let stderr = String::from_utf8_lossy(&stderr).to_string();

        debug!(
            command = %cmd,
            status = status,
            duration = ?duration,
            "remote command completed"
        );

        if status != 0 {
            error!(command = %cmd, status = status, stderr = %stderr, "command failed");
        }

        Ok(CommandResult {
            status,
            stdout,
            stderr,
            duration,
        })
    }

    async fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            match handle
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
            {
                Ok(()) => info!(host = %self.host.endpoint(), "SSH disconnected"),
                Err(e) => {
                    warn!(host = %self.host.endpoint(), error = %e, "SSH disconnect failed");
                }
            }
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if self.handle.is_some() {
            warn!(host = %self.host.endpoint(), "SSH session dropped without close");
        }
    }
}
