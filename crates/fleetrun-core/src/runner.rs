//! Process runner: executes one task against every host of one target
//!
//! One tokio task per host, bounded by a semaphore. Every host unit shares a
//! single `CancellationToken` and checks it at each suspension point.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use fleetrun_exec::{Connector, ExecError, Host, Session};
use fleetrun_playbook::Command;

use crate::error::RunnerError;
use crate::filter::CommandFilter;
use crate::resolver::Resolver;
use crate::result::{CommandOutcome, CommandStatus, HostResult, HostStatus, RunResult};

/// Default timeout for establishing a session
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Orchestrates one task against one target
#[derive(Clone)]
pub struct Process {
    /// Maximum number of hosts holding a session at once, at least 1
    pub concurrency: usize,
    pub connector: Arc<dyn Connector>,
    pub resolver: Arc<dyn Resolver>,
    /// Run only commands with these names
    pub only: Vec<String>,
    /// Skip commands with these names
    pub skip: Vec<String>,
    pub connect_timeout: Duration,
    /// Per-command timeout, `None` waits for the command to finish
    pub command_timeout: Option<Duration>,
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("concurrency", &self.concurrency)
            .field("connector", &self.connector.connector_type())
            .field("only", &self.only)
            .field("skip", &self.skip)
            .field("connect_timeout", &self.connect_timeout)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

/// Shared, read-only state for every host unit of one run
struct HostUnit {
    connector: Arc<dyn Connector>,
    semaphore: Arc<Semaphore>,
    commands: Arc<[Command]>,
    connect_timeout: Duration,
    command_timeout: Option<Duration>,
}

impl Process {
    /// Create a runner with concurrency 1 and no filters
    pub fn new(connector: Arc<dyn Connector>, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            concurrency: 1,
            connector,
            resolver,
            only: Vec::new(),
            skip: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: None,
        }
    }

    /// Set concurrency, values below 1 are treated as 1
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_only(mut self, only: Vec<String>) -> Self {
        self.only = only;
        self
    }

    #[must_use]
    pub fn with_skip(mut self, skip: Vec<String>) -> Self {
        self.skip = skip;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Run `task_name` on every host of `target_name`
    ///
    /// Host failures are reported in the returned `RunResult`, never as an
    /// error.
    ///
    /// # Errors
    /// Returns `RunnerError` if the task or target can't be resolved, or
    /// `RunnerError::Canceled` if cancellation arrived before any host
    /// completed.
    #[instrument(skip(self, cancel), fields(task = %task_name, target = %target_name))]
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        task_name: &str,
        target_name: &str,
    ) -> Result<RunResult, RunnerError> {
        let task = self.resolver.task(task_name)?;
        let hosts = self.resolver.target_hosts(target_name).await?;

        let filter = CommandFilter::new(self.only.as_slice(), self.skip.as_slice());
        for name in filter.unmatched(&task.commands) {
            warn!(command = %name, "filter names a command the task doesn't have");
        }
        let commands: Arc<[Command]> = filter.apply(&task.commands).into();
        if commands.is_empty() {
            warn!("no commands left to run after filtering");
        }

        let concurrency = self.concurrency.max(1);
        info!(
            hosts = hosts.len(),
            commands = commands.len(),
            concurrency,
            "starting run"
        );

        let unit = Arc::new(HostUnit {
            connector: self.connector.clone(),
            semaphore: Arc::new(Semaphore::new(concurrency)),
            commands,
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
        });

        let mut handles = Vec::with_capacity(hosts.len());
        for host in hosts {
            let unit = unit.clone();
            let cancel = cancel.clone();
            let handle = tokio::spawn({
                let host = host.clone();
                async move { unit.run(host, cancel).await }
            });
            handles.push((host, handle));
        }

        // one slot per host, filled by that host's task
        let mut results = Vec::with_capacity(handles.len());
        for (host, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(host = %host, error = %e, "host task panicked");
                    HostResult {
                        status: HostStatus::Failed,
                        error: Some(format!("host task panicked: {e}")),
                        finished_at: Some(Utc::now()),
                        ..HostResult::not_run(host, &unit.commands)
                    }
                }
            };
            results.push(result);
        }

        let canceled = results
            .iter()
            .any(|r| matches!(r.status, HostStatus::Canceled | HostStatus::NotRun));

        if canceled && !results.iter().any(|r| r.status.is_completed()) {
            warn!("run canceled before any host completed");
            return Err(RunnerError::Canceled);
        }

        let result = RunResult {
            task: task.name,
            target: target_name.to_string(),
            hosts: results,
            canceled,
        };

        info!(
            succeeded = result.succeeded(),
            failed = result.failed(),
            interrupted = result.interrupted(),
            "run finished"
        );

        Ok(result)
    }
}

impl HostUnit {
    /// Full lifecycle of one host: slot, connect, commands, close
    #[instrument(skip(self, host, cancel), fields(host = %host))]
    async fn run(&self, host: Host, cancel: CancellationToken) -> HostResult {
        let mut result = HostResult::not_run(host, &self.commands);

        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("canceled while waiting for a slot");
                return result;
            }
            permit = self.semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    result.status = HostStatus::Failed;
                    result.error = Some(e.to_string());
                    return result;
                }
            },
        };

        result.started_at = Some(Utc::now());

        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            res = self.connector.connect(&result.host, self.connect_timeout) => Some(res),
        };

        let mut session = match connected {
            Some(Ok(session)) => session,
            Some(Err(e)) => {
                error!(error = %e, "connect failed");
                result.status = HostStatus::Failed;
                result.error = Some(e.to_string());
                result.finished_at = Some(Utc::now());
                return result;
            }
            None => {
                info!("canceled while connecting");
                result.status = HostStatus::Canceled;
                result.error = Some("canceled before connect completed".to_string());
                result.finished_at = Some(Utc::now());
                return result;
            }
        };

        let mut outcomes = Vec::with_capacity(self.commands.len());
        let sequence = AssertUnwindSafe(self.run_commands(
            session.as_mut(),
            &result.host,
            &cancel,
            &mut outcomes,
        ))
        .catch_unwind()
        .await;

        // released on every path, including a panic inside the sequence
        session.close().await;
        drop(permit);

        match sequence {
            Ok(status) => {
                result.status = status;
                result.error = outcomes.iter().find_map(|o| o.error.clone());
            }
            Err(_) => {
                error!("command sequence panicked");
                let done = outcomes.len();
                let mut rest = self.commands[done..].iter();
                if let Some(command) = rest.next() {
                    outcomes.push(CommandOutcome {
                        error: Some(format!("{} panicked", command.label())),
                        ..CommandOutcome::new(command, CommandStatus::Failed)
                    });
                }
                outcomes.extend(rest.map(CommandOutcome::skipped));
                result.status = HostStatus::Failed;
                result.error = Some("command sequence panicked".to_string());
            }
        }
        result.commands = outcomes;
        result.finished_at = Some(Utc::now());

        info!(status = %result.status, "host finished");
        result
    }

    /// Run commands in order, stopping at the first failure or cancellation
    ///
    /// Outcomes are pushed as each command finishes, so they survive a panic
    /// further down the sequence.
    async fn run_commands(
        &self,
        session: &mut dyn Session,
        host: &Host,
        cancel: &CancellationToken,
        outcomes: &mut Vec<CommandOutcome>,
    ) -> HostStatus {
        let mut status = HostStatus::Succeeded;

        for command in self.commands.iter() {
            if status != HostStatus::Succeeded {
                outcomes.push(CommandOutcome::skipped(command));
                continue;
            }

            if cancel.is_cancelled() {
                info!(command = %command.label(), "canceled before command");
                outcomes.push(CommandOutcome {
                    error: Some("canceled".to_string()),
                    ..CommandOutcome::skipped(command)
                });
                status = HostStatus::Canceled;
                continue;
            }

            debug!(command = %command.label(), "running command");
            let outcome = match session
                .run(&command.script, self.command_timeout, cancel)
                .await
            {
                Ok(res) => {
                    for line in res.combined_output().lines() {
                        info!(host = %host.address, "{line}");
                    }
                    let (status, error) = if res.success() {
                        (CommandStatus::Ok, None)
                    } else {
                        let msg = format!("{} exited with status {}", command.label(), res.status);
                        (CommandStatus::Failed, Some(msg))
                    };
                    CommandOutcome {
                        exit_status: Some(res.status),
                        output: res.combined_output(),
                        duration: res.duration,
                        error,
                        ..CommandOutcome::new(command, status)
                    }
                }
                Err(ExecError::Canceled) => CommandOutcome {
                    error: Some(format!("{} canceled", command.label())),
                    ..CommandOutcome::new(command, CommandStatus::Canceled)
                },
                Err(e) => CommandOutcome {
                    error: Some(format!("{}: {e}", command.label())),
                    ..CommandOutcome::new(command, CommandStatus::Failed)
                },
            };

            match outcome.status {
                CommandStatus::Failed => {
                    warn!(
                        command = %command.label(),
                        error = ?outcome.error,
                        "command failed, stopping host"
                    );
                    status = HostStatus::Failed;
                }
                CommandStatus::Canceled => status = HostStatus::Canceled,
                _ => {}
            }
            outcomes.push(outcome);
        }

        status
    }
}
