//! Per-command, per-host and per-run outcome types

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use fleetrun_exec::Host;
use fleetrun_playbook::Command;

/// Status of one command on one host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Ok,
    /// Not attempted because an earlier command failed or the run was canceled
    Skipped,
    Failed,
    Canceled,
}

/// Result of running one command on one host
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub script: String,
    pub status: CommandStatus,
    /// Remote exit status, when the command ran to completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
    /// Combined stdout and stderr
    pub output: String,
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandOutcome {
    pub(crate) fn new(command: &Command, status: CommandStatus) -> Self {
        Self {
            name: command.name.clone(),
            script: command.script.clone(),
            status,
            exit_status: None,
            output: String::new(),
            duration: Duration::ZERO,
            error: None,
        }
    }

    pub(crate) fn skipped(command: &Command) -> Self {
        Self::new(command, CommandStatus::Skipped)
    }
}

/// Overall status of one host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Succeeded,
    Failed,
    /// Started, then interrupted by cancellation
    Canceled,
    /// Never started because cancellation arrived first
    NotRun,
}

impl HostStatus {
    /// Host ran its sequence to an end, successful or not
    #[must_use]
    pub fn is_completed(self) -> bool {
        matches!(self, HostStatus::Succeeded | HostStatus::Failed)
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostStatus::Succeeded => "succeeded",
            HostStatus::Failed => "failed",
            HostStatus::Canceled => "canceled",
            HostStatus::NotRun => "not run",
        };
        f.write_str(s)
    }
}

/// All command outcomes for one host
#[derive(Debug, Clone, Serialize)]
pub struct HostResult {
    pub host: Host,
    pub status: HostStatus,
    pub commands: Vec<CommandOutcome>,
    /// Host-level failure detail (connect error, panic, cancellation)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl HostResult {
    /// A host that never started; every command is recorded as skipped
    #[must_use]
    pub fn not_run(host: Host, commands: &[Command]) -> Self {
        Self {
            host,
            status: HostStatus::NotRun,
            commands: commands.iter().map(CommandOutcome::skipped).collect(),
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Whether the host succeeded
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == HostStatus::Succeeded
    }

    /// Outcomes of commands that were actually attempted
    pub fn attempted(&self) -> impl Iterator<Item = &CommandOutcome> {
        self.commands
            .iter()
            .filter(|c| c.status != CommandStatus::Skipped)
    }
}

/// Aggregate result of one task-against-target invocation
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub task: String,
    pub target: String,
    /// One entry per resolved host, in resolved host order
    pub hosts: Vec<HostResult>,
    /// Cancellation interrupted at least one host
    pub canceled: bool,
}

impl RunResult {
    fn count(&self, status: HostStatus) -> usize {
        self.hosts.iter().filter(|h| h.status == status).count()
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(HostStatus::Succeeded)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(HostStatus::Failed)
    }

    /// Hosts that were canceled or never started
    #[must_use]
    pub fn interrupted(&self) -> usize {
        self.count(HostStatus::Canceled) + self.count(HostStatus::NotRun)
    }

    /// Every host succeeded and nothing was canceled
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.canceled && self.hosts.iter().all(HostResult::success)
    }

    /// Look up the result for a host address
    #[must_use]
    pub fn host(&self, address: &str) -> Option<&HostResult> {
        self.hosts.iter().find(|h| h.host.address == address)
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} hosts succeeded",
            self.succeeded(),
            self.hosts.len()
        )?;
        if self.failed() > 0 {
            write!(f, ", {} failed", self.failed())?;
        }
        if self.interrupted() > 0 {
            write!(f, ", {} canceled or not run", self.interrupted())?;
        }
        Ok(())
    }
}
