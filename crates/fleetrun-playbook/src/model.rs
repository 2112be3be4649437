//! Playbook, task and target types

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use fleetrun_exec::Host;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::PlaybookError;
use crate::inventory;

/// A single shell command within a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Optional name used by skip/only filters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Shell line executed on the remote host
    pub script: String,
}

impl Command {
    /// Create an unnamed command
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            name: None,
            script: script.into(),
        }
    }

    /// Create a named command
    pub fn named(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            script: script.into(),
        }
    }

    /// Name if present, otherwise the script, for log lines
    #[must_use]
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.script)
    }
}

/// A named, ordered list of commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    /// User override for this task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// SSH key override for this task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,
    #[serde(default)]
    pub commands: Vec<Command>,
}

/// A named host set as declared in the playbook
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Explicit hosts, `[user@]address[:port]`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    /// Path to an inventory file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_file: Option<String>,
    /// URL of an inventory endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_url: Option<String>,
}

impl Target {
    /// The single active source, by precedence hosts > file > url
    #[must_use]
    pub fn source(&self) -> Option<HostSource> {
        if !self.hosts.is_empty() {
            Some(HostSource::Hosts(self.hosts.clone()))
        } else if let Some(file) = &self.inventory_file {
            Some(HostSource::File(file.clone()))
        } else {
            self.inventory_url.clone().map(HostSource::Http)
        }
    }
}

/// Target overrides supplied on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub hosts: Vec<String>,
    pub inventory_file: Option<String>,
    pub inventory_http: Option<String>,
}

impl Overrides {
    /// The single active override, by precedence hosts > file > http
    #[must_use]
    pub fn source(&self) -> Option<HostSource> {
        Target {
            hosts: self.hosts.clone(),
            inventory_file: self.inventory_file.clone(),
            inventory_url: self.inventory_http.clone(),
        }
        .source()
    }
}

/// Where a target's hosts come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSource {
    Hosts(Vec<String>),
    File(String),
    Http(String),
}

impl HostSource {
    /// Load hosts from this source, deduplicated, in source order
    ///
    /// # Errors
    /// Returns `InventoryError` if the source can't be read or parsed.
    pub async fn load(&self) -> Result<Vec<Host>, crate::error::InventoryError> {
        let hosts = match self {
            HostSource::Hosts(entries) => inventory::parse_hosts(entries, "hosts")?,
            HostSource::File(path) => inventory::load_file(path).await?,
            HostSource::Http(url) => inventory::fetch_http(url).await?,
        };
        Ok(inventory::dedup_hosts(hosts))
    }
}

/// The full declarative document: global defaults, targets and tasks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayBook {
    /// Default SSH user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Default SSH key path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,
    #[serde(default)]
    pub targets: BTreeMap<String, Target>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(skip)]
    overrides: Overrides,
}

impl PlayBook {
    /// Load a playbook file, TOML unless the extension says YAML
    ///
    /// # Errors
    /// Returns `PlaybookError` if the file can't be read, parsed or validated.
    #[instrument(skip(overrides), fields(path = %path.display()))]
    pub async fn load(path: &Path, overrides: Overrides) -> Result<Self, PlaybookError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| PlaybookError::Read {
                path: path.display().to_string(),
                source,
            })?;

        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yml") || e.eq_ignore_ascii_case("yaml"));

        let playbook = if is_yaml {
            Self::from_yaml_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };

        info!(
            tasks = playbook.tasks.len(),
            targets = playbook.targets.len(),
            "loaded playbook"
        );

        Ok(playbook.with_overrides(overrides))
    }

    /// Parse and validate a TOML playbook
    ///
    /// # Errors
    /// Returns `PlaybookError::Parse` or `PlaybookError::Invalid`.
    pub fn from_toml_str(content: &str) -> Result<Self, PlaybookError> {
        let playbook: PlayBook =
            toml::from_str(content).map_err(|e| PlaybookError::Parse(e.to_string()))?;
        playbook.validate()?;
        Ok(playbook)
    }

    /// Parse and validate a YAML playbook
    ///
    /// # Errors
    /// Returns `PlaybookError::Parse` or `PlaybookError::Invalid`.
    pub fn from_yaml_str(content: &str) -> Result<Self, PlaybookError> {
        let playbook: PlayBook =
            serde_yaml::from_str(content).map_err(|e| PlaybookError::Parse(e.to_string()))?;
        playbook.validate()?;
        Ok(playbook)
    }

    /// Replace the target overrides
    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    fn validate(&self) -> Result<(), PlaybookError> {
        let mut names = HashSet::new();

        for task in &self.tasks {
            if task.name.trim().is_empty() {
                return Err(PlaybookError::Invalid("task with empty name".to_string()));
            }
            if !names.insert(task.name.as_str()) {
                return Err(PlaybookError::Invalid(format!(
                    "duplicate task {:?}",
                    task.name
                )));
            }
            if let Some(pos) = task.commands.iter().position(|c| c.script.trim().is_empty()) {
                return Err(PlaybookError::Invalid(format!(
                    "task {:?}: command #{} has an empty script",
                    task.name,
                    pos + 1
                )));
            }
        }

        for (name, target) in &self.targets {
            if target.source().is_none() {
                return Err(PlaybookError::Invalid(format!(
                    "target {name:?} has no hosts, inventory_file or inventory_url"
                )));
            }
        }

        Ok(())
    }

    /// Look up a task by name
    ///
    /// # Errors
    /// Returns `PlaybookError::UnknownTask` if there is no such task.
    pub fn task(&self, name: &str) -> Result<&Task, PlaybookError> {
        self.tasks
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| PlaybookError::UnknownTask(name.to_string()))
    }

    /// Source that would be used for `target`, after applying overrides
    ///
    /// # Errors
    /// Returns `PlaybookError::UnknownTarget` if there are no overrides and
    /// the playbook doesn't declare the target.
    pub fn target_source(&self, target: &str) -> Result<HostSource, PlaybookError> {
        if let Some(source) = self.overrides.source() {
            debug!(target = %target, source = ?source, "using target override");
            return Ok(source);
        }

        self.targets
            .get(target)
            .and_then(Target::source)
            .ok_or_else(|| PlaybookError::UnknownTarget(target.to_string()))
    }

    /// Resolve a target to its deduplicated host list
    ///
    /// # Errors
    /// Returns `PlaybookError::UnknownTarget` if the target is not declared or
    /// resolves to no hosts, `PlaybookError::Inventory` if its inventory
    /// can't be loaded.
    #[instrument(skip(self))]
    pub async fn target_hosts(&self, target: &str) -> Result<Vec<Host>, PlaybookError> {
        let source = self.target_source(target)?;

        let hosts = source
            .load()
            .await
            .map_err(|source| PlaybookError::Inventory {
                target: target.to_string(),
                source,
            })?;

        if hosts.is_empty() {
            return Err(PlaybookError::UnknownTarget(target.to_string()));
        }

        Ok(hosts)
    }
}
