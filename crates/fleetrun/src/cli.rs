//! Command-line options

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use fleetrun_core::ConnectionLayer;
use fleetrun_playbook::Overrides;

/// Environment variable naming the playbook when `--file` is not given
pub const PLAYBOOK_ENV: &str = "FLEETRUN_PLAYBOOK";

/// Playbook used when neither `--file` nor the environment names one
pub const DEFAULT_PLAYBOOK: &str = "fleetrun.toml";

/// Run playbook tasks on remote hosts over SSH
#[derive(Parser, Debug)]
#[command(name = "fleetrun", version, about, long_about = None)]
#[command(disable_help_flag = true)]
pub struct Args {
    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,

    /// Playbook file (TOML or YAML)
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,

    /// Task name
    #[arg(short = 'n', long = "name", default_value = "default")]
    pub task: String,

    /// Target name
    #[arg(short = 't', long = "target", default_value = "default")]
    pub target: String,

    /// Number of hosts to run on concurrently
    #[arg(short = 'c', long = "concurrent", default_value_t = 1)]
    pub concurrent: usize,

    /// Destination host, overrides the target (repeatable)
    #[arg(short = 'h', long = "host")]
    pub hosts: Vec<String>,

    /// Inventory file, overrides the target
    #[arg(short = 'i', long = "inventory")]
    pub inventory_file: Option<String>,

    /// Inventory HTTP endpoint, overrides the target
    #[arg(short = 'H', long = "inventory-http")]
    pub inventory_http: Option<String>,

    /// SSH user
    #[arg(short = 'u', long = "user")]
    pub user: Option<String>,

    /// SSH private key
    #[arg(short = 'k', long = "key")]
    pub key: Option<String>,

    /// Skip commands with this name (repeatable)
    #[arg(short = 's', long = "skip")]
    pub skip: Vec<String>,

    /// Run only commands with this name (repeatable)
    #[arg(short = 'o', long = "only")]
    pub only: Vec<String>,

    /// Seconds to wait for a host to connect and authenticate
    #[arg(long, default_value_t = 30)]
    pub connect_timeout: u64,

    /// Seconds a single command may run, 0 for no limit
    #[arg(long, default_value_t = 0)]
    pub command_timeout: u64,

    /// Print the run result as JSON
    #[arg(long)]
    pub json: bool,

    /// Debug logging
    #[arg(long)]
    pub dbg: bool,

    /// Debug logging with source locations
    #[arg(long)]
    pub dev: bool,
}

impl Args {
    /// Playbook path: `--file`, then `$FLEETRUN_PLAYBOOK`, then the default
    #[must_use]
    pub fn playbook_path(&self) -> PathBuf {
        self.file
            .clone()
            .or_else(|| std::env::var_os(PLAYBOOK_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PLAYBOOK))
    }

    /// Target overrides given on the command line
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        Overrides {
            hosts: self.hosts.clone(),
            inventory_file: self.inventory_file.clone(),
            inventory_http: self.inventory_http.clone(),
        }
    }

    /// User and key given on the command line
    #[must_use]
    pub fn connection_layer(&self) -> ConnectionLayer {
        ConnectionLayer::new(self.user.as_deref(), self.key.as_deref())
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout > 0).then(|| Duration::from_secs(self.command_timeout))
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["fleetrun"]).unwrap();

        assert_eq!(args.task, "default");
        assert_eq!(args.target, "default");
        assert_eq!(args.concurrent, 1);
        assert_eq!(args.connect_timeout(), Duration::from_secs(30));
        assert_eq!(args.command_timeout(), None);
        assert_eq!(args.overrides(), Overrides::default());
        assert_eq!(args.connection_layer(), ConnectionLayer::default());
    }

    #[test]
    fn test_full_flags() {
        let args = Args::try_parse_from([
            "fleetrun",
            "-f",
            "ops.yml",
            "-n",
            "deploy",
            "-t",
            "prod",
            "-c",
            "8",
            "-h",
            "web1",
            "--host",
            "web2:2222",
            "-i",
            "inventory",
            "-H",
            "http://inv/hosts",
            "-u",
            "admin",
            "-k",
            "~/.ssh/ops",
            "-s",
            "migrate",
            "-o",
            "pull",
            "-o",
            "restart",
            "--command-timeout",
            "60",
            "--json",
        ])
        .unwrap();

        assert_eq!(args.playbook_path(), PathBuf::from("ops.yml"));
        assert_eq!(args.task, "deploy");
        assert_eq!(args.target, "prod");
        assert_eq!(args.concurrent, 8);
        assert_eq!(
            args.overrides(),
            Overrides {
                hosts: vec!["web1".to_string(), "web2:2222".to_string()],
                inventory_file: Some("inventory".to_string()),
                inventory_http: Some("http://inv/hosts".to_string()),
            }
        );
        assert_eq!(
            args.connection_layer(),
            ConnectionLayer::new(Some("admin"), Some("~/.ssh/ops"))
        );
        assert_eq!(args.skip, vec!["migrate"]);
        assert_eq!(args.only, vec!["pull", "restart"]);
        assert_eq!(args.command_timeout(), Some(Duration::from_secs(60)));
        assert!(args.json);
    }
}
