use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use fleetrun_core::*;
use fleetrun_exec::{CommandResult, ConnectError, Connector, ExecError, Host, Session};
use fleetrun_playbook::{Command, PlayBook, PlaybookError, Task};

// Mock implementations

#[derive(Default)]
struct Stats {
    connects: AtomicUsize,
    close_calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    /// (host, script) in execution order
    log: Mutex<Vec<(String, String)>>,
}

impl Stats {
    fn executed_on(&self, host: &str) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, cmd)| cmd.clone())
            .collect()
    }

    fn executions(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

#[derive(Default)]
struct Behavior {
    fail_connect: HashMap<String, ConnectError>,
    /// (host, script) pairs that exit with status 1
    fail_commands: HashSet<(String, String)>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    /// Cancel the token once this many of this connector's sessions closed
    cancel_after_closes: Option<(usize, CancellationToken)>,
    closes: AtomicUsize,
}

#[derive(Clone)]
struct MockConnector {
    behavior: Arc<Behavior>,
    stats: Arc<Stats>,
}

impl MockConnector {
    fn new(behavior: Behavior) -> Self {
        Self::with_stats(behavior, Arc::new(Stats::default()))
    }

    fn with_stats(behavior: Behavior, stats: Arc<Stats>) -> Self {
        Self {
            behavior: Arc::new(behavior),
            stats,
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        host: &Host,
        _timeout: Duration,
    ) -> Result<Box<dyn Session>, ConnectError> {
        if let Some(err) = self.behavior.fail_connect.get(&host.address) {
            return Err(err.clone());
        }

        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_active.fetch_max(active, Ordering::SeqCst);

        Ok(Box::new(MockSession {
            host: host.address.clone(),
            behavior: self.behavior.clone(),
            stats: self.stats.clone(),
            closed: false,
        }))
    }

    fn connector_type(&self) -> &'static str {
        "mock"
    }
}

struct MockSession {
    host: String,
    behavior: Arc<Behavior>,
    stats: Arc<Stats>,
    closed: bool,
}

#[async_trait]
impl Session for MockSession {
    async fn run(
        &mut self,
        cmd: &str,
        _timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<CommandResult, ExecError> {
        assert!(!self.closed, "run on a closed session");
        if cmd == "panic" {
            panic!("mock session panic");
        }

        self.stats
            .log
            .lock()
            .unwrap()
            .push((self.host.clone(), cmd.to_string()));

        let delay = self
            .behavior
            .delays
            .get(&self.host)
            .copied()
            .unwrap_or(self.behavior.default_delay);

        tokio::select! {
            () = cancel.cancelled() => return Err(ExecError::Canceled),
            () = tokio::time::sleep(delay) => {}
        }

        let failed = self
            .behavior
            .fail_commands
            .contains(&(self.host.clone(), cmd.to_string()));

        Ok(CommandResult {
            status: i32::from(failed),
            stdout: format!("{cmd} on {}", self.host),
            stderr: String::new(),
            duration: delay,
        })
    }

    async fn close(&mut self) {
        self.stats.close_calls.fetch_add(1, Ordering::SeqCst);
        let calls = self.behavior.closes.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.closed {
            self.closed = true;
            self.stats.active.fetch_sub(1, Ordering::SeqCst);
        }
        if let Some((after, token)) = &self.behavior.cancel_after_closes
            && calls == *after
        {
            token.cancel();
        }
    }
}

struct MockResolver {
    tasks: Vec<Task>,
    targets: HashMap<String, Vec<Host>>,
}

#[async_trait]
impl Resolver for MockResolver {
    fn task(&self, name: &str) -> Result<Task, PlaybookError> {
        self.tasks
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| PlaybookError::UnknownTask(name.to_string()))
    }

    async fn target_hosts(&self, name: &str) -> Result<Vec<Host>, PlaybookError> {
        self.targets
            .get(name)
            .cloned()
            .ok_or_else(|| PlaybookError::UnknownTarget(name.to_string()))
    }
}

fn task(name: &str, commands: Vec<Command>) -> Task {
    Task {
        name: name.to_string(),
        user: None,
        ssh_key: None,
        commands,
    }
}

fn abcd() -> Vec<Command> {
    vec![
        Command::named("a", "echo a"),
        Command::named("b", "echo b"),
        Command::named("c", "echo c"),
        Command::named("d", "echo d"),
    ]
}

fn hosts(n: usize) -> Vec<Host> {
    (1..=n).map(|i| Host::new(format!("h{i}"))).collect()
}

fn resolver(commands: Vec<Command>, hosts: Vec<Host>) -> Arc<MockResolver> {
    Arc::new(MockResolver {
        tasks: vec![task("deploy", commands)],
        targets: HashMap::from([("prod".to_string(), hosts)]),
    })
}

fn scripts(commands: &[Command]) -> Vec<String> {
    commands.iter().map(|c| c.script.clone()).collect()
}

#[tokio::test]
async fn test_runs_every_command_on_every_host() {
    let connector = MockConnector::new(Behavior {
        default_delay: Duration::from_millis(5),
        ..Behavior::default()
    });
    let stats = connector.stats.clone();

    let process = Process::new(Arc::new(connector), resolver(abcd(), hosts(4))).with_concurrency(2);
    let result = process
        .run(&CancellationToken::new(), "deploy", "prod")
        .await
        .unwrap();

    assert!(result.is_success());
    assert!(!result.canceled);
    assert_eq!(result.succeeded(), 4);
    assert_eq!(stats.executions(), 4 * 4);

    // results follow resolved host order, commands follow declared order
    for (i, host_result) in result.hosts.iter().enumerate() {
        let address = format!("h{}", i + 1);
        assert_eq!(host_result.host.address, address);
        assert_eq!(host_result.commands.len(), 4);
        assert!(
            host_result
                .commands
                .iter()
                .all(|c| c.status == CommandStatus::Ok)
        );
        assert_eq!(stats.executed_on(&address), scripts(&abcd()));
        assert!(host_result.started_at.is_some());
        assert!(host_result.finished_at.is_some());
    }
    assert_eq!(
        result.hosts[0].commands[0].output,
        "echo a on h1",
        "combined output is captured"
    );
}

#[tokio::test]
async fn test_only_and_skip_filters() {
    let mut commands = abcd();
    commands.push(Command::new("uptime"));

    let connector = MockConnector::new(Behavior::default());
    let stats = connector.stats.clone();

    let process = Process::new(Arc::new(connector), resolver(commands.clone(), hosts(2)))
        .with_only(vec!["a".to_string(), "c".to_string()])
        .with_skip(vec!["c".to_string()]);
    let result = process
        .run(&CancellationToken::new(), "deploy", "prod")
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(stats.executed_on("h1"), vec!["echo a"]);
    assert_eq!(stats.executed_on("h2"), vec!["echo a"]);

    // unnamed commands run when only Skip is set
    let connector = MockConnector::new(Behavior::default());
    let stats = connector.stats.clone();
    let process = Process::new(Arc::new(connector), resolver(commands, hosts(1)))
        .with_skip(vec!["b".to_string(), "d".to_string()]);
    process
        .run(&CancellationToken::new(), "deploy", "prod")
        .await
        .unwrap();

    assert_eq!(stats.executed_on("h1"), vec!["echo a", "echo c", "uptime"]);
}

#[tokio::test]
async fn test_concurrency_bound() {
    let host_count = 6;

    for concurrency in [0, 1, 2, host_count, host_count + 5] {
        let connector = MockConnector::new(Behavior {
            default_delay: Duration::from_millis(10),
            ..Behavior::default()
        });
        let stats = connector.stats.clone();

        let process = Process::new(Arc::new(connector), resolver(abcd(), hosts(host_count)))
            .with_concurrency(concurrency);
        let result = process
            .run(&CancellationToken::new(), "deploy", "prod")
            .await
            .unwrap();

        assert_eq!(result.succeeded(), host_count);
        let max_active = stats.max_active.load(Ordering::SeqCst);
        assert!(
            max_active <= concurrency.max(1),
            "concurrency {concurrency}: {max_active} sessions open at once"
        );
        assert!(max_active >= 1);
        assert_eq!(stats.active.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn test_connect_failure_is_isolated() {
    let connector = MockConnector::new(Behavior {
        fail_connect: HashMap::from([(
            "h1".to_string(),
            ConnectError::KeyUnreadable("bad key".to_string()),
        )]),
        ..Behavior::default()
    });
    let stats = connector.stats.clone();

    let process = Process::new(Arc::new(connector), resolver(abcd(), hosts(2))).with_concurrency(2);
    let result = process
        .run(&CancellationToken::new(), "deploy", "prod")
        .await
        .unwrap();

    let h1 = result.host("h1").unwrap();
    assert_eq!(h1.status, HostStatus::Failed);
    assert!(h1.error.as_deref().unwrap().contains("bad key"));
    assert_eq!(h1.attempted().count(), 0);

    let h2 = result.host("h2").unwrap();
    assert_eq!(h2.status, HostStatus::Succeeded);

    assert!(!result.is_success());
    assert_eq!(result.to_string(), "1 of 2 hosts succeeded, 1 failed");
    assert_eq!(stats.executed_on("h2").len(), 4);
}

#[tokio::test]
async fn test_command_failure_stops_only_that_host() {
    let connector = MockConnector::new(Behavior {
        fail_commands: HashSet::from([("h2".to_string(), "echo b".to_string())]),
        ..Behavior::default()
    });
    let stats = connector.stats.clone();

    let process = Process::new(Arc::new(connector), resolver(abcd(), hosts(3))).with_concurrency(3);
    let result = process
        .run(&CancellationToken::new(), "deploy", "prod")
        .await
        .unwrap();

    let h2 = result.host("h2").unwrap();
    assert_eq!(h2.status, HostStatus::Failed);
    let statuses: Vec<_> = h2.commands.iter().map(|c| c.status).collect();
    assert_eq!(
        statuses,
        vec![
            CommandStatus::Ok,
            CommandStatus::Failed,
            CommandStatus::Skipped,
            CommandStatus::Skipped
        ]
    );
    assert_eq!(h2.commands[1].exit_status, Some(1));
    assert!(h2.error.as_deref().unwrap().contains("exited with status 1"));
    assert_eq!(stats.executed_on("h2"), vec!["echo a", "echo b"]);

    assert_eq!(result.succeeded(), 2);
    assert_eq!(stats.executions(), 4 + 2 + 4);
    assert_eq!(
        stats.connects.load(Ordering::SeqCst),
        stats.close_calls.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn test_cancel_after_first_host() {
    let cancel = CancellationToken::new();
    let connector = MockConnector::new(Behavior {
        cancel_after_closes: Some((1, cancel.clone())),
        ..Behavior::default()
    });
    let stats = connector.stats.clone();

    let process = Process::new(Arc::new(connector), resolver(abcd(), hosts(5))).with_concurrency(1);
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        process.run(&cancel, "deploy", "prod"),
    )
    .await
    .expect("run must not hang after cancellation")
    .unwrap();

    assert_eq!(result.succeeded(), 1);
    assert_eq!(result.interrupted(), 4);
    assert!(result.canceled);
    assert!(!result.is_success());
    assert_eq!(result.hosts[0].status, HostStatus::Succeeded);
    assert!(
        result.hosts[1..]
            .iter()
            .all(|h| matches!(h.status, HostStatus::NotRun | HostStatus::Canceled))
    );
    assert_eq!(
        stats.connects.load(Ordering::SeqCst),
        stats.close_calls.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn test_cancel_interrupts_in_flight_command() {
    let cancel = CancellationToken::new();
    let connector = MockConnector::new(Behavior {
        delays: HashMap::from([
            ("fast".to_string(), Duration::from_millis(20)),
            ("slow".to_string(), Duration::from_secs(30)),
        ]),
        cancel_after_closes: Some((1, cancel.clone())),
        ..Behavior::default()
    });
    let stats = connector.stats.clone();

    let process = Process::new(
        Arc::new(connector),
        resolver(
            vec![Command::named("only", "sleep")],
            vec![Host::new("fast"), Host::new("slow")],
        ),
    )
    .with_concurrency(2);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        process.run(&cancel, "deploy", "prod"),
    )
    .await
    .expect("in-flight command must return promptly")
    .unwrap();

    assert_eq!(result.host("fast").unwrap().status, HostStatus::Succeeded);

    let slow = result.host("slow").unwrap();
    assert_eq!(slow.status, HostStatus::Canceled);
    assert_eq!(slow.commands[0].status, CommandStatus::Canceled);
    assert!(result.canceled);
    assert_eq!(stats.close_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancel_before_any_host_completes() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    // a second trigger is harmless
    cancel.cancel();

    let connector = MockConnector::new(Behavior::default());
    let stats = connector.stats.clone();

    let process = Process::new(Arc::new(connector), resolver(abcd(), hosts(3)));
    let err = process.run(&cancel, "deploy", "prod").await.unwrap_err();

    assert_eq!(err, RunnerError::Canceled);
    assert_eq!(stats.connects.load(Ordering::SeqCst), 0);
    assert_eq!(stats.executions(), 0);
}

#[tokio::test]
async fn test_session_closed_once_per_connect() {
    let stats = Arc::new(Stats::default());

    for i in 0..100 {
        let cancel = CancellationToken::new();
        let mut behavior = Behavior {
            fail_commands: HashSet::from([("h2".to_string(), "echo c".to_string())]),
            fail_connect: HashMap::from([(
                "h3".to_string(),
                ConnectError::Unreachable("no route".to_string()),
            )]),
            ..Behavior::default()
        };
        if i % 10 == 0 {
            behavior.cancel_after_closes = Some((1, cancel.clone()));
        }

        let connector = MockConnector::with_stats(behavior, stats.clone());
        let process =
            Process::new(Arc::new(connector), resolver(abcd(), hosts(4))).with_concurrency(2);

        // a run canceled before any host completes is an error, still no leak
        let _ = process.run(&cancel, "deploy", "prod").await;

        assert_eq!(
            stats.connects.load(Ordering::SeqCst),
            stats.close_calls.load(Ordering::SeqCst),
            "run {i}"
        );
        assert_eq!(stats.active.load(Ordering::SeqCst), 0, "run {i}");
    }
}

#[tokio::test]
async fn test_panic_in_command_still_closes_session() {
    let connector = MockConnector::new(Behavior::default());
    let stats = connector.stats.clone();

    let process = Process::new(
        Arc::new(connector),
        resolver(
            vec![
                Command::new("echo before"),
                Command::new("panic"),
                Command::new("echo after"),
            ],
            hosts(2),
        ),
    )
    .with_concurrency(2);
    let result = process
        .run(&CancellationToken::new(), "deploy", "prod")
        .await
        .unwrap();

    assert_eq!(result.failed(), 2);
    assert!(
        result.hosts[0]
            .error
            .as_deref()
            .unwrap()
            .contains("panicked")
    );

    // work done before the panic is still reported
    for host in &result.hosts {
        let statuses: Vec<_> = host.commands.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![
                CommandStatus::Ok,
                CommandStatus::Failed,
                CommandStatus::Skipped
            ],
            "{}",
            host.host
        );
        assert_eq!(host.commands[0].exit_status, Some(0));
    }
    assert_eq!(stats.executions(), 2);
    assert_eq!(stats.close_calls.load(Ordering::SeqCst), 2);
    assert_eq!(stats.active.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_task_and_target() {
    let connector = MockConnector::new(Behavior::default());
    let stats = connector.stats.clone();
    let process = Process::new(Arc::new(connector), resolver(abcd(), hosts(1)));
    let cancel = CancellationToken::new();

    assert_eq!(
        process.run(&cancel, "nope", "prod").await.unwrap_err(),
        RunnerError::UnknownTask("nope".to_string())
    );
    assert_eq!(
        process.run(&cancel, "deploy", "nowhere").await.unwrap_err(),
        RunnerError::UnknownTarget("nowhere".to_string())
    );
    assert_eq!(stats.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_playbook_as_resolver() {
    let playbook = PlayBook::from_toml_str(
        r#"
user = "deploy"

[targets.prod]
hosts = ["web1", "web2", "web1"]

[[tasks]]
name = "restart"
commands = [
  { name = "stop", script = "systemctl stop app" },
  { name = "start", script = "systemctl start app" },
]
"#,
    )
    .unwrap();

    let connector = MockConnector::new(Behavior::default());
    let stats = connector.stats.clone();

    let process = Process::new(Arc::new(connector), Arc::new(playbook))
        .with_concurrency(4)
        .with_skip(vec!["stop".to_string()]);
    let result = process
        .run(&CancellationToken::new(), "restart", "prod")
        .await
        .unwrap();

    assert_eq!(result.task, "restart");
    assert_eq!(result.target, "prod");
    assert_eq!(result.hosts.len(), 2, "duplicate hosts are removed");
    assert!(result.is_success());
    assert_eq!(stats.executed_on("web1"), vec!["systemctl start app"]);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["hosts"][0]["status"], "succeeded");
    assert_eq!(json["hosts"][0]["commands"][0]["status"], "ok");
}
