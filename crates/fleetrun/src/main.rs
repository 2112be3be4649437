//! fleetrun
//!
//! Runs a playbook task on every host of a target over SSH

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use eyre::WrapErr;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fleetrun_core::{ConnectionLayer, Process, connection_spec, ssh_connector};
use fleetrun_playbook::PlayBook;

mod cli;
mod logging;
mod report;
mod signal;

use cli::Args;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let args = Args::parse();
    logging::init(args.dbg, args.dev);

    info!(version = env!("CARGO_PKG_VERSION"), "fleetrun");

    let cancel = CancellationToken::new();
    signal::spawn_handler(cancel.clone());

    let path = args.playbook_path();
    let playbook = PlayBook::load(&path, args.overrides())
        .await
        .wrap_err_with(|| format!("can't load playbook {}", path.display()))?;

    let task_layer = ConnectionLayer::from_task(playbook.task(&args.task)?);
    let spec = connection_spec(
        &args.connection_layer(),
        &task_layer,
        &ConnectionLayer::from_playbook(&playbook),
    );
    info!(user = %spec.user, key = %spec.key_path.display(), "ssh identity");

    let connector = ssh_connector(&spec)?;
    let process = Process::new(connector, Arc::new(playbook))
        .with_concurrency(args.concurrent)
        .with_only(args.only.clone())
        .with_skip(args.skip.clone())
        .with_connect_timeout(args.connect_timeout())
        .with_command_timeout(args.command_timeout());

    let result = process
        .run(&cancel, &args.task, &args.target)
        .await
        .wrap_err_with(|| format!("task {} on target {}", args.task, args.target))?;

    report::print(&result, args.json)?;

    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
