//! Run summary output

use std::fmt::Write as _;

use fleetrun_core::{HostStatus, RunResult};

/// Human-readable per-host lines followed by the totals
pub fn render(result: &RunResult) -> String {
    let mut out = String::new();

    for host in &result.hosts {
        let _ = write!(out, "{}: {}", host.host, host.status);
        if let Some(err) = &host.error
            && host.status != HostStatus::Succeeded
        {
            let _ = write!(out, " ({err})");
        }
        out.push('\n');
    }

    let _ = writeln!(out, "{result}");
    out
}

/// Print the result to stdout, as JSON or text
///
/// # Errors
/// Returns an error if JSON serialization fails.
pub fn print(result: &RunResult, json: bool) -> eyre::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        print!("{}", render(result));
    }
    Ok(())
}
