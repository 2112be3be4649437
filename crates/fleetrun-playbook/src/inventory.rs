//! Inventory loading from files and HTTP endpoints
//!
//! Both sources use the same text format: one `[user@]address[:port]` per
//! line, blank lines and `#` comments ignored.

use std::collections::HashSet;
use std::time::Duration;

use fleetrun_exec::Host;
use tracing::{debug, info, instrument, warn};

use crate::error::InventoryError;

/// Timeout for inventory HTTP requests
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Parse inventory text into hosts, in order of appearance
///
/// `origin` names the source in error messages.
///
/// # Errors
/// Returns `InventoryError::InvalidHost` for the first malformed line.
pub fn parse_inventory(text: &str, origin: &str) -> Result<Vec<Host>, InventoryError> {
    let mut hosts = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let host = line
            .parse::<Host>()
            .map_err(|source| InventoryError::InvalidHost {
                origin: origin.to_string(),
                line: idx + 1,
                source,
            })?;
        hosts.push(host);
    }

    Ok(hosts)
}

/// Parse a list of host strings (explicit hosts from CLI or playbook)
///
/// # Errors
/// Returns `InventoryError::InvalidHost` for the first malformed entry.
pub fn parse_hosts(entries: &[String], origin: &str) -> Result<Vec<Host>, InventoryError> {
    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            entry
                .parse::<Host>()
                .map_err(|source| InventoryError::InvalidHost {
                    origin: origin.to_string(),
                    line: idx + 1,
                    source,
                })
        })
        .collect()
}

/// Drop repeated hosts (same address and port), keeping the first occurrence
#[must_use]
pub fn dedup_hosts(hosts: Vec<Host>) -> Vec<Host> {
    let mut seen = HashSet::new();
    let total = hosts.len();

    let unique: Vec<Host> = hosts
        .into_iter()
        .filter(|h| seen.insert(h.endpoint()))
        .collect();

    if unique.len() < total {
        debug!(
            removed = total - unique.len(),
            "removed duplicate hosts from inventory"
        );
    }

    unique
}

/// Load hosts from an inventory file
///
/// # Errors
/// Returns `InventoryError` if the path can't be expanded, the file can't be
/// read, or a line is not a valid host.
#[instrument]
pub async fn load_file(path: &str) -> Result<Vec<Host>, InventoryError> {
    let expanded = shellexpand::full(path).map_err(|e| InventoryError::Expand {
        path: path.to_string(),
        reason: e.to_string(),
    })?;

    let text = tokio::fs::read_to_string(expanded.as_ref())
        .await
        .map_err(|source| InventoryError::File {
            path: expanded.to_string(),
            source,
        })?;

    let hosts = parse_inventory(&text, &expanded)?;
    info!(count = hosts.len(), "loaded inventory file");
    Ok(hosts)
}

/// Fetch hosts from an inventory HTTP endpoint with a GET request
///
/// # Errors
/// Returns `InventoryError` if the request fails, the server answers with a
/// non-2xx status, or the body contains an invalid host.
#[instrument]
pub async fn fetch_http(url: &str) -> Result<Vec<Host>, InventoryError> {
    let http_err = |e: reqwest::Error| InventoryError::Http {
        url: url.to_string(),
        reason: e.to_string(),
    };

    let client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(http_err)?;

    let response = client.get(url).send().await.map_err(http_err)?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        warn!(status, "inventory endpoint returned error status");
        return Err(InventoryError::Status {
            url: url.to_string(),
            status,
        });
    }

    let body = response.text().await.map_err(http_err)?;
    let hosts = parse_inventory(&body, url)?;
    info!(count = hosts.len(), "fetched inventory");
    Ok(hosts)
}
