//! SSH private key location and validation

use std::path::{Path, PathBuf};

use tracing::debug;

/// Default key used when no layer names one
pub const DEFAULT_KEY_PATH: &str = "~/.ssh/id_rsa";

/// Key resolution errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key path is empty")]
    Empty,

    #[error("can't expand key path {path}: {reason}")]
    Expand { path: String, reason: String },

    #[error("key file not found: {0}")]
    NotFound(String),

    #[error("key file permissions too open: {0} (should be 600)")]
    BadPermissions(String),

    #[error("key file {path} is not readable: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Expand `~` and environment variables in a key path
///
/// # Errors
/// Returns `KeyError::Expand` when the path names an unset variable or the
/// home directory can't be determined.
pub fn expand_key_path(raw: &str) -> Result<PathBuf, KeyError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(KeyError::Empty);
    }

    let expanded = shellexpand::full(raw).map_err(|e| KeyError::Expand {
        path: raw.to_string(),
        reason: e.to_string(),
    })?;

    Ok(PathBuf::from(expanded.as_ref()))
}

/// Expand a key path and make sure the file can be opened for reading
///
/// # Errors
/// Returns `KeyError` if the path can't be expanded, doesn't exist, is
/// group/world accessible, or can't be opened.
pub fn resolve_key_path(raw: &str) -> Result<PathBuf, KeyError> {
    let path = expand_key_path(raw)?;

    if !path.exists() {
        return Err(KeyError::NotFound(path.display().to_string()));
    }

    validate_key_permissions(&path)?;

    std::fs::File::open(&path).map_err(|source| KeyError::Unreadable {
        path: path.display().to_string(),
        source,
    })?;

    debug!(path = %path.display(), "resolved SSH key");
    Ok(path)
}

#[cfg(unix)]
fn validate_key_permissions(path: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path).map_err(|source| KeyError::Unreadable {
        path: path.display().to_string(),
        source,
    })?;

    // group and other bits must be clear
    if metadata.permissions().mode() & 0o77 != 0 {
        return Err(KeyError::BadPermissions(path.display().to_string()));
    }

    Ok(())
}

#[cfg(not(unix))]
fn validate_key_permissions(_path: &Path) -> Result<(), KeyError> {
    Ok(())
}
