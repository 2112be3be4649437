//! fleetrun-playbook: Playbook loading and target resolution
//!
//! Parses TOML/YAML playbooks and resolves targets to host lists from
//! explicit hosts, inventory files or inventory HTTP endpoints.

pub mod error;
pub mod inventory;
pub mod model;

pub use error::{InventoryError, PlaybookError};
pub use model::{Command, HostSource, Overrides, PlayBook, Target, Task};
