//! Only/Skip command filters

use std::collections::HashSet;

use fleetrun_playbook::Command;

/// Command-name allow-list and deny-list, applied identically to every host
///
/// Only is applied first: when non-empty, a command is kept only if it has a
/// name in the set, so unnamed commands are dropped. Skip then drops named
/// commands in its set. Order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandFilter {
    only: HashSet<String>,
    skip: HashSet<String>,
}

impl CommandFilter {
    pub fn new<S: AsRef<str>>(only: &[S], skip: &[S]) -> Self {
        Self {
            only: only.iter().map(|s| s.as_ref().to_string()).collect(),
            skip: skip.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    /// Whether this filter lets `command` through
    #[must_use]
    pub fn allows(&self, command: &Command) -> bool {
        let name = command.name.as_deref();

        if !self.only.is_empty() && !name.is_some_and(|n| self.only.contains(n)) {
            return false;
        }

        !name.is_some_and(|n| self.skip.contains(n))
    }

    /// Filtered commands, in declared order
    #[must_use]
    pub fn apply(&self, commands: &[Command]) -> Vec<Command> {
        commands
            .iter()
            .filter(|c| self.allows(c))
            .cloned()
            .collect()
    }

    /// Names in the filters that match no command, for warnings
    #[must_use]
    pub fn unmatched<'a>(&'a self, commands: &[Command]) -> Vec<&'a str> {
        let names: HashSet<&str> = commands.iter().filter_map(|c| c.name.as_deref()).collect();

        let mut unmatched: Vec<&str> = self
            .only
            .iter()
            .chain(self.skip.iter())
            .map(String::as_str)
            .filter(|n| !names.contains(n))
            .collect();
        unmatched.sort_unstable();
        unmatched.dedup();
        unmatched
    }
}
