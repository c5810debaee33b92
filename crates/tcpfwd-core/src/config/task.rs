//! Task and port mapping definitions.
//!
//! JSON format (array of tasks):
//!
//! ```json
//! [
//!   { "title": "fedora", "host": "192.168.100.128",
//!     "ports": [ { "from": 5510, "to": 5510 } ] }
//! ]
//! ```
//!
//! `name` is accepted in place of `title`, and the capitalised `Host`,
//! `Ports`, `From`, `To` keys of older files are accepted as well.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single listen-port to target-port pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    /// Local port the forwarder listens on.
    #[serde(alias = "From")]
    pub from: u16,
    /// Port dialed on the task's host.
    #[serde(alias = "To")]
    pub to: u16,
}

impl PortMapping {
    pub fn new(from: u16, to: u16) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

/// A named set of port mappings towards one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Registry key.
    #[serde(rename = "title", alias = "name", default)]
    pub name: String,
    /// Target host name or literal address.
    #[serde(alias = "Host")]
    pub host: String,
    /// Port mappings, in bind order.
    #[serde(alias = "Ports", default)]
    pub ports: Vec<PortMapping>,
}

impl TaskConfig {
    /// Create a task config.
    pub fn new(name: impl Into<String>, host: impl Into<String>, ports: Vec<PortMapping>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            ports,
        }
    }

    /// Check the config before it is started.
    ///
    /// Requires a non-empty name and host, at least one mapping, no port 0 and
    /// distinct listen ports. Whether `host` resolves is only known when a
    /// connection is dialed.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_config("task name must not be empty"));
        }
        if self.host.trim().is_empty() {
            return Err(Error::invalid_config(format!(
                "task {}: host must not be empty",
                self.name
            )));
        }
        if self.ports.is_empty() {
            return Err(Error::invalid_config(format!(
                "task {}: at least one port mapping is required",
                self.name
            )));
        }

        let mut seen = HashSet::with_capacity(self.ports.len());
        for mapping in &self.ports {
            if mapping.from == 0 || mapping.to == 0 {
                return Err(Error::invalid_config(format!(
                    "task {}: port 0 is not allowed ({})",
                    self.name, mapping
                )));
            }
            if !seen.insert(mapping.from) {
                return Err(Error::invalid_config(format!(
                    "task {}: listen port {} is mapped more than once",
                    self.name, mapping.from
                )));
            }
        }
        Ok(())
    }

    /// Display form of the dial target for one mapping.
    pub fn target(&self, mapping: &PortMapping) -> String {
        host_port(&self.host, mapping.to)
    }

    /// Parse a JSON array of tasks.
    pub fn list_from_json(json: &str) -> Result<Vec<TaskConfig>> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize tasks as a pretty-printed JSON array.
    pub fn list_to_json(tasks: &[TaskConfig]) -> Result<String> {
        Ok(serde_json::to_string_pretty(tasks)?)
    }
}

/// Format `host:port`, bracketing bare IPv6 literals.
pub(crate) fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
