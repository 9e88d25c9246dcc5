//! Runtime Configuration

use serde::{Deserialize, Serialize};

use crate::error::ReactiveError;

/// Settings of one [`Runtime`](crate::Runtime).
///
/// Missing fields fall back to their defaults, so a partial JSON document is
/// fine:
///
/// ```
/// use reflow_core::RuntimeConfig;
///
/// let config = RuntimeConfig::from_json(r#"{ "name": "plots" }"#).unwrap();
/// assert_eq!(config.name, "plots");
/// assert!(config.log_carried_failures);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Name used in log output.
    pub name: String,
    /// Log failures carried by derived nodes at `warn` level.
    pub log_carried_failures: bool,
    /// Warn when this many updates are waiting in the queue.
    pub warn_queue_len: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: "reflow".to_string(),
            log_carried_failures: true,
            warn_queue_len: 10_000,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> Result<Self, ReactiveError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ReactiveError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
