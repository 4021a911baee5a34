use crate::error::BridgeError;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bridge session configuration
///
/// Describes the child executable to supervise and the TCP endpoint it is
/// expected to expose once the warm-up window has elapsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(setter(into, strip_option))]
pub struct BridgeConfig {
    /// Executable to launch
    pub command: PathBuf,

    #[serde(default)]
    #[builder(default)]
    #[builder(setter(custom))]
    pub args: Vec<String>,

    #[serde(default)]
    #[builder(default)]
    #[builder(setter(custom))]
    pub env: HashMap<String, String>,

    #[serde(default)]
    #[builder(default)]
    pub working_directory: Option<PathBuf>,

    #[serde(default = "default_host")]
    #[builder(default = "default_host()")]
    pub host: String,

    #[serde(default = "default_port")]
    #[builder(default = "default_port()")]
    pub port: u16,

    /// Fixed wait after launch before the single connect attempt (in milliseconds)
    #[serde(default = "default_warm_up_ms")]
    #[builder(default = "default_warm_up_ms()")]
    pub warm_up_ms: u64,

    /// Bound on the wait after a graceful termination request (in milliseconds)
    #[serde(default = "default_termination_grace_ms")]
    #[builder(default = "default_termination_grace_ms()")]
    pub termination_grace_ms: u64,

    /// Longest accepted line in either direction, unbounded when unset
    #[serde(default)]
    #[builder(default)]
    pub max_message_bytes: Option<usize>,
}

impl BridgeConfig {
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            BridgeError::Configuration(format!("invalid config {}: {e}", path.display()))
        })
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.command.as_os_str().is_empty() {
            return Err(BridgeError::Configuration(
                "command must not be empty".to_string(),
            ));
        }

        if self.host.trim().is_empty() {
            return Err(BridgeError::Configuration(
                "host must not be empty".to_string(),
            ));
        }

        if self.port == 0 {
            return Err(BridgeError::Configuration(
                "port must be a concrete TCP port".to_string(),
            ));
        }

        if self.termination_grace_ms == 0 {
            return Err(BridgeError::Configuration(
                "termination_grace_ms must be greater than zero".to_string(),
            ));
        }

        if self.max_message_bytes == Some(0) {
            return Err(BridgeError::Configuration(
                "max_message_bytes must be greater than zero when set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn warm_up(&self) -> Duration {
        Duration::from_millis(self.warm_up_ms)
    }

    pub fn termination_grace(&self) -> Duration {
        Duration::from_millis(self.termination_grace_ms)
    }

    /// `host:port` form used for connecting and logging
    pub fn upstream_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl BridgeConfigBuilder {
    pub fn args<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        let args: Vec<String> = iter.into_iter().map(|s| s.to_string()).collect();
        self.args = Some(args);
        self
    }

    pub fn env<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let map = self.env.get_or_insert_with(HashMap::new);
        map.insert(key.to_string(), value.to_string());
        self
    }

    pub fn env_multi<T: ToString, I: IntoIterator<Item = (T, T)>>(&mut self, iter: I) -> &mut Self {
        let env = self.env.get_or_insert_with(HashMap::new);
        for (key, value) in iter {
            env.insert(key.to_string(), value.to_string());
        }
        self
    }
}

// Default value functions for serde and the builder
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_warm_up_ms() -> u64 {
    10_000
}
fn default_termination_grace_ms() -> u64 {
    5_000
}
