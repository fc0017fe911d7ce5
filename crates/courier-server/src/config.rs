//! Server configuration.
//!
//! Looked up in order: an explicit `--config` path, `./courier.toml`, then
//! `<config dir>/courier/config.toml`. With none present the built-in
//! defaults apply. CLI flags override whatever was loaded.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use courier_city::GraphConfig;
use courier_fleet::DispatchConfig;
use courier_protocol::MIN_FRAME_LEN;
use serde::{Deserialize, Serialize};

use crate::ServerError;

pub const LOCAL_CONFIG_FILE: &str = "courier.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ListenerConfig,
    pub simulation: SimulationConfig,
    pub graph: GraphConfig,
    pub tasks: TaskConfig,
}

/// `[server]`: the TCP listener and the request bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub bind: String,
    /// Exact length of every request frame.
    pub frame_len: usize,
    pub bridge_timeout_ms: u64,
    pub frame_read_timeout_ms: u64,
    pub max_connections: usize,
    pub bridge_capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5555".to_string(),
            frame_len: courier_protocol::DEFAULT_FRAME_LEN,
            bridge_timeout_ms: 5_000,
            frame_read_timeout_ms: 2_000,
            max_connections: 64,
            bridge_capacity: 1024,
        }
    }
}

/// `[simulation]`: tick cadence, liveness, and randomness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub tick_ms: u64,
    pub staleness_secs: u64,
    /// Seed for graph growth, placement, and task generation. Random when
    /// unset.
    pub seed: Option<u64>,
    /// Period of the status log line. Zero disables it.
    pub status_interval_secs: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            staleness_secs: 30,
            seed: None,
            status_interval_secs: 10,
        }
    }
}

/// `[tasks]`: generation and the assignment/completion policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub generate: bool,
    pub interval_ms: u64,
    pub recognition_distance: f32,
    pub max_open: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            generate: true,
            interval_ms: 5_000,
            recognition_distance: 5.0,
            max_open: 32,
        }
    }
}

/// CLI flags that override file values.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind: Option<String>,
    pub seed: Option<u64>,
}

impl ServerConfig {
    /// Load from the first config file found, or defaults.
    ///
    /// Returns the path that was used, if any. An explicit path that does
    /// not exist is an error; the fallback locations are optional.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            let config = Self::from_file(path)?;
            return Ok((config, Some(path.to_path_buf())));
        }

        for candidate in default_locations() {
            if candidate.exists() {
                let config = Self::from_file(&candidate)?;
                return Ok((config, Some(candidate)));
            }
        }
        Ok((Self::default(), None))
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(bind) = &overrides.bind {
            self.server.bind = bind.clone();
        }
        if let Some(seed) = overrides.seed {
            self.simulation.seed = Some(seed);
        }
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        self.graph.validate()?;

        if self.server.frame_len < MIN_FRAME_LEN {
            return Err(ServerError::Config(format!(
                "frame_len {} is below the {MIN_FRAME_LEN}-byte minimum",
                self.server.frame_len
            )));
        }
        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|e| ServerError::Config(format!("bind '{}': {e}", self.server.bind)))?;

        let intervals = [
            ("server.bridge_timeout_ms", self.server.bridge_timeout_ms),
            ("server.frame_read_timeout_ms", self.server.frame_read_timeout_ms),
            ("simulation.tick_ms", self.simulation.tick_ms),
            ("simulation.staleness_secs", self.simulation.staleness_secs),
            ("tasks.interval_ms", self.tasks.interval_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(ServerError::Config(format!("{name} must be non-zero")));
        }
        if self.server.max_connections == 0 || self.server.bridge_capacity == 0 {
            return Err(ServerError::Config(
                "max_connections and bridge_capacity must be non-zero".into(),
            ));
        }
        let recognition = self.tasks.recognition_distance;
        if !(recognition.is_finite() && recognition >= 0.0) {
            return Err(ServerError::Config(format!(
                "recognition_distance {} must be a non-negative number",
                self.tasks.recognition_distance
            )));
        }
        Ok(())
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            recognition_distance: self.tasks.recognition_distance,
            staleness: Duration::from_secs(self.simulation.staleness_secs),
            max_open_tasks: self.tasks.max_open,
        }
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_millis(self.server.bridge_timeout_ms)
    }

    pub fn frame_read_timeout(&self) -> Duration {
        Duration::from_millis(self.server.frame_read_timeout_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.simulation.tick_ms)
    }

    pub fn task_interval(&self) -> Duration {
        Duration::from_millis(self.tasks.interval_ms)
    }

    pub fn status_interval(&self) -> Option<Duration> {
        (self.simulation.status_interval_secs > 0)
            .then(|| Duration::from_secs(self.simulation.status_interval_secs))
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut out = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        out.push(dir.join("courier").join("config.toml"));
    }
    out
}
