//! Service configuration.
//!
//! Defaults live in code; an optional TOML file and `SWITCHBOARD__*`
//! environment variables (double underscore for nesting, e.g.
//! `SWITCHBOARD__SESSION__TIMEOUT_SECS=600`) are layered on top.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "SWITCHBOARD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub agents: AgentsConfig,
    pub router: RouterSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8844,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// What to do when an agent repeats the previous answer verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateAnswerPolicy {
    /// Store the repeated answer as `None` ("nothing new").
    #[default]
    Suppress,
    /// Store the repeated answer as-is.
    Keep,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a session is evicted.
    pub timeout_secs: u64,
    /// Interval of the background eviction sweep.
    pub sweep_interval_secs: u64,
    pub duplicate_answers: DuplicateAnswerPolicy,
    /// Reload persisted agent memories when a session is built.
    pub recover_last_session: bool,
    /// Persist agent memories on session release.
    pub persist_memory: bool,
    /// Root for persisted memories; platform data dir when unset.
    pub memory_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 1800,
            sweep_interval_secs: 60,
            duplicate_answers: DuplicateAnswerPolicy::Suppress,
            recover_last_session: false,
            persist_memory: false,
            memory_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn memory_root(&self) -> PathBuf {
        self.memory_dir.clone().unwrap_or_else(default_memory_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Persona name of the casual agent.
    pub agent_name: String,
    pub languages: Vec<String>,
    /// Upper bound of action-loop iterations per query.
    pub max_iterations: usize,
    /// Working directory handed to the file agent.
    pub work_dir: Option<PathBuf>,
    /// Memory size that triggers compaction.
    pub memory_max_turns: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            agent_name: "jarvis".into(),
            languages: vec!["en".into()],
            max_iterations: 8,
            work_dir: None,
            memory_max_turns: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    /// Minimum confidence for a keyword match to win outright.
    pub confidence_threshold: f64,
    /// Route to the casual agent when nothing else scores.
    pub fallback_to_casual: bool,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            fallback_to_casual: true,
        }
    }
}

fn default_memory_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("switchboard")
        .join("memory")
}

/// Load configuration: code defaults, then `path` (if it exists), then env.
pub fn load_config(path: Option<&Path>) -> Result<SwitchboardConfig, config::ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(config::Config::try_from(&SwitchboardConfig::default())?);

    if let Some(path) = path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
