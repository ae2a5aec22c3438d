use super::{default_state_root, ConfigError};
use crate::explorer::{ExplorerClient, DEFAULT_EXPLORER_URL, DEFAULT_ROOTS_LIMIT};
use crate::orchestration::{EventPublisher, NoopPublisher, PollPolicy, WebSocketPublisher};
use crate::tool::invocation::DEFAULT_DATA_MOUNT;
use crate::tool::{ProcessRunner, ToolContext, ToolLauncher};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_SERVICE_URL: &str = "SERVICE_URL";
pub const ENV_SERVICE_NAME: &str = "SERVICE_NAME";
pub const ENV_RECORDKEEPER: &str = "RECORDKEEPER";
pub const ENV_DATA_DIR: &str = "PDP_DATA_DIR";
pub const ENV_STATE_ROOT: &str = "PDPFLOW_STATE_ROOT";
pub const ENV_EVENTS_URL: &str = "PDPFLOW_EVENTS_URL";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub service_url: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub recordkeeper: String,
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Defaults to `~/.pdpflow` when unset.
    #[serde(default)]
    pub state_root: Option<PathBuf>,
    #[serde(default)]
    pub tool: ToolSettings,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub events: EventsSettings,
    #[serde(default)]
    pub explorer: ExplorerSettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolSettings {
    /// When unset, the tool runs in its container image with the staging
    /// directory mounted at `data_mount`.
    #[serde(default)]
    pub launcher: Option<ToolLauncher>,
    #[serde(default = "default_data_mount")]
    pub data_mount: String,
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PollingSettings {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EventsSettings {
    /// `ws://host:port` of the stage-event subscriber. Events are only
    /// acknowledged locally when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExplorerSettings {
    #[serde(default = "default_explorer_url")]
    pub base_url: String,
    #[serde(default = "default_roots_limit")]
    pub roots_limit: u64,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MonitorSettings {
    #[serde(default = "default_monitor_bind")]
    pub bind: String,
    /// Also query the explorer while the latest file is stored.
    #[serde(default = "default_true")]
    pub check_storage: bool,
}

fn default_true() -> bool {
    true
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("pdp-data")
}

fn default_data_mount() -> String {
    DEFAULT_DATA_MOUNT.to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_backoff_factor() -> f64 {
    1.5
}

fn default_max_interval_secs() -> u64 {
    60
}

fn default_max_attempts() -> Option<u32> {
    Some(120)
}

fn default_max_wait_secs() -> Option<u64> {
    Some(60 * 60)
}

fn default_ack_timeout_secs() -> u64 {
    30
}

fn default_explorer_url() -> String {
    DEFAULT_EXPLORER_URL.to_string()
}

fn default_roots_limit() -> u64 {
    DEFAULT_ROOTS_LIMIT
}

fn default_check_interval_secs() -> u64 {
    5
}

fn default_monitor_bind() -> String {
    "127.0.0.1:5555".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_url: String::new(),
            service_name: String::new(),
            recordkeeper: String::new(),
            staging_dir: default_staging_dir(),
            state_root: None,
            tool: ToolSettings::default(),
            polling: PollingSettings::default(),
            events: EventsSettings::default(),
            explorer: ExplorerSettings::default(),
            monitor: MonitorSettings::default(),
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            launcher: None,
            data_mount: default_data_mount(),
            command_timeout_secs: None,
        }
    }
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            backoff_factor: default_backoff_factor(),
            max_interval_secs: default_max_interval_secs(),
            max_attempts: default_max_attempts(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

impl Default for EventsSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            ack_timeout_secs: default_ack_timeout_secs(),
        }
    }
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            base_url: default_explorer_url(),
            roots_limit: default_roots_limit(),
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            bind: default_monitor_bind(),
            check_storage: true,
        }
    }
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Environment values win over the file. Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(value) = get(ENV_SERVICE_URL) {
            self.service_url = value;
        }
        if let Some(value) = get(ENV_SERVICE_NAME) {
            self.service_name = value;
        }
        if let Some(value) = get(ENV_RECORDKEEPER) {
            self.recordkeeper = value;
        }
        if let Some(value) = get(ENV_DATA_DIR) {
            self.staging_dir = PathBuf::from(value);
        }
        if let Some(value) = get(ENV_STATE_ROOT) {
            self.state_root = Some(PathBuf::from(value));
        }
        if let Some(value) = get(ENV_EVENTS_URL) {
            self.events.endpoint = Some(value);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("service_url", &self.service_url),
            ("service_name", &self.service_name),
            ("recordkeeper", &self.recordkeeper),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Settings(format!(
                    "`{field}` must be set (config file or environment)"
                )));
            }
        }
        if self.staging_dir.as_os_str().is_empty() {
            return Err(ConfigError::Settings(
                "`staging_dir` must be non-empty".to_string(),
            ));
        }
        if let Some(state_root) = &self.state_root {
            if !state_root.is_absolute() {
                return Err(ConfigError::Settings(
                    "`state_root` must be an absolute path".to_string(),
                ));
            }
        }
        if !self.tool.data_mount.starts_with('/') {
            return Err(ConfigError::Settings(
                "`tool.data_mount` must be an absolute container path".to_string(),
            ));
        }
        if let Some(launcher) = &self.tool.launcher {
            if launcher.program.trim().is_empty() {
                return Err(ConfigError::Settings(
                    "`tool.launcher.program` must be non-empty".to_string(),
                ));
            }
        }
        if self.tool.command_timeout_secs == Some(0) {
            return Err(ConfigError::Settings(
                "`tool.command_timeout_secs` must be > 0".to_string(),
            ));
        }
        if self.polling.interval_secs == 0 {
            return Err(ConfigError::Settings(
                "`polling.interval_secs` must be > 0".to_string(),
            ));
        }
        if !self.polling.backoff_factor.is_finite() || self.polling.backoff_factor < 1.0 {
            return Err(ConfigError::Settings(
                "`polling.backoff_factor` must be >= 1.0".to_string(),
            ));
        }
        if self.polling.max_interval_secs < self.polling.interval_secs {
            return Err(ConfigError::Settings(
                "`polling.max_interval_secs` must be >= `polling.interval_secs`".to_string(),
            ));
        }
        if self.polling.max_attempts == Some(0) {
            return Err(ConfigError::Settings(
                "`polling.max_attempts` must be > 0".to_string(),
            ));
        }
        if let Some(endpoint) = &self.events.endpoint {
            if !endpoint.starts_with("ws://") && !endpoint.starts_with("wss://") {
                return Err(ConfigError::Settings(format!(
                    "`events.endpoint` must be a ws:// or wss:// url, got `{endpoint}`"
                )));
            }
        }
        if self.events.ack_timeout_secs == 0 {
            return Err(ConfigError::Settings(
                "`events.ack_timeout_secs` must be > 0".to_string(),
            ));
        }
        if self.explorer.base_url.trim().is_empty() {
            return Err(ConfigError::Settings(
                "`explorer.base_url` must be non-empty".to_string(),
            ));
        }
        if self.explorer.roots_limit == 0 || self.explorer.check_interval_secs == 0 {
            return Err(ConfigError::Settings(
                "`explorer.roots_limit` and `explorer.check_interval_secs` must be > 0"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn resolve_state_root(&self) -> Result<PathBuf, ConfigError> {
        match &self.state_root {
            Some(path) => Ok(path.clone()),
            None => default_state_root(),
        }
    }

    /// Staging directory as an absolute path, resolved against the current
    /// directory.
    pub fn resolve_staging_dir(&self) -> Result<PathBuf, ConfigError> {
        if self.staging_dir.is_absolute() {
            return Ok(self.staging_dir.clone());
        }
        let cwd = std::env::current_dir().map_err(|err| {
            ConfigError::Settings(format!("failed to resolve current directory: {err}"))
        })?;
        Ok(cwd.join(&self.staging_dir))
    }

    pub fn tool_context(&self) -> Result<ToolContext, ConfigError> {
        let launcher = match &self.tool.launcher {
            Some(launcher) => launcher.clone(),
            None => ToolLauncher::docker(&self.resolve_staging_dir()?, &self.tool.data_mount),
        };
        Ok(ToolContext {
            launcher,
            service_url: self.service_url.clone(),
            service_name: self.service_name.clone(),
            recordkeeper: self.recordkeeper.clone(),
            data_mount: self.tool.data_mount.clone(),
        })
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.polling.interval_secs),
            backoff_factor: self.polling.backoff_factor,
            max_interval: Duration::from_secs(self.polling.max_interval_secs),
            max_attempts: self.polling.max_attempts,
            max_wait: self.polling.max_wait_secs.map(Duration::from_secs),
        }
    }

    pub fn process_runner(&self) -> ProcessRunner {
        let runner = ProcessRunner::new();
        match self.tool.command_timeout_secs {
            Some(secs) => runner.with_timeout(Duration::from_secs(secs)),
            None => runner,
        }
    }

    pub fn publisher(&self) -> Box<dyn EventPublisher + Send> {
        match &self.events.endpoint {
            Some(endpoint) => Box::new(WebSocketPublisher::new(
                endpoint.clone(),
                Duration::from_secs(self.events.ack_timeout_secs),
            )),
            None => Box::new(NoopPublisher),
        }
    }

    pub fn explorer_client(&self) -> ExplorerClient {
        ExplorerClient::new(self.explorer.base_url.clone(), self.explorer.roots_limit)
    }
}
