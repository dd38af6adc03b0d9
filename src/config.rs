use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Environment override tracking
// ---------------------------------------------------------------------------

/// Tracks which configuration settings are overridden by environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    overrides: HashMap<String, String>,
}

impl EnvOverrides {
    /// Check whether a setting key (e.g. "refresh.interval_secs") is overridden.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    /// Get the env var name that overrides the given setting key.
    pub fn env_var_for(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }

    /// Get all overrides as a map of setting key -> env var name.
    pub fn all(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn record(&mut self, key: &str, env_var: &str) {
        self.overrides.insert(key.to_string(), env_var.to_string());
    }
}

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub autosave: AutoSaveConfig,
    #[serde(default)]
    pub failure: FailureConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Env var overrides are not serialized to TOML.
    #[serde(skip)]
    pub env_overrides: EnvOverrides,
}

/// Credential refresh cycle and retry policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshConfig {
    /// Period of the refresh cycle.
    #[serde(default = "default_refresh_interval_secs")]
    pub interval_secs: u64,
    /// A credential with less than this left is re-fetched once more.
    #[serde(default = "default_refresh_buffer_secs")]
    pub buffer_secs: i64,
    /// Failed attempts allowed before the failure handler takes over.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay; doubles with every retry.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval_secs(),
            buffer_secs: default_refresh_buffer_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActivityConfig {
    /// Minimum spacing between handled interaction signals.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Activity forces a refresh when less than this remains.
    #[serde(default = "default_expiry_threshold_secs")]
    pub expiry_threshold_secs: i64,
    /// Signals buffered per listener before it starts dropping.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

impl ActivityConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
            expiry_threshold_secs: default_expiry_threshold_secs(),
            bus_capacity: default_bus_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutoSaveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_autosave_interval_secs")]
    pub interval_secs: u64,
}

impl AutoSaveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_autosave_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FailureConfig {
    /// Delay between the failure notification and the forced sign-out.
    #[serde(default = "default_sign_out_grace_ms")]
    pub sign_out_grace_ms: u64,
    /// Where to land after sign-out, and the hard navigation target when
    /// sign-out fails.
    #[serde(default = "default_safe_entry_point")]
    pub safe_entry_point: String,
}

impl FailureConfig {
    pub fn sign_out_grace(&self) -> Duration {
        Duration::from_millis(self.sign_out_grace_ms)
    }
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            sign_out_grace_ms: default_sign_out_grace_ms(),
            safe_entry_point: default_safe_entry_point(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LifecycleConfig {
    /// Total initialization attempts, including the first.
    #[serde(default = "default_init_attempts")]
    pub init_attempts: u32,
    /// Attempt `n` waits `n * init_retry_base_ms` before the next one.
    #[serde(default = "default_init_retry_base_ms")]
    pub init_retry_base_ms: u64,
}

impl LifecycleConfig {
    pub fn init_retry_base(&self) -> Duration {
        Duration::from_millis(self.init_retry_base_ms)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            init_attempts: default_init_attempts(),
            init_retry_base_ms: default_init_retry_base_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Directory for the file backend.
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            dir: default_storage_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    File,
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("Unknown storage backend: {s}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_refresh_interval_secs() -> u64 {
    20 * 60
}
const fn default_refresh_buffer_secs() -> i64 {
    300
}
const fn default_max_retries() -> u32 {
    3
}
const fn default_backoff_base_ms() -> u64 {
    1000
}
const fn default_throttle_ms() -> u64 {
    1000
}
const fn default_expiry_threshold_secs() -> i64 {
    600
}
const fn default_bus_capacity() -> usize {
    crate::activity::DEFAULT_BUS_CAPACITY
}
const fn default_true() -> bool {
    true
}
const fn default_autosave_interval_secs() -> u64 {
    30
}
const fn default_sign_out_grace_ms() -> u64 {
    3000
}
fn default_safe_entry_point() -> String {
    "/".to_string()
}
const fn default_init_attempts() -> u32 {
    3
}
const fn default_init_retry_base_ms() -> u64 {
    1000
}
fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("session-guard")
        .join("backups")
}
fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Config loading and env overrides
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. Any setting prefixed with `SESSION_GUARD_` takes precedence
    /// over the file value and is tracked in `env_overrides`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Save the file-level configuration (env overrides are not written).
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        let mut ov = EnvOverrides::default();

        macro_rules! env_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val;
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_bool {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_parse {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                        ov.record($key, $env);
                    }
                }
            };
        }
        macro_rules! env_path {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = PathBuf::from(val);
                    ov.record($key, $env);
                }
            };
        }

        // -- Refresh --
        env_parse!("refresh.interval_secs", "SESSION_GUARD_REFRESH_INTERVAL_SECS", self.refresh.interval_secs);
        env_parse!("refresh.buffer_secs", "SESSION_GUARD_REFRESH_BUFFER_SECS", self.refresh.buffer_secs);
        env_parse!("refresh.max_retries", "SESSION_GUARD_REFRESH_MAX_RETRIES", self.refresh.max_retries);
        env_parse!("refresh.backoff_base_ms", "SESSION_GUARD_REFRESH_BACKOFF_BASE_MS", self.refresh.backoff_base_ms);

        // -- Activity --
        env_parse!("activity.throttle_ms", "SESSION_GUARD_ACTIVITY_THROTTLE_MS", self.activity.throttle_ms);
        env_parse!(
            "activity.expiry_threshold_secs",
            "SESSION_GUARD_ACTIVITY_EXPIRY_THRESHOLD_SECS",
            self.activity.expiry_threshold_secs
        );
        env_parse!("activity.bus_capacity", "SESSION_GUARD_ACTIVITY_BUS_CAPACITY", self.activity.bus_capacity);

        // -- Auto-save --
        env_bool!("autosave.enabled", "SESSION_GUARD_AUTOSAVE_ENABLED", self.autosave.enabled);
        env_parse!("autosave.interval_secs", "SESSION_GUARD_AUTOSAVE_INTERVAL_SECS", self.autosave.interval_secs);

        // -- Failure --
        env_parse!("failure.sign_out_grace_ms", "SESSION_GUARD_SIGN_OUT_GRACE_MS", self.failure.sign_out_grace_ms);
        env_str!("failure.safe_entry_point", "SESSION_GUARD_SAFE_ENTRY_POINT", self.failure.safe_entry_point);

        // -- Lifecycle --
        env_parse!("lifecycle.init_attempts", "SESSION_GUARD_INIT_ATTEMPTS", self.lifecycle.init_attempts);
        env_parse!("lifecycle.init_retry_base_ms", "SESSION_GUARD_INIT_RETRY_BASE_MS", self.lifecycle.init_retry_base_ms);

        // -- Storage --
        env_parse!("storage.backend", "SESSION_GUARD_STORAGE_BACKEND", self.storage.backend);
        env_path!("storage.dir", "SESSION_GUARD_STORAGE_DIR", self.storage.dir);

        // -- Logging --
        env_str!("logging.level", "SESSION_GUARD_LOG_LEVEL", self.logging.level);
        env_bool!("logging.json", "SESSION_GUARD_LOG_JSON", self.logging.json);

        self.env_overrides = ov;
    }
}

// Helper for the default backup directory
mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share"))
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
