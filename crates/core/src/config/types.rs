use serde::{Deserialize, Serialize};

use crate::pool::{PoolConfig, SolveMode};
use crate::task::TaskKind;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Account key for the solving service.
    pub api_key: String,
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub mode: SolveMode,
    #[serde(default)]
    pub pool: PoolConfig,
    pub task: TaskKind,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Solving service endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Service base URL (e.g., "https://2captcha.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Check the account balance before solving (default: true)
    #[serde(default = "default_true")]
    pub verify_account: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            verify_account: true,
        }
    }
}

fn default_base_url() -> String {
    "https://2captcha.com".to_string()
}

fn default_timeout() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable ones.
    #[serde(default)]
    pub json: bool,
}

/// Metrics configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Print the Prometheus text exposition when the run ends.
    #[serde(default)]
    pub dump_on_exit: bool,
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub api_key_configured: bool,
    pub gateway: GatewayConfig,
    pub mode: SolveMode,
    pub pool: PoolConfig,
    pub task: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            api_key_configured: !config.api_key.is_empty(),
            gateway: config.gateway.clone(),
            mode: config.mode,
            pool: config.pool.clone(),
            task: config.task.name().to_string(),
        }
    }
}
