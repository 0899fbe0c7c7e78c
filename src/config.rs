//! Sandbox configuration
//!
//! Defaults can be overridden through `SANDBOX_*` environment variables (a `.env`
//! file is honoured by the binary). The configuration is set once at startup and is
//! read-only afterwards.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Context;
use tracing::warn;

use crate::domain::types::{DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT_SECS};
use crate::domain::ExecutionLimits;

/// Sandbox configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxConfig {
    /// Run timeout when a request does not set one (default: 10s)
    pub default_timeout_secs: u64,
    /// Compile phase timeout (default: 10s)
    pub compile_timeout_secs: u64,
    /// Ceiling for each captured output stream (default: 1 MiB)
    pub max_output_bytes: usize,
    /// Parent directory for scratch directories (default: system temp dir)
    pub scratch_root: Option<PathBuf>,
    /// Executions allowed at the same time by the HTTP service
    pub max_concurrent_runs: usize,
    /// Listen address of the HTTP service
    pub bind_addr: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            compile_timeout_secs: 10,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            scratch_root: None,
            max_concurrent_runs: 4,
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl SandboxConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            default_timeout_secs: env_or("SANDBOX_TIMEOUT_SECS", defaults.default_timeout_secs)?,
            compile_timeout_secs: env_or(
                "SANDBOX_COMPILE_TIMEOUT_SECS",
                defaults.compile_timeout_secs,
            )?,
            max_output_bytes: env_or("SANDBOX_MAX_OUTPUT_BYTES", defaults.max_output_bytes)?,
            scratch_root: std::env::var_os("SANDBOX_SCRATCH_ROOT").map(PathBuf::from),
            max_concurrent_runs: env_or("SANDBOX_MAX_CONCURRENCY", defaults.max_concurrent_runs)?,
            bind_addr: std::env::var("SANDBOX_BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    /// Limits applied to requests that do not bring their own
    pub fn default_limits(&self) -> ExecutionLimits {
        ExecutionLimits::new(
            Duration::from_secs(self.default_timeout_secs),
            self.max_output_bytes,
        )
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", key, value)),
        Err(_) => Ok(default),
    }
}

/// Global sandbox configuration
static SANDBOX_CONFIG: OnceLock<SandboxConfig> = OnceLock::new();

/// Initialize the global sandbox configuration
pub fn init_config(config: SandboxConfig) -> anyhow::Result<()> {
    SANDBOX_CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("Sandbox configuration already initialized"))?;

    Ok(())
}

/// Get sandbox configuration
pub fn get_config() -> &'static SandboxConfig {
    SANDBOX_CONFIG.get().unwrap_or_else(|| {
        static DEFAULT: OnceLock<SandboxConfig> = OnceLock::new();

        warn!("Sandbox configuration not initialized, using default");
        DEFAULT.get_or_init(SandboxConfig::default)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits_follow_config() {
        let config = SandboxConfig {
            default_timeout_secs: 3,
            max_output_bytes: 512,
            ..SandboxConfig::default()
        };
        let limits = config.default_limits();
        assert_eq!(limits.timeout, Duration::from_secs(3));
        assert_eq!(limits.max_output_bytes, 512);
    }

    #[test]
    fn test_env_or_parses_and_rejects() {
        std::env::set_var("CODEBOX_TEST_ENV_OR_OK", " 42 ");
        std::env::set_var("CODEBOX_TEST_ENV_OR_BAD", "forty-two");

        assert_eq!(env_or("CODEBOX_TEST_ENV_OR_OK", 1u64).unwrap(), 42);
        assert!(env_or("CODEBOX_TEST_ENV_OR_BAD", 1u64).is_err());
        assert_eq!(env_or("CODEBOX_TEST_ENV_OR_MISSING", 7usize).unwrap(), 7);
    }
}
