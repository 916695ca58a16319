//! Registry Configuration
//!
//! Tuning knobs for the registry, settable programmatically or from
//! environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `PRIVREG_SPIN_BEFORE_YIELD` | Spin iterations per roster node before yielding during the quiescence wait | 1024 |
//! | `PRIVREG_LOG_LEVEL` | Log level (off/error/warn/info/debug/trace) | info |
//!
//! The block size is a compile-time constant ([`crate::BLOCK_SIZE`]) and is
//! intentionally not configurable here: the pid-to-slot arithmetic must not
//! change after initialization.
//!
//! # Example
//!
//! ```rust,ignore
//! use priv_registry::RegistryConfig;
//!
//! let config = RegistryConfig::builder()
//!     .spin_before_yield(256)
//!     .build();
//! ```

use std::env;
use std::fmt;

use crate::log::Level;

const ENV_SPIN_BEFORE_YIELD: &str = "PRIVREG_SPIN_BEFORE_YIELD";
const ENV_LOG_LEVEL: &str = "PRIVREG_LOG_LEVEL";

/// Error produced when an environment variable holds an unparsable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// The offending variable name.
    pub variable: &'static str,
    /// The value found in the environment.
    pub value: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid value {:?} for environment variable {}",
            self.value, self.variable
        )
    }
}

impl std::error::Error for ConfigError {}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Spin iterations per roster node before the quiescence wait yields the
    /// thread. Zero yields on every iteration.
    pub spin_before_yield: u32,
    /// Minimum log level applied when this configuration initializes the
    /// process-wide registry. Logging is process-global.
    pub log_level: Level,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            spin_before_yield: 1024,
            log_level: Level::Info,
        }
    }
}

impl RegistryConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load configuration from `PRIVREG_*` environment variables.
    ///
    /// Missing variables fall back to their defaults; present but malformed
    /// values are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = env::var(ENV_SPIN_BEFORE_YIELD) {
            config.spin_before_yield = raw.parse().map_err(|_| ConfigError {
                variable: ENV_SPIN_BEFORE_YIELD,
                value: raw,
            })?;
        }

        if let Ok(raw) = env::var(ENV_LOG_LEVEL) {
            config.log_level = Level::parse(&raw).ok_or(ConfigError {
                variable: ENV_LOG_LEVEL,
                value: raw,
            })?;
        }

        Ok(config)
    }
}

/// Builder for [`RegistryConfig`].
#[derive(Debug, Clone)]
pub struct RegistryConfigBuilder {
    config: RegistryConfig,
}

impl RegistryConfigBuilder {
    /// Set the spin count used before each yield in the quiescence wait.
    pub fn spin_before_yield(mut self, spins: u32) -> Self {
        self.config.spin_before_yield = spins;
        self
    }

    /// Set the log level.
    pub fn log_level(mut self, level: Level) -> Self {
        self.config.log_level = level;
        self
    }

    /// Finish building.
    pub fn build(self) -> RegistryConfig {
        self.config
    }
}
