//! Server configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use cuecast_utils::{CuecastError, Result};

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub bind_addr: String,
    /// Port the listener binds to
    pub port: u16,
    pub limits: LimitsConfig,
    pub housekeeping: HousekeepingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 8716,
            limits: LimitsConfig::default(),
            housekeeping: HousekeepingConfig::default(),
        }
    }
}

/// Connection and session limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Global ceiling on simultaneous connections
    pub max_connections: usize,
    /// Simultaneous connections allowed per remote endpoint
    pub per_endpoint_limit: usize,
    /// Connections idle longer than this are reclaimed
    pub connection_idle_secs: u64,
    /// Sessions with no request inside this window go inactive
    ///
    /// Much shorter than `connection_idle_secs`: a polling device opens and
    /// closes connections far more often than it actually leaves.
    pub session_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 32,
            per_endpoint_limit: 2,
            connection_idle_secs: 180,
            session_timeout_secs: 15,
        }
    }
}

/// Housekeeping task periods
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HousekeepingConfig {
    /// Period of the reclamation pass (connections and sessions)
    pub reclaim_interval_secs: u64,
    /// Period of the load-summary report
    pub report_interval_secs: u64,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            reclaim_interval_secs: 30,
            report_interval_secs: 60,
        }
    }
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<ServerConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| CuecastError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration from string
    pub fn parse(content: &str, path: &Path) -> Result<ServerConfig> {
        toml::from_str(content).map_err(|e| CuecastError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate configuration
    pub fn validate(config: &ServerConfig) -> Result<()> {
        if config.limits.max_connections == 0 {
            return Err(CuecastError::config("max_connections must be at least 1"));
        }

        if config.limits.per_endpoint_limit == 0 {
            return Err(CuecastError::config("per_endpoint_limit must be at least 1"));
        }

        if config.limits.session_timeout_secs >= config.limits.connection_idle_secs {
            return Err(CuecastError::config(
                "session_timeout_secs must be shorter than connection_idle_secs",
            ));
        }

        if config.housekeeping.reclaim_interval_secs == 0
            || config.housekeeping.report_interval_secs == 0
        {
            return Err(CuecastError::config(
                "housekeeping intervals must be at least 1 second",
            ));
        }

        Ok(())
    }

    /// Load and validate
    pub fn load_and_validate(path: &Path) -> Result<ServerConfig> {
        let config = Self::load_from_path(path)?;
        Self::validate(&config)?;
        Ok(config)
    }
}
