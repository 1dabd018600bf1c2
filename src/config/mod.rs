//! Configuration management

use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::str::FromStr;

use crate::grpc::interceptor::HANDSHAKE_METHOD_SUFFIX;

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Scheme installed in the interceptor slot
    pub mode: AuthMode,
    /// Calls whose full method name ends with this are handshake calls
    pub handshake_method_suffix: String,
    /// Permit running without any authentication
    pub allow_unauthenticated: bool,
    pub telemetry: TelemetryConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Handshake,
            handshake_method_suffix: HANDSHAKE_METHOD_SUFFIX.to_string(),
            allow_unauthenticated: false,
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Authentication mode: "none", "handshake" or "basic_bearer"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    None,
    Handshake,
    BasicBearer,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::None => "none",
            AuthMode::Handshake => "handshake",
            AuthMode::BasicBearer => "basic_bearer",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(AuthMode::None),
            "handshake" => Ok(AuthMode::Handshake),
            "basic_bearer" | "basic-bearer" | "bearer" => Ok(AuthMode::BasicBearer),
            other => anyhow::bail!("unknown auth mode '{}'", other),
        }
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "json" for structured logs, anything else for text
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            metrics_enabled: false,
        }
    }
}

impl AuthConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which stands in for the environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| {
            lookup(key)
                .map(|s| s.to_lowercase() == "true")
                .unwrap_or(false)
        };

        Ok(Self {
            mode: lookup("FLIGHT_AUTH_MODE")
                .unwrap_or_else(|| "handshake".to_string())
                .parse()
                .context("Invalid FLIGHT_AUTH_MODE")?,
            handshake_method_suffix: lookup("FLIGHT_AUTH_HANDSHAKE_SUFFIX")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| HANDSHAKE_METHOD_SUFFIX.to_string()),
            allow_unauthenticated: flag("FLIGHT_AUTH_ALLOW_UNAUTHENTICATED"),
            telemetry: TelemetryConfig {
                log_format: lookup("LOG_FORMAT").unwrap_or_else(|| "text".to_string()),
                metrics_enabled: flag("METRICS_ENABLED"),
            },
        })
    }
}
