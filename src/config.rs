use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "api-gateway")]
#[command(about = "Small HTTP API gateway with per-client rate limiting")]
pub struct Args {
    // Path to the YAML config file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    // Listen address, overrides server.address
    #[arg(short, long)]
    pub address: Option<String>,

    // Log level, overrides logging.level
    #[arg(short, long)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    pub telemetry: TelemetryConfig,
    pub rate_limiting: RateLimitingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub version: String,
    pub routes: RoutesConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            routes: RoutesConfig::default(),
        }
    }
}

// Paths of the built-in handlers. Item routes are nested under /api/{version}
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    pub health: String,
    pub get_items: String,
    pub create_item: String,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            health: "/health".to_string(),
            get_items: "/items".to_string(),
            create_item: "/items".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub metrics_endpoint: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            metrics_endpoint: "/metrics".to_string(),
        }
    }
}

// No defaults for the limits: enabling the limiter without them is a startup error
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    pub enabled: bool,
    // Max requests allowed per client per window
    pub max_requests: Option<u32>,
    // Window length as a duration string, e.g. "1m", "30s", "1m30s"
    pub time_window: Option<String>,
}

impl RateLimitingConfig {
    pub fn max_requests(&self) -> Result<u32, ConfigError> {
        match self.max_requests {
            Some(0) => Err(ConfigError::Invalid(
                "rate_limiting.max_requests must be positive".to_string(),
            )),
            Some(max) => Ok(max),
            None => Err(ConfigError::Invalid(
                "rate_limiting.max_requests is required".to_string(),
            )),
        }
    }

    pub fn window(&self) -> Result<Duration, ConfigError> {
        let raw = self.time_window.as_deref().ok_or_else(|| {
            ConfigError::Invalid("rate_limiting.time_window is required".to_string())
        })?;
        let window = humantime::parse_duration(raw.trim()).map_err(|e| {
            ConfigError::Invalid(format!("rate_limiting.time_window {:?}: {}", raw, e))
        })?;
        if window.is_zero() {
            return Err(ConfigError::Invalid(
                "rate_limiting.time_window must be positive".to_string(),
            ));
        }
        Ok(window)
    }
}

impl Config {
    /// Read and parse the YAML file at `path`.
    ///
    /// Not validated yet: CLI overrides still have to be applied, so callers
    /// run `validate` once everything is merged.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    // Parse and validate in one go, for configs with nothing to override
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    // CLI flags win over the file
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(address) = &args.address {
            self.server.address = address.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.address.parse().map_err(|e| {
            ConfigError::Invalid(format!("server.address {:?}: {}", self.server.address, e))
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.api.version.is_empty() || self.api.version.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "api.version {:?} must be a single path segment",
                self.api.version
            )));
        }

        let routes = &self.api.routes;
        for (name, path) in [
            ("health", &routes.health),
            ("get_items", &routes.get_items),
            ("create_item", &routes.create_item),
        ] {
            check_route(name, path)?;
        }

        if self.telemetry.enabled && !self.telemetry.metrics_endpoint.is_empty() {
            check_route("metrics_endpoint", &self.telemetry.metrics_endpoint)?;
        }

        if self.rate_limiting.enabled {
            self.rate_limiting.max_requests()?;
            self.rate_limiting.window()?;
        }

        Ok(())
    }
}

fn check_route(name: &str, path: &str) -> Result<(), ConfigError> {
    if !path.starts_with('/') {
        return Err(ConfigError::Invalid(format!(
            "route {} {:?} must start with '/'",
            name, path
        )));
    }
    Ok(())
}
