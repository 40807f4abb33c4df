/// Runtime configuration loader - parses service.toml
///
/// Separates tunable service parameters from code, making it easy to
/// adjust query radii, alert thresholds, or the upstream provider URL
/// without recompiling. Every field has a default, so a missing file
/// (or a file that only overrides one table) still yields a complete,
/// working configuration.

use serde::Deserialize;
use std::fs;

/// Root configuration structure for TOML parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub query: QueryConfig,
    pub alerts: AlertConfig,
}

/// HTTP endpoint settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port the endpoint server binds on.
    pub port: u16,
    /// Number of request worker threads (also sizes the DB client pool).
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 8080,
            workers: 4,
        }
    }
}

/// Upstream water-quality data provider settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the Water Quality Portal result search API.
    pub base_url: String,
    /// Request timeout for provider calls, in seconds.
    pub timeout_seconds: u64,
    /// Default search radius (miles — the provider API speaks miles).
    pub default_radius_miles: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            base_url: "https://www.waterqualitydata.us/data/Result/search".to_string(),
            timeout_seconds: 15,
            default_radius_miles: 50.0,
        }
    }
}

/// Geospatial query defaults for the read endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Default radius for source searches, in meters.
    pub default_source_radius_m: f64,
    /// Default radius for alert proximity queries, in meters.
    pub default_alert_radius_m: f64,
    /// Cap on the number of sources a single search returns.
    pub max_results: usize,
    /// Minimum purity score for a source to count as "clean".
    pub min_safe_purity: f64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            default_source_radius_m: 50_000.0,
            default_alert_radius_m: 10_000.0,
            max_results: 100,
            min_safe_purity: 70.0,
        }
    }
}

/// Quality alert policy settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Severity score (0-10) at or above which an alert is raised.
    pub severity_threshold: f64,
    /// Radius stamped on new alerts, in meters.
    pub default_affected_radius_m: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        AlertConfig {
            severity_threshold: 8.0,
            default_affected_radius_m: 5000.0,
        }
    }
}

/// Parses a TOML configuration document into a `ServiceConfig`.
///
/// # Panics
/// Panics if the document is malformed. A present-but-broken config file
/// is an operator error that should fail loudly at startup, not be
/// silently papered over with defaults.
fn parse_config(contents: &str) -> ServiceConfig {
    toml::from_str(contents)
        .unwrap_or_else(|e| panic!("Failed to parse service.toml: {}", e))
}

/// Loads service configuration from service.toml.
///
/// A missing file is not an error — the service runs entirely on defaults
/// in that case, which keeps local development and tests friction-free.
///
/// # File Location
/// Expects `service.toml` in the current working directory (project root
/// when running via `cargo run`).
pub fn load_config() -> ServiceConfig {
    let config_path = "service.toml";

    match fs::read_to_string(config_path) {
        Ok(contents) => parse_config(&contents),
        Err(_) => ServiceConfig::default(),
    }
}
