//! Configuration resolution for the railway booking server.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config_dir>/railway/server.toml`)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (applied by the binary, highest priority)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Complete server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub booking: BookingConfig,
    pub mail: MailConfig,
}

/// Listener and connection-manager settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Live connections above this ceiling are closed on accept.
    pub max_connections: usize,
    /// Hard cap on buffered bytes without a line terminator.
    pub max_line_bytes: usize,
    pub maintenance_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 100,
            max_line_bytes: 1024 * 1024, // 1 MiB
            maintenance_interval_secs: 60,
        }
    }
}

/// Database location.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

/// Credential and session policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SecurityConfig {
    pub session_lifetime_hours: i64,
    pub max_failed_attempts: i64,
    pub lockout_minutes: i64,
    pub verification_code_minutes: i64,
    pub min_password_length: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            session_lifetime_hours: 24,
            max_failed_attempts: 5,
            lockout_minutes: 5,
            verification_code_minutes: 15,
            min_password_length: 8,
        }
    }
}

/// Booking hold policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BookingConfig {
    /// Unpaid bookings older than this are expired by the maintenance sweep.
    pub hold_minutes: i64,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self { hold_minutes: 15 }
    }
}

/// Outbound mail identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MailConfig {
    pub sender_address: String,
    pub sender_name: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            sender_address: "noreply@railway.local".to_string(),
            sender_name: "Railway Booking System".to_string(),
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// `explicit` is a file the operator named on the command line; unlike the
/// global file it must exist.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = match global_config_path() {
        Some(path) if path.exists() => load_config_file(&path)?,
        _ => Config::default(),
    };

    if let Some(path) = explicit {
        config = load_config_file(path)?;
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Global config file location.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("railway").join("server.toml"))
}

/// Default database location when none is configured.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".railway").join("railway.db"))
}

/// Parse a TOML config file. Missing keys fall back to defaults.
pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    toml::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(n) = var("RAILWAY_PORT").and_then(|v| v.parse().ok()) {
        config.server.port = n;
    }
    if let Some(val) = var("RAILWAY_BIND_ADDRESS") {
        config.server.bind_address = val;
    }
    if let Some(n) = var("RAILWAY_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
        config.server.max_connections = n;
    }
    if let Some(val) = var("RAILWAY_DB_PATH") {
        config.database.path = Some(PathBuf::from(val));
    }
    if let Some(n) = var("RAILWAY_BOOKING_HOLD_MINUTES").and_then(|v| v.parse().ok()) {
        config.booking.hold_minutes = n;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_connections, 100);
        assert_eq!(config.server.max_line_bytes, 1_048_576);
        assert_eq!(config.server.maintenance_interval_secs, 60);
        assert_eq!(config.security.max_failed_attempts, 5);
        assert_eq!(config.security.lockout_minutes, 5);
        assert_eq!(config.security.session_lifetime_hours, 24);
        assert_eq!(config.booking.hold_minutes, 15);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 9090\n\n[booking]\nhold_minutes = 30").unwrap();

        let config = load_config_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.booking.hold_minutes, 30);
        assert_eq!(config.security, SecurityConfig::default());
    }

    #[test]
    fn malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();

        let err = load_config_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_explicit_file_is_error() {
        let err = load_config(Some(Path::new("/nonexistent/railway.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        let vars: HashMap<&str, &str> = [
            ("RAILWAY_PORT", "7000"),
            ("RAILWAY_MAX_CONNECTIONS", "not-a-number"),
            ("RAILWAY_DB_PATH", "/tmp/rail.db"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.max_connections, 100);
        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/rail.db")));
    }
}
