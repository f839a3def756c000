//! Client configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration, every field optional)
//! 2. Environment variables (prefixed with `TRIGNO_`)
//!
//! Durations are written as humantime strings (`"1s"`, `"15ms"`).
//!
//! # Example
//! ```no_run
//! use trigno_daq::config::ClientConfig;
//!
//! let config = ClientConfig::load_from("config/trigno.toml")?;
//! config.validate()?;
//! println!("Base station: {}", config.connection.address);
//! # Ok::<(), trigno_daq::error::DaqError>(())
//! ```

use crate::error::{AppResult, DaqError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TRIGNO_";

/// Top-level client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Base station endpoints and deadlines
    pub connection: ConnectionConfig,
    /// Acquisition pipeline settings
    pub acquisition: AcquisitionConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Base station endpoints and deadlines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Host name or IP address of the base station
    pub address: String,
    /// Command channel port
    pub command_port: u16,
    /// EMG data channel port
    pub emg_port: u16,
    /// Auxiliary data channel port
    pub aux_port: u16,
    /// Deadline for establishing each connection
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Deadline for each command round trip
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
    /// Deadline for each binary record read
    #[serde(with = "humantime_serde")]
    pub data_timeout: Duration,
}

/// Acquisition pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Idle wait of iterative consumers before they give up
    #[serde(with = "humantime_serde")]
    pub idle: Duration,
    /// Reject recorded frames whose timestamps do not increase
    pub enforce_monotonic: bool,
}

// Default value functions
fn default_name() -> String {
    "trigno-daq".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_address() -> String {
    "localhost".to_string()
}

fn default_command_port() -> u16 {
    50040
}

fn default_emg_port() -> u16 {
    50043
}

fn default_aux_port() -> u16 {
    50044
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_data_timeout() -> Duration {
    Duration::from_millis(15)
}

fn default_idle() -> Duration {
    crate::experiment::DEFAULT_IDLE
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            command_port: default_command_port(),
            emg_port: default_emg_port(),
            aux_port: default_aux_port(),
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
            data_timeout: default_data_timeout(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            idle: default_idle(),
            enforce_monotonic: true,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file and environment variables
    ///
    /// A missing file is not an error; defaults apply. Environment variables
    /// override the file, e.g. `TRIGNO_CONNECTION_ADDRESS=10.0.0.2`.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::figment(path).extract().map_err(DaqError::from)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> AppResult<Self> {
        Figment::from(Serialized::defaults(ClientConfig::default()))
            .merge(Env::prefixed(ENV_PREFIX).map(section_key))
            .extract()
            .map_err(DaqError::from)
    }

    /// Provider chain used by [`ClientConfig::load_from`]
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(ClientConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).map(section_key))
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| DaqError::Configuration(e.to_string()))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        // Validate log level
        if crate::logging::parse_log_level(&self.application.log_level).is_none() {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                crate::logging::LOG_LEVELS.join(", ")
            )));
        }

        let c = &self.connection;
        if c.address.trim().is_empty() {
            return Err(DaqError::Configuration("Empty base station address".into()));
        }

        // Validate deadlines
        for (name, value) in [
            ("connect_timeout", c.connect_timeout),
            ("command_timeout", c.command_timeout),
            ("data_timeout", c.data_timeout),
        ] {
            if value.is_zero() {
                return Err(DaqError::Configuration(format!("{} must be positive", name)));
            }
        }

        // Validate ports are distinct
        let ports = [c.command_port, c.emg_port, c.aux_port];
        if ports.contains(&0) {
            return Err(DaqError::Configuration("Port 0 is not allowed".into()));
        }
        if ports[0] == ports[1] || ports[0] == ports[2] || ports[1] == ports[2] {
            return Err(DaqError::Configuration(format!(
                "Duplicate ports: command={} emg={} aux={}",
                ports[0], ports[1], ports[2]
            )));
        }

        Ok(())
    }
}

/// Map `CONNECTION_COMMAND_PORT` style keys onto `connection.command_port`.
///
/// Only the first underscore separates the section from the field, so field names
/// keep theirs.
fn section_key(key: &figment::value::UncasedStr) -> figment::value::Uncased<'_> {
    let key = key.as_str().to_ascii_lowercase();
    match key.split_once('_') {
        Some((section, field)) => format!("{}.{}", section, field).into(),
        None => key.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_match_base_station_ports() {
        let config = ClientConfig::default();
        assert_eq!(config.connection.command_port, 50040);
        assert_eq!(config.connection.emg_port, 50043);
        assert_eq!(config.connection.aux_port, 50044);
        assert_eq!(config.connection.data_timeout, Duration::from_millis(15));
        assert_eq!(config.acquisition.idle, Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[connection]
address = "10.0.0.2"
data_timeout = "20ms"

[acquisition]
idle = "500ms"
"#
        )
        .unwrap();

        let config = ClientConfig::load_from(file.path()).unwrap();
        assert_eq!(config.connection.address, "10.0.0.2");
        assert_eq!(config.connection.data_timeout, Duration::from_millis(20));
        assert_eq!(config.connection.command_port, 50040);
        assert_eq!(config.acquisition.idle, Duration::from_millis(500));
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("trigno.toml", "[connection]\naddress = \"file-host\"\n")?;
            jail.set_env("TRIGNO_CONNECTION_ADDRESS", "env-host");
            jail.set_env("TRIGNO_CONNECTION_COMMAND_PORT", "6000");
            let config = ClientConfig::load_from("trigno.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.connection.address, "env-host");
            assert_eq!(config.connection.command_port, 6000);
            Ok(())
        });
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ClientConfig::default();
        config.application.log_level = "loud".into();
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.connection.aux_port = config.connection.emg_port;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.connection.command_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ClientConfig::default();
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("data_timeout = \"15ms\""));
        let parsed: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
