//! Configuration module for the echo server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;

/// Command-line arguments for the echo server
#[derive(Parser, Debug)]
#[command(name = "select-echo")]
#[command(version = "0.1.0")]
#[command(about = "A single-threaded TCP echo server multiplexed over select(2)", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// IPv4 address to listen on (e.g., 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// TCP port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Maximum number of concurrent clients (capped by FD_SETSIZE)
    #[arg(long)]
    pub max_clients: Option<usize>,

    /// Per-connection write staging capacity in bytes
    #[arg(long)]
    pub write_buffer: Option<usize>,

    /// Bytes consumed from a socket per readiness report
    #[arg(long)]
    pub read_buffer: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub buffers: BufferConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// IPv4 address to listen on
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum number of concurrent clients
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_clients: default_max_clients(),
        }
    }
}

/// Buffer sizing configuration
#[derive(Debug, Deserialize)]
pub struct BufferConfig {
    /// Per-connection write staging capacity in bytes
    #[serde(default = "default_write_buffer")]
    pub write: usize,
    /// Bytes consumed from a socket per readiness report
    #[serde(default = "default_read_buffer")]
    pub read: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            write: default_write_buffer(),
            read: default_read_buffer(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_clients() -> usize {
    libc::FD_SETSIZE as usize
}

fn default_write_buffer() -> usize {
    8192
}

fn default_read_buffer() -> usize {
    4096
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_clients: usize,
    pub write_buffer_size: usize,
    pub read_buffer_size: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::resolve(cli, toml_config)
    }

    /// Merge CLI args with TOML config (CLI takes precedence) and
    /// validate the result.
    fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let config = Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            max_clients: cli.max_clients.unwrap_or(toml_config.server.max_clients),
            write_buffer_size: cli.write_buffer.unwrap_or(toml_config.buffers.write),
            read_buffer_size: cli.read_buffer.unwrap_or(toml_config.buffers.read),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.parse::<Ipv4Addr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "host '{}' is not an IPv4 address",
                self.host
            )));
        }
        if self.max_clients == 0 || self.max_clients > libc::FD_SETSIZE as usize {
            return Err(ConfigError::Invalid(format!(
                "max_clients must be between 1 and {}",
                libc::FD_SETSIZE
            )));
        }
        if self.write_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "write buffer capacity must be non-zero".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "read buffer size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Listening address as a typed IPv4 socket address.
    pub fn bind_addr(&self) -> io::Result<SocketAddrV4> {
        let ip: Ipv4Addr = self.host.parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid IPv4 host '{}': {e}", self.host),
            )
        })?;
        Ok(SocketAddrV4::new(ip, self.port))
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_clients, libc::FD_SETSIZE as usize);
        assert_eq!(config.buffers.write, 8192);
        assert_eq!(config.buffers.read, 4096);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 9090
            max_clients = 64

            [buffers]
            write = 16384
            read = 2048

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.max_clients, 64);
        assert_eq!(config.buffers.write, 16384);
        assert_eq!(config.buffers.read, 2048);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            [server]
            port = 9090
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.buffers.write, 8192);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let cli = CliArgs::parse_from(["select-echo", "--port", "9000", "--read-buffer", "1024"]);
        let toml_str = r#"
            [server]
            port = 7070

            [buffers]
            read = 512
        "#;
        let toml_config: TomlConfig = toml::from_str(toml_str).unwrap();

        let config = Config::resolve(cli, toml_config).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.read_buffer_size, 1024);
        // Untouched knobs fall through to the TOML side.
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.write_buffer_size, 8192);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let toml_config = TomlConfig::default();
        let cli = CliArgs::parse_from(["select-echo", "--host", "example.com"]);
        assert!(Config::resolve(cli, toml_config).is_err());

        let cli = CliArgs::parse_from(["select-echo", "--write-buffer", "0"]);
        assert!(Config::resolve(cli, TomlConfig::default()).is_err());

        let cli = CliArgs::parse_from(["select-echo", "--max-clients", "100000"]);
        assert!(Config::resolve(cli, TomlConfig::default()).is_err());
    }

    #[test]
    fn test_bind_addr() {
        let cli = CliArgs::parse_from(["select-echo", "--host", "127.0.0.1", "--port", "8081"]);
        let config = Config::resolve(cli, TomlConfig::default()).unwrap();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.ip(), &Ipv4Addr::LOCALHOST);
        assert_eq!(addr.port(), 8081);
    }
}
