//! Configuration types for dynag-dns.
//!
//! Configuration is read from a file (TOML, JSON or YAML, chosen by
//! extension) and overlaid with `DYNAG_DNS__*` environment variables.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::DnsError;

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "DYNAG_DNS";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS listener configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Health-check runtime configuration.
    #[serde(default)]
    pub health: HealthConfig,

    /// Health-checked records to serve.
    #[serde(default)]
    pub records: Vec<RecordConfig>,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from a file, with environment overrides.
    pub fn load(path: &Path) -> Result<Self, DnsError> {
        let builder = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from in-memory text in the given format.
    pub fn from_text(text: &str, format: ::config::FileFormat) -> Result<Self, DnsError> {
        let config: Self = ::config::Config::builder()
            .add_source(::config::File::from_str(text, format))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that deserialize fine but cannot be served.
    pub fn validate(&self) -> Result<(), DnsError> {
        if self.health.channel_capacity == 0 {
            return Err(DnsError::Config(
                "health.channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.health.default_timeout == 0 {
            return Err(DnsError::Config(
                "health.default_timeout must be at least 1 second".to_string(),
            ));
        }

        for record in &self.records {
            if record.interval == 0 {
                return Err(DnsError::Config(format!(
                    "record {}: interval must be at least 1 second",
                    record.name
                )));
            }
            if record.timeout == Some(0) {
                return Err(DnsError::Config(format!(
                    "record {}: timeout must be at least 1 second",
                    record.name
                )));
            }
            if record.command.argv().is_empty() {
                return Err(DnsError::Config(format!(
                    "record {}: command is empty",
                    record.name
                )));
            }
        }

        Ok(())
    }
}

/// DNS listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (UDP and TCP).
    #[serde(default = "default_listen")]
    pub listen: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Idle timeout for TCP connections in seconds.
    #[serde(default = "default_tcp_timeout")]
    pub tcp_timeout: u64,
}

impl ServerConfig {
    /// Socket address the UDP socket and TCP listener bind to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen, self.port)
    }

    /// TCP idle timeout.
    pub fn tcp_timeout(&self) -> Duration {
        Duration::from_secs(self.tcp_timeout)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            tcp_timeout: default_tcp_timeout(),
        }
    }
}

/// Health-check runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Timeout in seconds for checks that do not set their own.
    #[serde(default = "default_check_timeout")]
    pub default_timeout: u64,

    /// Capacity of the check result channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_check_timeout(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// One health-checked resource record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Owner name (e.g., "www.example.org.").
    pub name: String,

    /// Record text after the owner name: `[ttl] [class] TYPE RDATA`
    /// (e.g., "A 198.51.100.1" or "300 IN AAAA 2001:db8::1").
    pub rr: String,

    /// Check command; exit status 0 enables the record.
    pub command: CommandLine,

    /// Seconds between checks.
    pub interval: u64,

    /// Check timeout in seconds, overriding `health.default_timeout`.
    #[serde(default)]
    pub timeout: Option<u64>,

    /// DNSSEC settings for this record's owner name.
    #[serde(default)]
    pub dnssec: Option<DnssecConfig>,
}

/// A command given either as a single string or as an argument list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    /// Whitespace-separated command line, e.g. `"/usr/bin/curl -sf http://x"`.
    Line(String),
    /// Explicit argument vector, binary first.
    Argv(Vec<String>),
}

impl CommandLine {
    /// Binary followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        match self {
            CommandLine::Line(line) => line.split_whitespace().map(String::from).collect(),
            CommandLine::Argv(argv) => argv.clone(),
        }
    }
}

/// DNSSEC settings for an owner name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnssecConfig {
    /// Whether DNSSEC behaviour is active for the name.
    #[serde(default)]
    pub enabled: bool,

    /// DNSKEY records in `rr` syntax (e.g., "3600 IN DNSKEY 257 3 13 ...").
    #[serde(default)]
    pub keys: Vec<String>,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "dynag_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,

    /// OpenTelemetry configuration.
    #[serde(default)]
    pub opentelemetry: Option<OpenTelemetryConfig>,
}

/// OpenTelemetry exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTelemetryConfig {
    /// OTLP endpoint (e.g., "http://localhost:4317").
    pub endpoint: String,

    /// Service name for traces.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
            opentelemetry: None,
        }
    }
}

fn default_listen() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    53
}

fn default_tcp_timeout() -> u64 {
    10
}

fn default_check_timeout() -> u64 {
    10
}

fn default_channel_capacity() -> usize {
    20
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "dynag-dns".to_string()
}
