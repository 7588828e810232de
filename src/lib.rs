//! dynag-dns - An authoritative DNS server whose answers follow health checks.
//!
//! Every configured resource record carries an external check command. The
//! record is served only while its most recent check exited with status 0.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           dynag-dns                              │
//! │                                                                  │
//! │  ┌───────────┐   ┌───────────────┐   ┌──────────────────┐        │
//! │  │ Scheduler │──▶│ HealthChecker │──▶│ StatusProcessor  │        │
//! │  │ (per rec) │   │ (child proc)  │   │ (single writer)  │        │
//! │  └───────────┘   └───────────────┘   └────────┬─────────┘        │
//! │                      CheckResult channel      │ apply            │
//! │                                               ▼                  │
//! │                                      ┌──────────────────┐        │
//! │                                      │   RecordStore    │        │
//! │                                      └────────┬─────────┘        │
//! │                                               │ lookup           │
//! │                                      ┌────────▼─────────┐        │
//! │                                      │ DynamicResponder │◀─ UDP/TCP
//! │                                      └──────────────────┘        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Answering
//!
//! ```text
//! class != IN                        → NOTIMP
//! name not configured                → NXDOMAIN
//! name configured, type not          → NOERROR, no answers
//! records configured, none healthy   → SERVFAIL (not cached by resolvers)
//! otherwise                          → NOERROR, healthy records in order
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use dynag_dns::{Config, DnsServer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), dynag_dns::DnsError> {
//!     let config = Config::load("dynag-dns.toml".as_ref())?;
//!     let server = DnsServer::new(config)?;
//!     server.run(CancellationToken::new()).await
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod dnssec;
pub mod error;
pub mod health;
pub mod metrics;
pub mod processor;
pub mod record;
pub mod responder;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod telemetry;

// Re-export main types
pub use config::{Config, HealthConfig, RecordConfig, ServerConfig, TelemetryConfig};
pub use error::DnsError;
pub use health::{CheckResult, HealthCheck, HealthChecker};
pub use processor::StatusProcessor;
pub use responder::{DynamicResponder, Resolution};
pub use scheduler::{CheckRunner, Scheduler};
pub use server::DnsServer;
pub use store::{DynamicRecord, RecordId, RecordStore};
