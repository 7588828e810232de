//! DNS server setup and lifecycle management.

use hickory_proto::rr::LowerName;
use hickory_server::ServerFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::dnssec::{DnssecCapability, ResponseExtension};
use crate::error::DnsError;
use crate::health::{HealthCheck, HealthChecker};
use crate::processor::StatusProcessor;
use crate::record::ConfiguredRecord;
use crate::responder::DynamicResponder;
use crate::scheduler::Scheduler;
use crate::store::RecordStore;

/// Interval for emitting store metrics.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// Periodically emit store metrics.
async fn metrics_loop(store: RecordStore, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(METRICS_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                store.emit_metrics();
                debug!(
                    names = store.names_count(),
                    checked = store.checked_count(),
                    enabled = store.enabled_count(),
                    "emitted store metrics"
                );
            }
            _ = shutdown.cancelled() => {
                debug!("metrics loop shutting down");
                return;
            }
        }
    }
}

/// Health-gated authoritative DNS server.
///
/// Owns the record store and everything that reads or writes it.
pub struct DnsServer {
    config: Config,
    store: RecordStore,
    checks: Vec<HealthCheck>,
    responder: DynamicResponder,
}

impl DnsServer {
    /// Build the server from configuration.
    ///
    /// Fails if any record, key or setting is invalid.
    pub fn new(config: Config) -> Result<Self, DnsError> {
        config.validate()?;

        let default_timeout = Duration::from_secs(config.health.default_timeout);
        let mut builder = RecordStore::builder();
        let mut checks = Vec::with_capacity(config.records.len());
        let mut extensions: HashMap<LowerName, Arc<dyn ResponseExtension>> = HashMap::new();

        for record_config in &config.records {
            let configured = ConfiguredRecord::from_config(record_config, default_timeout)?;
            let label: Arc<str> = Arc::from(configured.record.to_string());

            if let Some(dnssec) = &record_config.dnssec {
                let owner = LowerName::new(configured.name());
                if extensions.contains_key(&owner) {
                    debug!(name = %owner, "DNSSEC already configured for name");
                } else if let Some(capability) =
                    DnssecCapability::from_config(configured.name(), dnssec)?
                {
                    info!(
                        name = %owner,
                        keys = capability.keys().len(),
                        "Activating DNSSEC"
                    );
                    for key in capability.keys() {
                        builder.add_static(key.clone());
                    }
                    extensions.insert(owner, Arc::new(capability));
                }
            }

            let id = builder.add_checked(configured.record.clone());
            debug!(id = %id, record = %label, "configured record");

            checks.push(HealthCheck {
                id,
                label,
                command: configured.command.into(),
                interval: configured.interval,
                timeout: configured.timeout,
            });
        }

        let store = builder.build();
        let responder = DynamicResponder::with_extensions(store.clone(), extensions);

        Ok(Self {
            config,
            store,
            checks,
            responder,
        })
    }

    /// Get a reference to the record store.
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Get a handle to the request handler.
    pub fn responder(&self) -> DynamicResponder {
        self.responder.clone()
    }

    /// Bind the configured address and serve until the token is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), DnsError> {
        let listen_addr = self.config.server.listen_addr();

        let udp_socket = UdpSocket::bind(listen_addr).await?;
        info!(addr = %listen_addr, "DNS UDP listening");

        let tcp_listener = TcpListener::bind(listen_addr).await?;
        info!(addr = %listen_addr, "DNS TCP listening");

        self.serve(udp_socket, tcp_listener, shutdown).await
    }

    /// Serve on already bound sockets until the token is cancelled.
    pub async fn serve(
        self,
        udp_socket: UdpSocket,
        tcp_listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), DnsError> {
        info!(
            records = self.checks.len(),
            names = self.store.names_count(),
            "Starting dynag-dns server"
        );

        let (results_tx, results_rx) = mpsc::channel(self.config.health.channel_capacity);

        // Status processor: the only writer of record state
        let processor = StatusProcessor::new(self.store.clone(), results_rx);
        let processor_handle = tokio::spawn(processor.run(shutdown.clone()));

        // Scheduler: first check of every record fires immediately
        let mut scheduler = Scheduler::new(HealthChecker::new(results_tx));
        for check in self.checks {
            scheduler.add(check);
        }
        let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));

        let metrics_handle = tokio::spawn(metrics_loop(self.store.clone(), shutdown.clone()));

        let mut server = ServerFuture::new(self.responder);
        server.register_socket(udp_socket);
        server.register_listener(tcp_listener, self.config.server.tcp_timeout());

        info!("DNS server ready to serve queries");

        let result = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("DNS server shutdown requested");
                Ok(())
            }
            result = server.block_until_done() => {
                if let Err(e) = &result {
                    error!("DNS server error: {}", e);
                }
                shutdown.cancel();
                result
            }
        };

        let _ = scheduler_handle.await;
        let _ = processor_handle.await;
        let _ = metrics_handle.await;

        info!("DNS server stopped");
        result.map_err(DnsError::from)
    }
}
