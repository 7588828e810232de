//! Logging and metrics exporter setup.
//!
//! `RUST_LOG` takes precedence over `telemetry.log_level`. The Prometheus
//! exporter needs the `prometheus` feature and OTLP trace export needs the
//! `otel` feature; without them the corresponding settings are ignored with
//! a warning.

use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

#[cfg(feature = "otel")]
static TRACER_PROVIDER: std::sync::OnceLock<opentelemetry_sdk::trace::SdkTracerProvider> =
    std::sync::OnceLock::new();

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Install the tracing subscriber and, if configured, the metrics exporter.
pub fn init(config: &TelemetryConfig) -> Result<(), BoxError> {
    let filter = env_filter(&config.log_level);
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true));

    #[cfg(feature = "otel")]
    {
        let otel_layer = config
            .opentelemetry
            .as_ref()
            .map(otel_layer)
            .transpose()?;
        registry.with(otel_layer).try_init()?;
    }
    #[cfg(not(feature = "otel"))]
    {
        registry.try_init()?;
        if config.opentelemetry.is_some() {
            warn!("telemetry.opentelemetry is set but the `otel` feature is disabled");
        }
    }

    if let Some(addr) = config.prometheus_addr {
        start_prometheus_exporter(addr)?;
    }

    Ok(())
}

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

#[cfg(feature = "otel")]
fn otel_layer<S>(
    config: &crate::config::OpenTelemetryConfig,
) -> Result<impl tracing_subscriber::Layer<S>, BoxError>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    use opentelemetry::trace::TracerProvider;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.endpoint)
        .build()?;

    let resource = opentelemetry_sdk::Resource::builder()
        .with_attributes([
            KeyValue::new(SERVICE_NAME, config.service_name.clone()),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
        ])
        .build();

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();
    let tracer = provider.tracer("dynag-dns");
    let _ = TRACER_PROVIDER.set(provider);

    Ok(tracing_opentelemetry::layer().with_tracer(tracer))
}

#[cfg(feature = "prometheus")]
fn start_prometheus_exporter(addr: std::net::SocketAddr) -> Result<(), BoxError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    tracing::info!(%addr, "Prometheus metrics exporter started");
    Ok(())
}

#[cfg(not(feature = "prometheus"))]
fn start_prometheus_exporter(addr: std::net::SocketAddr) -> Result<(), BoxError> {
    warn!(%addr, "telemetry.prometheus_addr is set but the `prometheus` feature is disabled");
    Ok(())
}

/// Flush pending trace exports.
pub fn shutdown() {
    #[cfg(feature = "otel")]
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            warn!("Error shutting down tracer provider: {}", e);
        }
    }
}
