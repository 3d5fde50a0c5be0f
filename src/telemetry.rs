//! Logging, tracing and metrics export
//!
//! Logs are JSON lines filtered by `RUST_LOG`. When
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set, spans and the metrics in
//! [`crate::metrics`] are also pushed over OTLP/gRPC.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,notebook_controller=debug,kube=info,tower=warn,hyper=warn";

/// Downward-API environment variables recorded as resource attributes
const K8S_RESOURCE_ENV: [(&str, &str); 4] = [
    ("POD_NAME", "k8s.pod.name"),
    ("POD_NAMESPACE", "k8s.namespace.name"),
    ("NODE_NAME", "k8s.node.name"),
    ("CONTAINER_NAME", "k8s.container.name"),
];

/// Telemetry setup failures; all are fatal at startup
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// OTLP span exporter could not be built
    #[error("OTLP span exporter: {0}")]
    TracerInit(String),

    /// OTLP metric exporter could not be built
    #[error("OTLP metric exporter: {0}")]
    MetricsInit(String),

    /// A global subscriber was already installed
    #[error("tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Telemetry settings
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name on spans and metrics
    pub service_name: String,

    /// OTLP collector endpoint; nothing is exported when unset
    pub otlp_endpoint: Option<String>,
}

impl TelemetryConfig {
    /// Settings for `service_name`, exporting to `OTEL_EXPORTER_OTLP_ENDPOINT` if set
    pub fn from_env(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|e| !e.is_empty()),
        }
    }
}

/// Install the global subscriber, propagator and, if configured, OTLP exporters
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let otel_layer = match &config.otlp_endpoint {
        Some(endpoint) => {
            let resource = build_resource(&config.service_name, |key| std::env::var(key).ok());
            init_otlp_metrics(endpoint, resource.clone())?;
            let provider = init_otlp_tracer(endpoint, resource)?;
            let tracer = provider.tracer(config.service_name.clone());
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Resource attributes: service name and version plus whatever pod identity
/// `lookup` can find
fn build_resource(service_name: &str, lookup: impl Fn(&str) -> Option<String>) -> Resource {
    let mut attributes = vec![
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
            service_name.to_string(),
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
            env!("CARGO_PKG_VERSION"),
        ),
    ];
    attributes.extend(
        K8S_RESOURCE_ENV
            .iter()
            .filter_map(|(var, key)| lookup(var).map(|value| KeyValue::new(*key, value))),
    );
    Resource::new(attributes)
}

fn init_otlp_tracer(endpoint: &str, resource: Resource) -> Result<TracerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::TracerInit(e.to_string()))?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(resource)
        .build();
    global::set_tracer_provider(provider.clone());
    Ok(provider)
}

fn init_otlp_metrics(endpoint: &str, resource: Resource) -> Result<(), TelemetryError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let reader = PeriodicReader::builder(exporter, runtime::Tokio).build();
    global::set_meter_provider(
        SdkMeterProvider::builder()
            .with_reader(reader)
            .with_resource(resource)
            .build(),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::Key;

    #[test]
    fn resource_carries_pod_identity_when_available() {
        let resource = build_resource("notebook-controller", |var| match var {
            "POD_NAME" => Some("notebook-controller-7d9f".to_string()),
            "POD_NAMESPACE" => Some("kubeflow".to_string()),
            _ => None,
        });
        assert_eq!(
            resource.get(Key::new("k8s.pod.name")).map(|v| v.to_string()),
            Some("notebook-controller-7d9f".to_string())
        );
        assert_eq!(
            resource.get(Key::new("k8s.namespace.name")).map(|v| v.to_string()),
            Some("kubeflow".to_string())
        );
        assert!(resource.get(Key::new("k8s.node.name")).is_none());
        assert_eq!(
            resource.get(Key::new("service.name")).map(|v| v.to_string()),
            Some("notebook-controller".to_string())
        );
    }

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }
}
