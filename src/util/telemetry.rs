use std::time::Duration;

use opentelemetry::{KeyValue, global};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{self, Protocol, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::util::env::Var;
use crate::var;

pub type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>;

const SERVICE_NAME: &str = "unban-relay";
const TRACER_NAME: &str = "unban-relay";

/// Subscriber wiring for the relay. An fmt layer always logs to stdout; when an
/// `OTEL_EXPORTER` collector endpoint is configured, traces, logs and metrics are
/// additionally exported over OTLP, otherwise spans fall back to a console
/// exporter.
#[derive(Debug, Clone)]
pub struct Telemetry {
    pub base_resource: Resource,
    pub collector_url: &'static str,

    logger_provider: Option<SdkLoggerProvider>,
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl Telemetry {
    pub async fn new() -> Result<Telemetry> {
        let collector_url = var!(Var::OtelExporterEndpoint).await?;
        let service_version = env!("CARGO_PKG_VERSION");

        let base_resource = base_attrs(SERVICE_NAME, service_version);

        // without a collector, spans still land on the console exporter
        if collector_url.is_empty() {
            let tracer_provider = build_stdout_tracer_provider(base_resource.clone());
            return Ok(Self {
                base_resource,
                collector_url,
                logger_provider: None,
                tracer_provider: Some(tracer_provider),
                meter_provider: None,
            });
        }

        let logger_provider = build_logger_provider(collector_url, base_resource.clone())?;
        let meter_provider = build_meter_provider(collector_url, base_resource.clone())?;
        let tracer_provider = build_tracer_provider(collector_url, base_resource.clone())?;

        Ok(Self {
            base_resource,
            collector_url,
            logger_provider: Some(logger_provider),
            tracer_provider: Some(tracer_provider),
            meter_provider: Some(meter_provider),
        })
    }

    pub fn register(self) -> Self {
        let trace_layer = self.tracer_provider.as_ref().map(|provider| {
            global::set_tracer_provider(provider.clone());
            tracing_opentelemetry::layer().with_tracer(global::tracer(TRACER_NAME))
        });

        let log_layer = self
            .logger_provider
            .as_ref()
            .map(OpenTelemetryTracingBridge::new);

        let meter_layer = self
            .meter_provider
            .as_ref()
            .map(|provider| tracing_opentelemetry::MetricsLayer::new(provider.clone()));

        tracing_subscriber::registry()
            .with(trace_layer)
            .with(log_layer)
            .with(meter_layer)
            .with(EnvFilter::new(
                "unban_relay=debug,tower_http=debug,axum=debug,info",
            ))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .init();

        self
    }

    pub fn shutdown(self) {
        if let Some(provider) = self.meter_provider {
            if let Err(e) = provider.shutdown() {
                eprintln!("error during metering shutdown: {e:?}");
            } else {
                println!("metering shut down ok");
            }
        }

        if let Some(provider) = self.logger_provider {
            if let Err(e) = provider.shutdown() {
                eprintln!("error during logging shutdown: {e:?}");
            } else {
                println!("logging shut down ok");
            }
        }

        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                eprintln!("error during tracing shutdown: {e:?}");
            } else {
                println!("tracing shut down ok");
            }
        }
    }
}

pub fn build_logger_provider(
    collector_url: &str,
    base_resource: Resource,
) -> Result<SdkLoggerProvider> {
    let exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(Endpoint::Logs.to_url(collector_url))
        .with_timeout(Duration::from_secs(5))
        .build()?;

    Ok(SdkLoggerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(base_resource.clone())
        .build())
}

pub fn build_tracer_provider(
    collector_url: &str,
    base_resource: Resource,
) -> Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(Endpoint::Traces.to_url(collector_url))
        .with_timeout(Duration::from_secs(5))
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(base_resource.clone())
        .build();

    global::set_tracer_provider(provider.clone());

    Ok(provider)
}

pub fn build_meter_provider(
    collector_url: &str,
    base_resource: Resource,
) -> Result<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(Endpoint::Metrics.to_url(collector_url))
        .with_timeout(Duration::from_secs(5))
        .build()?;

    Ok(SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .with_resource(base_resource.clone())
        .build())
}

/// Console-only tracer for development without an external OTEL collector.
/// `register` installs it globally like any other tracer provider.
pub fn build_stdout_tracer_provider(base_resource: Resource) -> SdkTracerProvider {
    let exporter = opentelemetry_stdout::SpanExporter::default();

    SdkTracerProvider::builder()
        .with_simple_exporter(exporter)
        .with_id_generator(RandomIdGenerator::default())
        .with_sampler(Sampler::AlwaysOn)
        .with_resource(base_resource)
        .build()
}

fn base_attrs(name: &'static str, version: &'static str) -> Resource {
    Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", name),
            KeyValue::new("service.version", version),
        ])
        .build()
}

enum Endpoint {
    Logs,
    Traces,
    Metrics,
}

impl Endpoint {
    pub fn to_url(&self, collector_endpoint: &str) -> String {
        let location: &str = match self {
            Endpoint::Logs => "/v1/logs",
            Endpoint::Traces => "/v1/traces",
            Endpoint::Metrics => "/v1/metrics",
        };
        format!("{collector_endpoint}{location}")
    }
}
