//! # Telemetry Features
//!
//! Logs are always written to stdout through `tracing_subscriber::fmt`. On
//! top of that, spans and metrics can be exported with OpenTelemetry.
//!
//! ## Feature matrix
//!
//! - `otel-traces`: Exports spans (one per lifecycle request, plus the loader's
//!   `ensure_populated` span).
//! - `metrics`: Exports lifecycle counters and the request duration histogram.
//! - `otlp`: Enables the OTLP/gRPC exporter. The collector endpoint is read
//!   from `OTEL_EXPORTER_OTLP_ENDPOINT`.
//! - `stdout`: Enables the stdout exporter.
//!
//! ## Feature constraints
//!
//! - Exporters require at least one of `otel-traces` or `metrics`.
//! - `otlp` and `stdout` can be enabled at the same time.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run --features otel-traces,metrics,otlp
//! cargo run --features metrics,stdout
//! ```

#[cfg(all(feature = "otlp", not(any(feature = "otel-traces", feature = "metrics"))))]
compile_error!(
    "The 'otlp' feature requires at least one of 'otel-traces' or 'metrics' to be enabled."
);

#[cfg(all(
    feature = "stdout",
    not(any(feature = "otel-traces", feature = "metrics"))
))]
compile_error!(
    "The 'stdout' feature requires at least one of 'otel-traces' or 'metrics' to be enabled."
);

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(all(feature = "otlp", any(feature = "metrics", feature = "otel-traces")))]
use opentelemetry_otlp::{Protocol, WithExportConfig, WithTonicConfig};
#[cfg(all(feature = "otlp", feature = "metrics"))]
use opentelemetry_sdk::metrics::Temporality;
#[cfg(all(feature = "otlp", any(feature = "metrics", feature = "otel-traces")))]
use tonic::transport::ClientTlsConfig;

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(any(feature = "metrics", feature = "otel-traces"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "otel-traces"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "otel-traces"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "otel-traces")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel-traces")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "otel-traces")]
use opentelemetry_sdk::trace as sdktrace;

#[cfg(any(feature = "metrics", feature = "otel-traces"))]
const SERVICE_NAME: &str = "subnet-pool";

#[cfg(all(feature = "otlp", any(feature = "metrics", feature = "otel-traces")))]
const EXPORT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

pub struct TelemetryProviders {
    #[cfg(feature = "otel-traces")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes pending spans and metrics and shuts the exporters down.
    pub fn shutdown(self) {
        #[cfg(feature = "otel-traces")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "otel-traces")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "otel-traces")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "metrics", feature = "otel-traces"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        );

    #[cfg(feature = "otel-traces")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(&meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.init();

    Ok(TelemetryProviders {
        #[cfg(feature = "otel-traces")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "otel-traces"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        let exporter = opentelemetry_stdout::MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_timeout(EXPORT_TIMEOUT)
            .with_protocol(Protocol::Grpc)
            .with_temporality(Temporality::Delta)
            .build()
            .context("failed to build metrics exporter")?;

        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(feature = "otel-traces")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        let exporter = opentelemetry_stdout::SpanExporter::default();
        builder.with_span_processor(batch_processor(exporter))
    };

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_timeout(EXPORT_TIMEOUT)
            .with_protocol(Protocol::Grpc)
            .build()
            .context("failed to build tracer exporter")?;

        builder.with_span_processor(batch_processor(exporter))
    };

    Ok(builder.build())
}

#[cfg(all(feature = "otel-traces", any(feature = "stdout", feature = "otlp")))]
fn batch_processor<E>(exporter: E) -> sdktrace::BatchSpanProcessor
where
    E: opentelemetry_sdk::trace::SpanExporter + 'static,
{
    sdktrace::BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            sdktrace::BatchConfigBuilder::default()
                .with_scheduled_delay(std::time::Duration::from_secs(5))
                .with_max_queue_size(2048)
                .build(),
        )
        .build()
}

#[cfg(feature = "metrics")]
static LIFECYCLE_REQUESTS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static LIFECYCLE_FAILURES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static LIFECYCLE_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static RECORDS_WRITTEN: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static UNPROCESSED_RETRIES: OnceLock<Counter<u64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: &Meter) {
    let _ = LIFECYCLE_REQUESTS.set(
        meter
            .u64_counter("lifecycle_requests")
            .with_description("Lifecycle requests accepted, by request type")
            .build(),
    );

    let _ = LIFECYCLE_FAILURES.set(
        meter
            .u64_counter("lifecycle_failures")
            .with_description("Lifecycle requests reported as FAILED")
            .build(),
    );

    let _ = LIFECYCLE_DURATION_MS.set(
        meter
            .f64_histogram("lifecycle_duration")
            .with_unit("ms")
            .with_description("Time from accepting a request to reporting its outcome")
            .build(),
    );

    let _ = RECORDS_WRITTEN.set(
        meter
            .u64_counter("records_written")
            .with_description("Allocation records acknowledged by the store")
            .build(),
    );

    let _ = UNPROCESSED_RETRIES.set(
        meter
            .u64_counter("unprocessed_retries")
            .with_description("Re-submissions of unprocessed records")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn increment_requests(request_type: &str) {
    if let Some(counter) = LIFECYCLE_REQUESTS.get() {
        counter.add(1, &[KeyValue::new("request_type", request_type.to_string())]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_requests(_request_type: &str) {}

#[cfg(feature = "metrics")]
pub fn increment_failures(reason: &'static str) {
    if let Some(counter) = LIFECYCLE_FAILURES.get() {
        counter.add(1, &[KeyValue::new("reason", reason)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_failures(_reason: &'static str) {}

#[cfg(feature = "metrics")]
pub fn record_duration(duration_ms: f64) {
    if let Some(histogram) = LIFECYCLE_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_duration(_duration_ms: f64) {}

#[cfg(feature = "metrics")]
pub fn increment_records_written(count: u64) {
    if let Some(counter) = RECORDS_WRITTEN.get() {
        counter.add(count, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_records_written(_count: u64) {}

#[cfg(feature = "metrics")]
pub fn increment_unprocessed_retries(count: u64) {
    if let Some(counter) = UNPROCESSED_RETRIES.get() {
        counter.add(count, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_unprocessed_retries(_count: u64) {}
