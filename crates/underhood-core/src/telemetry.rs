use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::OnceCell;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry_prometheus::PrometheusExporter;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogRotation;

static LOGGING: OnceLock<()> = OnceLock::new();
static TELEMETRY: OnceCell<TelemetryState> = OnceCell::new();
static METRICS: OnceCell<MetricsHandles> = OnceCell::new();

const LOG_FILE_PREFIX: &str = "zoekt-underhood";

struct TelemetryState {
    _provider: SdkMeterProvider,
    registry: Registry,
}

struct MetricsHandles {
    requests: Counter<u64>,
    request_errors: Counter<u64>,
    request_latency: Histogram<f64>,
    backend_files: Counter<u64>,
}

/// Keeps the background log writer alive; drop it last.
#[must_use]
pub struct TelemetryGuard {
    _appender: Option<WorkerGuard>,
}

/// Initialize logging and metrics. Only the first call installs a logger.
pub fn init(log_dir: Option<&Path>, rotation: LogRotation) -> Result<TelemetryGuard> {
    let appender = configure_logging(log_dir, rotation)?;
    init_metrics()?;
    Ok(TelemetryGuard {
        _appender: appender,
    })
}

fn configure_logging(log_dir: Option<&Path>, rotation: LogRotation) -> Result<Option<WorkerGuard>> {
    if LOGGING.get().is_some() {
        return Ok(None);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .json()
        .with_current_span(false)
        .with_span_list(false);

    let appender = match log_dir {
        Some(dir) => {
            let file = RollingFileAppender::builder()
                .rotation(rotation.into())
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix("log")
                .build(dir)
                .with_context(|| format!("failed to open log directory {}", dir.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let _ = tracing::subscriber::set_global_default(builder.with_writer(writer).finish());
            Some(guard)
        }
        None => {
            let subscriber = builder.with_writer(std::io::stderr).finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
            None
        }
    };
    let _ = LOGGING.set(());
    Ok(appender)
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
        }
    }
}

/// Install the Prometheus-backed meter provider. Safe to call multiple times.
pub fn init_metrics() -> Result<()> {
    TELEMETRY.get_or_try_init(|| {
        let registry = Registry::new();
        let exporter = build_exporter(&registry)?;

        let provider = SdkMeterProvider::builder()
            .with_resource(Resource::new(vec![KeyValue::new(
                "service.name",
                "zoekt-underhood",
            )]))
            .with_reader(exporter)
            .build();

        global::set_meter_provider(provider.clone());

        let meter = global::meter("zoekt-underhood");
        let requests = meter
            .u64_counter("underhood_requests_total")
            .with_description("API requests handled, by endpoint")
            .init();
        let request_errors = meter
            .u64_counter("underhood_request_errors_total")
            .with_description("API requests answered with an error, by endpoint")
            .init();
        let request_latency = meter
            .f64_histogram("underhood_request_latency_ms")
            .with_description("API request latency in milliseconds, by endpoint")
            .init();
        let backend_files = meter
            .u64_counter("underhood_backend_files_total")
            .with_description("Files returned by the search backend after repository filtering")
            .init();

        METRICS
            .set(MetricsHandles {
                requests,
                request_errors,
                request_latency,
                backend_files,
            })
            .map_err(|_| anyhow!("metrics handles already initialized"))?;

        Ok::<_, anyhow::Error>(TelemetryState {
            _provider: provider,
            registry,
        })
    })?;
    Ok(())
}

fn build_exporter(registry: &Registry) -> Result<PrometheusExporter> {
    opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()
        .context("failed to build Prometheus exporter")
}

fn metrics() -> Option<&'static MetricsHandles> {
    METRICS.get()
}

/// Record one handled request for `endpoint`.
pub fn record_request(endpoint: &'static str, latency_ms: u64, ok: bool) {
    if let Some(metrics) = metrics() {
        let labels = [KeyValue::new("endpoint", endpoint)];
        metrics.requests.add(1, &labels);
        if !ok {
            metrics.request_errors.add(1, &labels);
        }
        metrics.request_latency.record(latency_ms as f64, &labels);
    }
}

pub fn record_backend_files(count: usize) {
    if count == 0 {
        return;
    }
    if let Some(metrics) = metrics() {
        metrics.backend_files.add(count as u64, &[]);
    }
}

/// Render all currently collected metrics in Prometheus text format.
pub fn export_prometheus() -> Result<String> {
    let state = TELEMETRY
        .get()
        .ok_or_else(|| anyhow!("telemetry not initialized"))?;
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("failed to encode metrics")?;
    String::from_utf8(buffer).context("metrics buffer is not valid UTF-8")
}
