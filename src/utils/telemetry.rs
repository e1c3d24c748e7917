//! Observability
//!
//! One entry point that installs the global `tracing` subscriber: env filter,
//! console output, an optional daily log file, and an OTLP exporter when
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

use anyhow::Result;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::{propagation::TraceContextPropagator, runtime, trace as sdktrace, Resource};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

const DEFAULT_FILTER: &str = "verdict_orchestrator=info,tower_http=info";

/// Keep alive for the lifetime of the process.
pub struct TelemetryGuard {
    _file: Option<WorkerGuard>,
    otel: bool,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.otel {
            global::shutdown_tracer_provider();
        }
    }
}

fn otlp_tracer(service_name: &str) -> Result<sdktrace::Tracer> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Endpoint and headers come from the standard OTEL_* variables.
    let exporter = opentelemetry_otlp::new_exporter().tonic().build_span_exporter()?;

    let trace_config = sdktrace::Config::default().with_resource(Resource::new(vec![
        KeyValue::new("service.name", service_name.to_string()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]));

    let provider = sdktrace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(trace_config)
        .build();

    global::set_tracer_provider(provider.clone());
    Ok(provider.tracer(service_name.to_string()))
}

/// Must run inside a Tokio runtime when OTLP export is enabled.
pub fn init_telemetry(service_name: &str, log_dir: Option<&Path>) -> Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let tracer = match std::env::var(OTLP_ENDPOINT_ENV) {
        Ok(endpoint) if !endpoint.trim().is_empty() => Some(otlp_tracer(service_name)?),
        _ => None,
    };
    let otel = tracer.is_some();
    let telemetry = tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t));

    let (file_layer, file_guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, format!("{}.log", service_name));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(filter)
        .with(telemetry)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()?;

    Ok(TelemetryGuard { _file: file_guard, otel })
}
