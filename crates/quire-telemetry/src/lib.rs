//! Tracing bootstrap for quire binaries.
//!
//! Libraries in this workspace only emit `tracing` events; binaries call
//! [`init_tracing`] once at startup to install a subscriber:
//!
//! - `EnvFilter` from `RUST_LOG` (default `info`)
//! - a fmt layer on stderr
//! - with the `telemetry` feature, an OpenTelemetry OTLP layer when the
//!   standard OTel environment variables ask for one
//!
//! ```bash
//! RUST_LOG=quire_client=debug cargo run -p quire-cli -- scenario
//!
//! # OTLP export (build with --features telemetry)
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 cargo run -p quire-cli --features telemetry -- scenario
//! ```
//!
//! Set `OTEL_SDK_DISABLED=true` to explicitly disable even when the endpoint is set.

#[cfg(feature = "telemetry")]
mod otel;

#[cfg(feature = "telemetry")]
pub use otel::{otel_layer, OtelGuard};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Errors from subscriber installation.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(String),
    #[error("failed to build OTLP exporter: {0}")]
    Exporter(String),
}

/// Keeps exporters alive; drop at process exit to flush pending spans.
#[must_use = "dropping the guard immediately shuts down span export"]
pub struct TelemetryGuard {
    #[cfg(feature = "telemetry")]
    _otel: Option<OtelGuard>,
}

/// Check whether OTel export should be enabled.
///
/// Returns `true` when standard OTel env vars indicate export is desired:
/// - `OTEL_SDK_DISABLED` is NOT set to `"true"`
/// - AND at least one of:
///   - `OTEL_EXPORTER_OTLP_ENDPOINT` is set
///   - `OTEL_TRACES_EXPORTER` is set (and not `"none"`)
pub fn otel_enabled() -> bool {
    if std::env::var("OTEL_SDK_DISABLED")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        return false;
    }

    if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        return true;
    }

    if let Ok(exporter) = std::env::var("OTEL_TRACES_EXPORTER") {
        return !exporter.eq_ignore_ascii_case("none");
    }

    false
}

/// Build the env filter, falling back to [`DEFAULT_FILTER`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber for `service_name`.
pub fn init_tracing(service_name: &str) -> Result<TelemetryGuard, TelemetryError> {
    let registry = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr));

    #[cfg(feature = "telemetry")]
    {
        if otel_enabled() {
            let (layer, guard) = otel_layer(service_name)?;
            registry
                .with(layer)
                .try_init()
                .map_err(|e| TelemetryError::AlreadyInstalled(e.to_string()))?;
            return Ok(TelemetryGuard { _otel: Some(guard) });
        }
    }

    registry
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInstalled(e.to_string()))?;
    tracing::debug!(service = service_name, "tracing initialized");

    Ok(TelemetryGuard {
        #[cfg(feature = "telemetry")]
        _otel: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_builds() {
        // Whatever RUST_LOG holds in the test environment, a filter comes back.
        let _ = env_filter();
    }

    #[test]
    fn test_second_init_reports_already_installed() {
        let first = init_tracing("quire-test");
        let second = init_tracing("quire-test");
        // At most one of the two can win the global slot.
        assert!(first.is_err() || matches!(second, Err(TelemetryError::AlreadyInstalled(_))));
    }
}
