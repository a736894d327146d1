//! OTel internals: tracing layer and sampling.

use opentelemetry::trace::{
    Link, SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState,
    TracerProvider as _,
};
use opentelemetry::{global, Context, KeyValue};
use opentelemetry_otlp::SpanExporter;
use opentelemetry_sdk::trace::{SdkTracerProvider, Sampler, ShouldSample, SpanLimits};
use opentelemetry_sdk::Resource;
use tracing_opentelemetry::OpenTelemetryLayer;

use crate::TelemetryError;

/// Guard that shuts down the OTel tracer provider on drop, flushing pending spans.
pub struct OtelGuard {
    provider: SdkTracerProvider,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            eprintln!("OTel shutdown error: {e}");
        }
    }
}

/// Build an OpenTelemetry tracing layer and guard.
///
/// Must be called from within a Tokio runtime: the tonic exporter spawns its
/// background tasks on the current handle. The guard must be held alive for
/// the lifetime of the application to ensure spans are flushed.
pub fn otel_layer<S>(
    service_name: &str,
) -> Result<(OpenTelemetryLayer<S, opentelemetry_sdk::trace::SdkTracer>, OtelGuard), TelemetryError>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    if tokio::runtime::Handle::try_current().is_err() {
        return Err(TelemetryError::Exporter(
            "no Tokio runtime is running".to_string(),
        ));
    }

    let exporter = SpanExporter::builder()
        .with_tonic()
        .build()
        .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(QuireSampler)
        .with_resource(resource)
        .with_span_limits(SpanLimits::default())
        .build();

    global::set_tracer_provider(provider.clone());

    let tracer = provider.tracer("quire");
    let layer = tracing_opentelemetry::layer().with_tracer(tracer);

    Ok((layer, OtelGuard { provider }))
}

/// Sampling rate for a span name.
///
/// | Prefix       | Rate | Rationale                                   |
/// |--------------|------|---------------------------------------------|
/// | `dispatch.*` | 100% | Every mutation is worth a trace             |
/// | `session.*`  | 100% | Rare lifecycle operations                   |
/// | `history.*`  | 100% | Rare, user-initiated time travel            |
/// | `refresh.*`  | 10%  | One per invalidated collection per mutation |
/// | `store.*`    |  1%  | Very high volume local bookkeeping          |
/// | other        | 10%  | Default for unclassified spans              |
fn rate_for(name: &str) -> f64 {
    if name.starts_with("dispatch") || name.starts_with("session") || name.starts_with("history") {
        1.0
    } else if name.starts_with("store") {
        0.01
    } else {
        0.1
    }
}

/// Whether the span was opened with an error status attribute.
fn marks_error(attributes: &[KeyValue]) -> bool {
    attributes.iter().any(|kv| match kv.key.as_str() {
        "otel.status_code" => kv.value.as_str() == "ERROR",
        "error" => kv.value.as_str() == "true",
        _ => false,
    })
}

fn record_and_sample(trace_state: TraceState) -> SamplingResult {
    SamplingResult {
        decision: SamplingDecision::RecordAndSample,
        attributes: Vec::new(),
        trace_state,
    }
}

/// Ratio sampler keyed on span name. Children of sampled spans and spans
/// opened as errors are always kept.
#[derive(Debug, Clone)]
struct QuireSampler;

impl ShouldSample for QuireSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        let sampled_parent = parent_context
            .map(|cx| cx.span().span_context().clone())
            .filter(|parent| parent.is_sampled());
        if let Some(parent) = sampled_parent {
            return record_and_sample(parent.trace_state().clone());
        }
        if marks_error(attributes) {
            return record_and_sample(TraceState::default());
        }

        Sampler::TraceIdRatioBased(rate_for(name)).should_sample(
            parent_context,
            trace_id,
            name,
            span_kind,
            attributes,
            links,
        )
    }
}
