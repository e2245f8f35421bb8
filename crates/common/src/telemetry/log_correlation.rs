use opentelemetry::logs::{AnyValue, LogRecord as LogRecordTrait};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::{InstrumentationScope, Key};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::{LogProcessor, LogRecord, LogResult};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Wraps a log processor and stamps `trace_id` / `span_id` onto every exported
/// record as plain attributes, so a poll cycle's log lines can be grouped in
/// the log backend without trace-aware tooling.
#[derive(Debug)]
pub struct LogCorrelationProcessor<P: LogProcessor> {
    inner: P,
}

impl<P: LogProcessor> LogCorrelationProcessor<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

fn correlation_ids(record: &LogRecord) -> Option<(String, String)> {
    if let Some(tc) = record.trace_context.as_ref() {
        return Some((tc.trace_id.to_string(), tc.span_id.to_string()));
    }

    let context = Span::current().context();
    let span = context.span();
    let span_context = span.span_context();
    span_context
        .is_valid()
        .then(|| (span_context.trace_id().to_string(), span_context.span_id().to_string()))
}

impl<P: LogProcessor> LogProcessor for LogCorrelationProcessor<P> {
    fn emit(&self, record: &mut LogRecord, instrumentation: &InstrumentationScope) {
        if let Some((trace_id, span_id)) = correlation_ids(record) {
            LogRecordTrait::add_attribute(record, Key::new("trace_id"), AnyValue::String(trace_id.into()));
            LogRecordTrait::add_attribute(record, Key::new("span_id"), AnyValue::String(span_id.into()));
        }
        self.inner.emit(record, instrumentation);
    }

    fn force_flush(&self) -> LogResult<()> {
        self.inner.force_flush()
    }

    fn shutdown(&self) -> LogResult<()> {
        self.inner.shutdown()
    }

    fn set_resource(&self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}
