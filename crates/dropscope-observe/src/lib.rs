//! Observability setup for DropScope: structured logging with optional
//! OpenTelemetry span export.

pub mod tracing_setup;
