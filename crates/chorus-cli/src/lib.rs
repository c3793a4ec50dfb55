//! Runner support for the `chorus` binary: configuration loading, a
//! file-backed context provider and the JSONL telemetry sink.

pub mod config;
pub mod context;
pub mod telemetry;
