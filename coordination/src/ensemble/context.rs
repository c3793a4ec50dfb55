//! Contracts with the code around the engine
//!
//! A [`ContextProvider`] turns the user's message into an opaque context
//! blob prepended to the prompt; a [`ResponseSink`] receives every
//! completed run. The engine imposes no schema on either.

use async_trait::async_trait;

use crate::state::RunResult;

/// Supplies the context text for a user message.
///
/// Providers that cannot produce context return an empty string; blank
/// context is dropped before dispatch.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn get_context(&self, message: &str) -> String;
}

/// Consumes the final result of each run.
pub trait ResponseSink: Send + Sync {
    fn deliver(&self, result: &RunResult);
}

/// Provider that never adds context
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContext;

#[async_trait]
impl ContextProvider for NoContext {
    async fn get_context(&self, _message: &str) -> String {
        String::new()
    }
}

/// Provider that returns the same text for every message
#[derive(Debug, Clone, Default)]
pub struct StaticContext(pub String);

#[async_trait]
impl ContextProvider for StaticContext {
    async fn get_context(&self, _message: &str) -> String {
        self.0.clone()
    }
}

/// Sink that discards results
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl ResponseSink for DiscardSink {
    fn deliver(&self, _result: &RunResult) {}
}
