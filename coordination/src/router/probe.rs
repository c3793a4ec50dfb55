//! Health probes with in-flight de-duplication.
//!
//! A probe is a tiny generation request ("Hi", a few tokens, low
//! temperature) sent under a short timeout. Concurrent probe requests for
//! the same worker share one in-flight future instead of each hitting the
//! backend.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::{
    BackendError, BackendResult, GenerationRequest, GenerationResponse, InferenceBackend,
    RequestOptions,
};
use crate::config::GenerationOptions;

const PROBE_PROMPT: &str = "Hi";

type ProbeFuture = Shared<BoxFuture<'static, bool>>;

/// Minimal generation request used to check a worker is alive
pub fn probe_request(worker: &str, options: &GenerationOptions) -> GenerationRequest {
    GenerationRequest::new(
        worker,
        PROBE_PROMPT,
        RequestOptions {
            temperature: options.probe_temperature,
            top_p: options.top_p,
            max_tokens: options.probe_max_tokens,
            thread_hint: options.thread_hint,
        },
    )
}

/// Send one request under a timeout, mapping elapsed time to [`BackendError::Timeout`]
pub async fn call_with_timeout(
    backend: &dyn InferenceBackend,
    request: &GenerationRequest,
    timeout: Duration,
) -> BackendResult<GenerationResponse> {
    match tokio::time::timeout(timeout, backend.generate(request)).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(timeout)),
    }
}

/// Collapses concurrent probes of one worker into a single future.
#[derive(Default)]
pub struct ProbeGate {
    in_flight: Mutex<HashMap<String, ProbeFuture>>,
}

impl ProbeGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `start()` unless a probe of `worker` is already running, in
    /// which case await that one instead.
    pub async fn probe<F>(&self, worker: &str, start: F) -> bool
    where
        F: FnOnce() -> BoxFuture<'static, bool>,
    {
        let future = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(worker) {
                Some(existing) => {
                    debug!(worker, "joining in-flight probe");
                    existing.clone()
                }
                None => {
                    let shared = start().shared();
                    in_flight.insert(worker.to_string(), shared.clone());
                    shared
                }
            }
        };

        let healthy = future.clone().await;

        let mut in_flight = self.in_flight.lock().await;
        if in_flight
            .get(worker)
            .is_some_and(|current| current.ptr_eq(&future))
        {
            in_flight.remove(worker);
        }
        healthy
    }

    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_probes_collapse() {
        let gate = Arc::new(ProbeGate::new());
        let started = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = gate.clone();
            let started = started.clone();
            handles.push(tokio::spawn(async move {
                gate.probe("phi3:latest", move || {
                    async move {
                        started.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        true
                    }
                    .boxed()
                })
                .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(gate.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_sequential_probes_run_again() {
        let gate = ProbeGate::new();
        let started = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let started = started.clone();
            gate.probe("phi3:latest", move || {
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    false
                }
                .boxed()
            })
            .await;
        }
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_probe_request_is_tiny() {
        let r = probe_request("phi3:latest", &GenerationOptions::default());
        assert_eq!(r.prompt, "Hi");
        assert_eq!(r.options.max_tokens, 3);
        assert!((r.options.temperature - 0.1).abs() < f32::EPSILON);
    }
}
