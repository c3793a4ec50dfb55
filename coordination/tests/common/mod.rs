//! Scripted in-process backend shared by the integration tests.
//!
//! Each worker gets a [`Behavior`]; collaboration passes are recognised by
//! their prompt text so review, refinement and synthesis calls get
//! plausible answers without any network.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chorus_coordination::backend::{
    BackendError, BackendResult, GenerationRequest, GenerationResponse, InferenceBackend,
};
use chorus_coordination::registry::{ExpertiseProfile, ResourceClass, Worker, WorkerCatalog};
use chorus_coordination::state::BackendHealth;
use tokio::time::Instant;

pub const CRITIQUE: &str = "STRENGTHS: clear and correct explanation of the approach. \
     WEAKNESSES: missing a concrete example. \
     SUGGESTIONS: add an example showing the call.";

#[derive(Debug, Clone)]
pub enum Behavior {
    /// Answer with this text after the delay
    Reply(String, Duration),
    /// Fail immediately with a 500
    Fail,
    /// Never answer within any timeout
    Hang,
}

impl Behavior {
    pub fn reply(text: &str) -> Self {
        Self::Reply(text.to_string(), Duration::from_millis(50))
    }
}

/// One recorded generation call
#[derive(Debug, Clone)]
pub struct Call {
    pub worker: String,
    pub prompt: String,
    pub context: Option<String>,
    pub started: Instant,
}

pub struct ScriptedBackend {
    behaviors: Mutex<HashMap<String, Behavior>>,
    calls: Mutex<Vec<Call>>,
    health_checks: AtomicUsize,
    healthy: AtomicBool,
    fail_synthesis: AtomicBool,
}

impl ScriptedBackend {
    pub fn new(behaviors: &[(&str, Behavior)]) -> Arc<Self> {
        Arc::new(Self {
            behaviors: Mutex::new(
                behaviors
                    .iter()
                    .map(|(id, b)| (id.to_string(), b.clone()))
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
            health_checks: AtomicUsize::new(0),
            healthy: AtomicBool::new(true),
            fail_synthesis: AtomicBool::new(false),
        })
    }

    pub fn set_behavior(&self, worker: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(worker.to_string(), behavior);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn fail_synthesis(&self) {
        self.fail_synthesis.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, worker: &str) -> usize {
        self.calls().iter().filter(|c| c.worker == worker).count()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
        self.health_checks.store(0, Ordering::SeqCst);
    }
}

pub fn is_review(prompt: &str) -> bool {
    prompt.contains("critically review")
}

pub fn is_refinement(prompt: &str) -> bool {
    prompt.contains("improve your original answer")
}

pub fn is_synthesis(prompt: &str) -> bool {
    prompt.contains("IMPROVED FINAL ANSWER:")
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn generate(&self, request: &GenerationRequest) -> BackendResult<GenerationResponse> {
        self.calls.lock().unwrap().push(Call {
            worker: request.worker.clone(),
            prompt: request.prompt.clone(),
            context: request.context.clone(),
            started: Instant::now(),
        });
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&request.worker)
            .cloned()
            .unwrap_or(Behavior::Fail);

        let (base, delay) = match behavior {
            Behavior::Fail => {
                return Err(BackendError::Status {
                    status: 500,
                    body: "model not loaded".into(),
                })
            }
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                return Err(BackendError::Request("hung".into()));
            }
            Behavior::Reply(text, delay) => (text, delay),
        };
        tokio::time::sleep(delay).await;

        let prompt = request.prompt.as_str();
        let text = if is_review(prompt) {
            CRITIQUE.to_string()
        } else if is_refinement(prompt) {
            format!("{base} For example, call sorted(items) to get a new ordered list.")
        } else if is_synthesis(prompt) {
            if self.fail_synthesis.load(Ordering::SeqCst) {
                return Err(BackendError::Request("connection reset".into()));
            }
            "Combined answer: use sorted() for a new list or list.sort() in place.".to_string()
        } else {
            base
        };
        Ok(GenerationResponse {
            text,
            raw_latency_ms: delay.as_millis() as u64,
        })
    }

    async fn health(&self) -> BackendHealth {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            BackendHealth {
                healthy: true,
                worker_count: self.behaviors.lock().unwrap().len(),
                error: None,
            }
        } else {
            BackendHealth {
                healthy: false,
                worker_count: 0,
                error: Some("connection refused".into()),
            }
        }
    }
}

/// Three workers: a generalist, a programming specialist and a light helper
pub fn sorting_catalog() -> WorkerCatalog {
    WorkerCatalog::new(vec![
        Worker::new("chat", ResourceClass::Medium, 1).with_expertise(ExpertiseProfile::new(
            &["general", "conversation"],
            &["hello", "chat"],
            0.6,
        )),
        Worker::new("coder", ResourceClass::Large, 3).with_expertise(ExpertiseProfile::new(
            &["programming"],
            &["sort", "list", "function"],
            0.9,
        )),
        Worker::new("helper", ResourceClass::Light, 2).with_expertise(ExpertiseProfile::new(
            &["programming"],
            &["order", "code"],
            0.5,
        )),
    ])
    .unwrap()
}

/// `n` workers with no declared expertise, named w0..wn
pub fn plain_catalog(n: usize) -> WorkerCatalog {
    WorkerCatalog::new(
        (0..n)
            .map(|i| Worker::new(format!("w{i}"), ResourceClass::Light, i as u32 + 1))
            .collect(),
    )
    .unwrap()
}

pub fn sorting_answers() -> Vec<(&'static str, Behavior)> {
    vec![
        (
            "chat",
            Behavior::reply(
                "You can sort a list with the sorted function, which returns a new list \
                 in ascending order.",
            ),
        ),
        (
            "coder",
            Behavior::reply(
                "Call list.sort() to order the list in place. Pass reverse=True for \
                 descending order and key=len to sort by length.",
            ),
        ),
        (
            "helper",
            Behavior::reply(
                "Python offers two options: sorted(items) builds a fresh ordered copy, \
                 while items.sort() mutates the original sequence.",
            ),
        ),
    ]
}
