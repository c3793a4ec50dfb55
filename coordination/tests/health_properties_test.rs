//! Health, classification and ranking properties checked over many inputs.

mod common;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};

use chorus_coordination::config::{DispatchConfig, GenerationOptions, HealthPolicy};
use chorus_coordination::dispatch::{batch_count, Dispatcher, JobPlanner};
use chorus_coordination::ensemble::ResponseEvaluator;
use chorus_coordination::registry::WorkerCatalog;
use chorus_coordination::router::{FailureVerdict, HealthMonitor, TaskClassifier};
use chorus_coordination::state::{Candidate, TaskClassification};

use common::{plain_catalog, sorting_catalog, Behavior, ScriptedBackend};

fn policy(threshold: u32, quarantine_ms: u64) -> HealthPolicy {
    HealthPolicy {
        failure_threshold: threshold,
        quarantine_ms,
        ..HealthPolicy::default()
    }
}

// ── Blacklist has no time-based recovery ───────────────────────────

#[test]
fn test_blacklist_survives_any_amount_of_time() {
    for threshold in 1..=5u32 {
        let mut health = HealthMonitor::new(policy(threshold, 60_000));
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let mut verdict = None;
        for i in 0..threshold {
            verdict = Some(health.record_failure_at("w", "boom", t0 + ChronoDuration::seconds(i as i64)));
        }
        assert_eq!(
            verdict,
            Some(FailureVerdict::Blacklisted { failures: threshold })
        );

        for days in [0, 1, 30, 365] {
            let later = t0 + ChronoDuration::days(days);
            health.sweep_at(later);
            assert!(!health.is_usable_at("w", later), "threshold {threshold}, day {days}");
        }

        health.reset();
        assert!(health.is_usable_at("w", t0));
    }
}

#[test]
fn test_rehabilitate_clears_blacklist() {
    let mut health = HealthMonitor::new(policy(2, 60_000));
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    health.record_failure_at("w", "boom", t0);
    health.record_failure_at("w", "boom", t0);
    assert!(health.is_blacklisted("w"));
    assert!(health.rehabilitate_at("w", t0));
    assert!(health.is_usable_at("w", t0));
    assert_eq!(health.failure_count("w"), 0);
}

// ── Quarantine expires exactly at T + W ────────────────────────────

#[test]
fn test_quarantine_window_boundaries() {
    for window_ms in [1_000u64, 30_000, 300_000] {
        let mut health = HealthMonitor::new(policy(3, window_ms));
        let t = Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap();
        let window = ChronoDuration::milliseconds(window_ms as i64);

        match health.record_failure_at("w", "timeout", t) {
            FailureVerdict::Quarantined { until, failures } => {
                assert_eq!(until, t + window);
                assert_eq!(failures, 1);
            }
            other => panic!("expected quarantine, got {other:?}"),
        }

        for offset_ms in [0, 1, window_ms as i64 / 2, window_ms as i64 - 1] {
            let probe = t + ChronoDuration::milliseconds(offset_ms);
            assert!(!health.is_usable_at("w", probe), "window {window_ms}, +{offset_ms}ms");
        }
        assert!(health.is_usable_at("w", t + window));
        assert!(health.is_usable_at("w", t + window + ChronoDuration::hours(1)));
    }
}

#[test]
fn test_success_clears_quarantine() {
    let mut health = HealthMonitor::new(policy(3, 60_000));
    let t = Utc::now();
    health.record_failure_at("w", "timeout", t);
    health.record_success("w");
    assert!(health.is_usable_at("w", t));
    assert_eq!(health.failure_count("w"), 0);
}

// ── Classification is idempotent ───────────────────────────────────

#[test]
fn test_classify_twice_gives_same_answer() {
    let classifier = TaskClassifier::default();
    let catalogs = [sorting_catalog(), WorkerCatalog::default_catalog(), plain_catalog(4)];
    let prompts = [
        "how do I sort a list in order",
        "write me a poem about the sea",
        "translate hello into French",
        "",
        "!!! ???",
    ];
    for catalog in &catalogs {
        for prompt in prompts {
            let first = classifier.classify(prompt, catalog);
            let second = classifier.classify(prompt, catalog);
            assert_eq!(first.domain, second.domain);
            assert_eq!(first.confidence, second.confidence);
            assert!((0.0..=1.0).contains(&first.confidence));
        }
    }
}

// ── Ranking is non-increasing ──────────────────────────────────────

#[test]
fn test_rank_orders_by_final_score() {
    let catalog = plain_catalog(6);
    let evaluator = ResponseEvaluator::default();
    let texts = [
        "Short.",
        "A longer answer that explains the method step by step with an example.",
        "First, gather the data. Second, sort it. Finally, verify the output carefully.",
        "",
        "Yes",
        "The answer depends on context; for lists use sorted, for arrays use numpy.sort.",
    ];
    let mut candidates: Vec<Candidate> = texts
        .iter()
        .enumerate()
        .map(|(i, t)| Candidate::success(format!("w{i}"), *t, 10 * i as u64))
        .collect();
    evaluator.evaluate_all(
        &mut candidates,
        "how do I sort data",
        &TaskClassification::general(),
        &catalog,
    );
    for c in candidates.iter_mut() {
        evaluator.finalize(c);
    }
    ResponseEvaluator::rank(&mut candidates, &catalog);

    for pair in candidates.windows(2) {
        assert!(pair[0].final_score >= pair[1].final_score);
    }
}

// ── Dispatcher batching invariant ──────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_batches_are_ceil_k_over_m() {
    for (k, m) in [(1usize, 3usize), (3, 3), (4, 3), (7, 2), (6, 1)] {
        let catalog = plain_catalog(k);
        let behaviors: Vec<(String, Behavior)> = catalog
            .ids()
            .into_iter()
            .map(|id| (id, Behavior::reply("ok")))
            .collect();
        let borrowed: Vec<(&str, Behavior)> =
            behaviors.iter().map(|(id, b)| (id.as_str(), b.clone())).collect();
        let backend = ScriptedBackend::new(&borrowed);

        let config = DispatchConfig {
            max_concurrency: m,
            cooldown_ms: 500,
            ..DispatchConfig::default()
        };
        let planner = JobPlanner::new(
            std::sync::Arc::new(catalog.clone()),
            config.clone(),
            &GenerationOptions::default(),
        );
        let dispatcher = Dispatcher::new(backend.clone(), config);
        let jobs = catalog
            .ids()
            .iter()
            .map(|id| planner.plan(id, "q".to_string(), None, true))
            .collect();

        let start = tokio::time::Instant::now();
        let outcomes = dispatcher.run_jobs(jobs).await;
        let elapsed = start.elapsed();

        let batches = batch_count(k, m);
        assert_eq!(batches, k.div_ceil(m));
        assert_eq!(outcomes.len(), k);
        assert!(outcomes.iter().all(|o| o.is_success()));

        let starts: std::collections::BTreeSet<_> =
            backend.calls().iter().map(|c| c.started).collect();
        assert_eq!(starts.len(), batches, "k={k} m={m}");
        assert!(elapsed >= std::time::Duration::from_millis(500 * (batches as u64 - 1)));
    }
}
