use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;
use workgate::gate::{GateOutcome, GateProfile, GateRunner, GateState, Stage};
use workgate::plan::FailureKind;
use workgate_test_utils::{fail_report, init_tracing, pass_report, FakeGates};

fn files(paths: &[&str]) -> BTreeSet<String> {
    paths.iter().map(|p| p.to_string()).collect()
}

fn app_profile() -> GateProfile {
    GateProfile::new(
        ["test-execution"],
        ["code-review", "security-scan"],
        [("test-execution", 3), ("code-review", 2), ("security-scan", 1)],
    )
}

#[tokio::test]
async fn blocking_failure_stops_the_round() {
    init_tracing();
    let gates = FakeGates::new();
    gates.script("test-execution", fail_report("test-execution", &["assertion failed"]));
    let runner = GateRunner::new(Arc::new(gates.clone()), 1);
    let mut state = GateState::new();
    let scope = files(&["src/a.rs"]);

    let round = runner
        .run_round("a", &app_profile(), &mut state, &scope, &scope)
        .await
        .unwrap();

    assert_eq!(
        round.outcome,
        GateOutcome::Redispatch {
            stage: Stage::Blocking,
            issues: vec!["assertion failed".to_string()],
        }
    );
    // The parallel stage never started.
    assert_eq!(gates.invoked_gates(), vec!["test-execution"]);
    assert_eq!(round.results.len(), 1);
    assert_eq!(round.results[0].attempt_number, 1);
    assert_eq!(round.results[0].observed_files, scope);
}

#[tokio::test]
async fn parallel_gates_run_concurrently_and_merge_issues() {
    init_tracing();
    let gates = FakeGates::new().with_delay_ms(50);
    gates.script("code-review", fail_report("code-review", &["rename `x`", "shared"]));
    gates.script("security-scan", fail_report("security-scan", &["shared", "sql injection"]));
    let runner = GateRunner::new(Arc::new(gates.clone()), 1);
    let mut state = GateState::new();
    let scope = files(&["src/a.rs"]);

    let round = runner
        .run_round("a", &app_profile(), &mut state, &scope, &scope)
        .await
        .unwrap();

    assert_eq!(gates.peak_concurrency(), 2);
    let names: Vec<&str> = round.results.iter().map(|r| r.gate_name.as_str()).collect();
    assert_eq!(names, vec!["test-execution", "code-review", "security-scan"]);
    assert_eq!(
        round.outcome,
        GateOutcome::Redispatch {
            stage: Stage::Parallel,
            issues: vec![
                "rename `x`".to_string(),
                "shared".to_string(),
                "sql injection".to_string(),
            ],
        }
    );
}

#[tokio::test]
async fn clean_gates_are_not_run_again() {
    init_tracing();
    let gates = FakeGates::new();
    let runner = GateRunner::new(Arc::new(gates.clone()), 1);
    let mut state = GateState::new();
    let scope = files(&["src/a.rs"]);

    let first = runner
        .run_round("a", &app_profile(), &mut state, &scope, &scope)
        .await
        .unwrap();
    assert_eq!(first.outcome, GateOutcome::Passed);
    assert_eq!(gates.invocations().len(), 3);

    // Nothing changed since the passes.
    let second = runner
        .run_round("a", &app_profile(), &mut state, &scope, &BTreeSet::new())
        .await
        .unwrap();
    assert_eq!(second.outcome, GateOutcome::Passed);
    assert!(second.results.is_empty());
    assert_eq!(
        second.skipped,
        vec!["test-execution", "code-review", "security-scan"]
    );
    assert_eq!(gates.invocations().len(), 3);

    // A change outside what the gates observed keeps them clean too.
    let third = runner
        .run_round("a", &app_profile(), &mut state, &scope, &files(&["docs/notes.txt"]))
        .await
        .unwrap();
    assert!(third.results.is_empty());
    assert_eq!(gates.invocations().len(), 3);

    // Touching an observed file invalidates every pass.
    let fourth = runner
        .run_round("a", &app_profile(), &mut state, &scope, &files(&["src/a.rs"]))
        .await
        .unwrap();
    assert_eq!(fourth.results.len(), 3);
    assert_eq!(gates.invocations().len(), 6);
    assert_eq!(gates.invocations()[3].attempt, 2);
}

#[tokio::test]
async fn blocking_gate_with_limit_one_escalates_after_one_retry() {
    init_tracing();
    let gates = FakeGates::new();
    gates.script("test-execution", fail_report("test-execution", &["first failure"]));
    gates.script("test-execution", fail_report("test-execution", &["second failure"]));
    let profile = GateProfile::new(["test-execution"], Vec::<&str>::new(), [("test-execution", 1)]);
    let runner = GateRunner::new(Arc::new(gates.clone()), 1);
    let mut state = GateState::new();
    let scope = files(&["src/a.rs"]);

    let first = runner
        .run_round("a", &profile, &mut state, &scope, &scope)
        .await
        .unwrap();
    assert!(matches!(first.outcome, GateOutcome::Redispatch { .. }));

    let second = runner
        .run_round("a", &profile, &mut state, &scope, &scope)
        .await
        .unwrap();
    match second.outcome {
        GateOutcome::Exhausted(record) => {
            assert_eq!(record.kind, FailureKind::RetryExhausted);
            assert_eq!(record.gate.as_deref(), Some("test-execution"));
            assert_eq!(
                record.history,
                vec![
                    vec!["first failure".to_string()],
                    vec!["second failure".to_string()],
                ]
            );
        }
        other => panic!("Expected Exhausted, got {other:?}"),
    }
    assert_eq!(gates.invocation_count("test-execution"), 2);
}

#[tokio::test]
async fn exhaustion_is_seeded_from_persisted_history() {
    init_tracing();
    let gates = FakeGates::new();
    gates.script("test-execution", fail_report("test-execution", &["broken"]));
    gates.script("test-execution", fail_report("test-execution", &["still broken"]));
    let profile = GateProfile::new(["test-execution"], Vec::<&str>::new(), [("test-execution", 1)]);
    let runner = GateRunner::new(Arc::new(gates.clone()), 1);
    let scope = files(&["src/a.rs"]);

    let mut state = GateState::new();
    let first = runner
        .run_round("a", &profile, &mut state, &scope, &scope)
        .await
        .unwrap();

    // A restarted run rebuilds the state from the stored results.
    let mut restored = GateState::from_history(&first.results);
    assert_eq!(restored.attempts("test-execution"), 1);
    let second = runner
        .run_round("a", &profile, &mut restored, &scope, &scope)
        .await
        .unwrap();
    assert!(matches!(second.outcome, GateOutcome::Exhausted(_)));
}

#[tokio::test]
async fn malformed_report_is_retried_once() {
    init_tracing();
    let gates = FakeGates::new();
    gates.script("test-execution", json!({ "verdict": "looks fine" }));
    let runner = GateRunner::new(Arc::new(gates.clone()), 1);
    let mut state = GateState::new();
    let scope = files(&["src/a.rs"]);

    let round = runner
        .run_round("a", &app_profile(), &mut state, &scope, &scope)
        .await
        .unwrap();

    assert_eq!(round.outcome, GateOutcome::Passed);
    assert_eq!(gates.invocation_count("test-execution"), 2);
}

#[tokio::test]
async fn repeated_malformed_report_escalates() {
    init_tracing();
    let gates = FakeGates::new();
    gates.script("code-review", json!("LGTM"));
    gates.script("code-review", pass_report("security-scan"));
    let runner = GateRunner::new(Arc::new(gates.clone()), 1);
    let mut state = GateState::new();
    let scope = files(&["src/a.rs"]);

    let round = runner
        .run_round("a", &app_profile(), &mut state, &scope, &scope)
        .await
        .unwrap();

    match round.outcome {
        GateOutcome::Exhausted(record) => {
            assert_eq!(record.kind, FailureKind::ValidationError);
            assert_eq!(record.gate.as_deref(), Some("code-review"));
            assert!(record.reason.contains("answered as 'security-scan'"), "{}", record.reason);
        }
        other => panic!("Expected Exhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn unparsable_gate_output_is_retried_like_a_malformed_report() {
    init_tracing();
    let gates = FakeGates::new();
    gates.script_malformed("test-execution", "Traceback (most recent call last)");
    let runner = GateRunner::new(Arc::new(gates.clone()), 1);
    let mut state = GateState::new();
    let scope = files(&["src/a.rs"]);

    let round = runner
        .run_round("a", &app_profile(), &mut state, &scope, &scope)
        .await
        .unwrap();

    assert_eq!(round.outcome, GateOutcome::Passed);
    assert_eq!(gates.invocation_count("test-execution"), 2);
    // The retry is part of the same attempt, not a spent retry.
    assert!(state.failure_history("test-execution").is_empty());
}

#[tokio::test]
async fn repeated_unparsable_gate_output_escalates_as_validation_error() {
    init_tracing();
    let gates = FakeGates::new();
    gates.script_malformed("test-execution", "segfault");
    gates.script_malformed("test-execution", "segfault");
    let runner = GateRunner::new(Arc::new(gates.clone()), 1);
    let mut state = GateState::new();
    let scope = files(&["src/a.rs"]);

    let round = runner
        .run_round("a", &app_profile(), &mut state, &scope, &scope)
        .await
        .unwrap();

    match round.outcome {
        GateOutcome::Exhausted(record) => {
            assert_eq!(record.kind, FailureKind::ValidationError);
            assert_eq!(record.gate.as_deref(), Some("test-execution"));
            assert!(record.reason.contains("printed no JSON report"), "{}", record.reason);
        }
        other => panic!("Expected Exhausted, got {other:?}"),
    }
    assert_eq!(gates.invoked_gates(), vec!["test-execution", "test-execution"]);
}

#[tokio::test]
async fn gate_that_cannot_run_counts_as_a_failed_attempt() {
    init_tracing();
    let gates = FakeGates::new();
    gates.script_error("test-execution", "agent unreachable");
    let runner = GateRunner::new(Arc::new(gates.clone()), 1);
    let mut state = GateState::new();
    let scope = files(&["src/a.rs"]);

    let round = runner
        .run_round("a", &app_profile(), &mut state, &scope, &scope)
        .await
        .unwrap();

    match round.outcome {
        GateOutcome::Redispatch { stage, issues } => {
            assert_eq!(stage, Stage::Blocking);
            assert_eq!(
                issues,
                vec!["gate 'test-execution' could not run: agent unreachable".to_string()]
            );
        }
        other => panic!("Expected Redispatch, got {other:?}"),
    }
    assert_eq!(gates.invocation_count("test-execution"), 1);
}

#[tokio::test]
async fn failing_report_without_issues_still_explains_itself() {
    init_tracing();
    let gates = FakeGates::new();
    gates.script("test-execution", fail_report("test-execution", &[]));
    let runner = GateRunner::new(Arc::new(gates.clone()), 1);
    let mut state = GateState::new();
    let scope = files(&["src/a.rs"]);

    let round = runner
        .run_round("a", &app_profile(), &mut state, &scope, &scope)
        .await
        .unwrap();

    assert!(!round.results[0].passed);
    assert_eq!(round.results[0].blocking_issues.len(), 1);
    assert!(matches!(round.outcome, GateOutcome::Redispatch { .. }));
}

#[test]
fn pass_without_observed_files_is_always_dirty() {
    let mut state = GateState::new();
    state.record(&workgate::plan::GateResult {
        gate_name: "doc-review".to_string(),
        passed: true,
        blocking_issues: Vec::new(),
        metrics: Default::default(),
        attempt_number: 1,
        observed_files: BTreeSet::new(),
    });

    assert!(state.is_clean("doc-review", &BTreeSet::new()));
    assert!(!state.is_clean("doc-review", &files(&["README.md"])));
    assert!(!state.is_clean("never-ran", &BTreeSet::new()));
}
