use std::io::Write;

use tempfile::NamedTempFile;
use workgate::config::{load_and_validate, load_or_default, validate_runnable};
use workgate::engine::OrchestratorOptions;
use workgate::errors::WorkgateError;
use workgate::gate::{GateProfile, WorkType};
use workgate_test_utils::ConfigFileBuilder;

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{text}").unwrap();
    file
}

#[test]
fn full_config_is_loaded_and_merged() {
    let file = write_config(
        r#"
[config]
plan_dir = "plans"
max_parallel = 3
worker_retry_limit = 1
default_gate_retry_limit = 2
quality_targets = ["coverage >= 80%"]

[worker]
cmd = "agent --json"

[gate.test-execution]
cmd = "run-tests"

[profile.documentation]
gate1 = ["spellcheck"]
gate2 = ["doc-review"]
retry_limits = { spellcheck = 4, doc-review = 1 }
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.config.plan_dir.to_str(), Some("plans"));
    assert_eq!(cfg.config.max_parallel, 3);
    assert_eq!(cfg.worker.as_ref().unwrap().cmd, "agent --json");
    assert_eq!(
        cfg.worker.as_ref().unwrap().restriction,
        "only modify files inside scopeFiles"
    );
    assert_eq!(cfg.gate_commands()["test-execution"], "run-tests");
    assert_eq!(cfg.profiles.default_retry_limit(), 2);

    let docs = cfg.profiles.profile(WorkType::Documentation).unwrap();
    assert_eq!(docs.gate1, vec!["spellcheck"]);
    // Untouched work types keep the built-in profile.
    assert_eq!(
        cfg.profiles.profile(WorkType::TestCode).unwrap().gate1,
        vec!["test-execution"]
    );

    let options = OrchestratorOptions::from_config(&cfg);
    assert_eq!(options.max_parallel, 3);
    assert_eq!(options.worker_retry_limit, 1);
    assert_eq!(options.quality_targets, vec!["coverage >= 80%"]);
}

#[test]
fn zero_max_parallel_is_rejected() {
    let file = write_config("[config]\nmax_parallel = 0\n");

    match load_and_validate(file.path()) {
        Err(WorkgateError::ConfigError(msg)) => assert!(msg.contains("max_parallel"), "{msg}"),
        other => panic!("Expected ConfigError, got {other:?}"),
    }
}

#[test]
fn invalid_toml_is_a_toml_error() {
    let file = write_config("[config\nmax_parallel = 2\n");
    assert!(matches!(
        load_and_validate(file.path()),
        Err(WorkgateError::TomlError(_))
    ));
}

#[test]
fn missing_explicit_config_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.toml");
    assert!(matches!(
        load_or_default(&path),
        Err(WorkgateError::IoError(_))
    ));
}

#[test]
fn unknown_work_type_in_profile_is_rejected() {
    let result = ConfigFileBuilder::new()
        .profile("frontend", GateProfile::new(["lint"], Vec::<&str>::new(), []))
        .try_build();

    match result {
        Err(WorkgateError::ConfigError(msg)) => assert!(msg.contains("frontend"), "{msg}"),
        other => panic!("Expected ConfigError, got {other:?}"),
    }
}

#[test]
fn gate_in_both_stages_is_rejected() {
    let result = ConfigFileBuilder::new()
        .profile(
            "application-code",
            GateProfile::new(["test-execution"], ["test-execution"], []),
        )
        .try_build();

    match result {
        Err(WorkgateError::ConfigError(msg)) => assert!(msg.contains("both"), "{msg}"),
        other => panic!("Expected ConfigError, got {other:?}"),
    }
}

#[test]
fn retry_limit_for_a_gate_the_profile_skips_is_rejected() {
    let result = ConfigFileBuilder::new()
        .profile(
            "documentation",
            GateProfile::new(Vec::<&str>::new(), ["doc-review"], [("lint", 2)]),
        )
        .try_build();
    assert!(matches!(result, Err(WorkgateError::ConfigError(_))));
}

#[test]
fn override_conflicting_with_another_profile_is_rejected() {
    // code-review is 2 in the built-in application-code profile.
    let result = ConfigFileBuilder::new()
        .profile(
            "documentation",
            GateProfile::new(Vec::<&str>::new(), ["code-review"], [("code-review", 5)]),
        )
        .try_build();

    match result {
        Err(WorkgateError::ProfileConflict { gate, .. }) => assert_eq!(gate, "code-review"),
        other => panic!("Expected ProfileConflict, got {other:?}"),
    }
}

#[test]
fn empty_commands_are_rejected() {
    let result = ConfigFileBuilder::new().worker("   ").try_build();
    assert!(matches!(result, Err(WorkgateError::ConfigError(_))));

    let result = ConfigFileBuilder::new().gate("code-review", "").try_build();
    assert!(matches!(result, Err(WorkgateError::ConfigError(_))));
}

#[test]
fn runnable_config_needs_a_worker_and_every_gate_command() {
    let no_worker = ConfigFileBuilder::new().build();
    assert!(matches!(
        validate_runnable(&no_worker),
        Err(WorkgateError::ConfigError(_))
    ));

    let missing_gates = ConfigFileBuilder::new()
        .worker("agent")
        .gate("test-execution", "run-tests")
        .build();
    match validate_runnable(&missing_gates) {
        Err(WorkgateError::ConfigError(msg)) => {
            assert!(msg.contains("code-review"), "{msg}");
            assert!(!msg.contains("\"test-execution\""), "{msg}");
        }
        other => panic!("Expected ConfigError, got {other:?}"),
    }

    let mut complete = ConfigFileBuilder::new().worker("agent");
    for gate in workgate::gate::ProfileTable::builtin().gate_names() {
        complete = complete.gate(&gate, "run-gate");
    }
    validate_runnable(&complete.build()).unwrap();
}
