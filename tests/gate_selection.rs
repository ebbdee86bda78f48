use std::collections::BTreeSet;

use workgate::errors::WorkgateError;
use workgate::gate::{Classifier, GateProfile, GateSelector, ProfileTable, WorkType};

#[test]
fn files_are_classified_by_the_first_matching_rule() {
    let classifier = Classifier::builtin().unwrap();
    let cases = [
        ("src/orders/service.rs", WorkType::ApplicationCode),
        ("tests/orders.rs", WorkType::TestCode),
        ("pkg/orders_test.go", WorkType::TestCode),
        ("web/cart.spec.tsx", WorkType::TestCode),
        ("deploy/main.tf", WorkType::Infrastructure),
        ("Dockerfile", WorkType::Infrastructure),
        ("db/migrations/0042_add_index.sql", WorkType::SchemaMigration),
        ("prisma/schema.prisma", WorkType::SchemaMigration),
        (".github/workflows/ci.yml", WorkType::PipelineConfig),
        ("Jenkinsfile", WorkType::PipelineConfig),
        ("README.md", WorkType::Documentation),
        ("docs/guide/intro.txt", WorkType::Documentation),
        // Pipeline rules outrank the documentation extension.
        (".github/workflows/README.md", WorkType::PipelineConfig),
        // Migrations outrank tests.
        ("tests/migrations/seed.sql", WorkType::SchemaMigration),
    ];

    for (path, expected) in cases {
        assert_eq!(classifier.classify_file(path), expected, "{path}");
    }
}

#[test]
fn empty_changeset_is_application_code() {
    let classifier = Classifier::builtin().unwrap();
    let none: [&str; 0] = [];
    assert_eq!(
        classifier.classify(&none),
        BTreeSet::from([WorkType::ApplicationCode])
    );
}

#[test]
fn work_type_names_parse_back() {
    for wt in WorkType::ALL {
        assert_eq!(wt.as_str().parse::<WorkType>(), Ok(wt));
    }
    assert!("frontend".parse::<WorkType>().is_err());
}

#[test]
fn mixed_changeset_gets_the_union_of_profiles() {
    let selector = GateSelector::builtin().unwrap();
    let (types, profile) = selector
        .select(&["src/api.rs", "deploy/main.tf", "README.md"])
        .unwrap();

    assert_eq!(
        types,
        BTreeSet::from([
            WorkType::ApplicationCode,
            WorkType::Infrastructure,
            WorkType::Documentation,
        ])
    );

    // Every gate any contributing profile requires.
    let table = selector.table();
    for wt in &types {
        for gate in table.profile(*wt).unwrap().gates() {
            assert!(profile.gates().any(|g| g == gate), "missing {gate}");
        }
    }

    assert_eq!(profile.gate1, vec!["test-execution", "infra-validation"]);
    assert_eq!(
        profile.gate2,
        vec!["code-review", "security-scan", "doc-review"]
    );
    assert_eq!(profile.retry_limit("test-execution", 9), 3);
    assert_eq!(profile.retry_limit("infra-validation", 9), 2);
    assert_eq!(profile.retry_limit("doc-review", 9), 1);
}

#[test]
fn a_gate_blocking_anywhere_stays_blocking_in_the_union() {
    let a = GateProfile::new(["lint"], ["review"], []);
    let b = GateProfile::new(["review"], Vec::<&str>::new(), []);

    let union = GateProfile::union([&a, &b]).unwrap();
    assert_eq!(union.gate1, vec!["lint", "review"]);
    assert!(union.gate2.is_empty());
    assert!(union.is_blocking("review"));
}

#[test]
fn disagreeing_retry_limits_conflict() {
    let a = GateProfile::new(["test-execution"], Vec::<&str>::new(), [("test-execution", 3)]);
    let b = GateProfile::new(["test-execution"], Vec::<&str>::new(), [("test-execution", 1)]);

    match GateProfile::union([&a, &b]) {
        Err(WorkgateError::ProfileConflict {
            gate,
            first,
            second,
        }) => {
            assert_eq!(gate, "test-execution");
            assert_eq!((first, second), (3, 1));
        }
        other => panic!("Expected ProfileConflict, got {other:?}"),
    }
}

#[test]
fn builtin_table_is_conflict_free() {
    let table = ProfileTable::builtin();
    table.validate().unwrap();
    assert_eq!(table.default_retry_limit(), 1);
    assert!(table.gate_names().contains("migration-check"));

    let docs = table.profile(WorkType::Documentation).unwrap();
    assert!(docs.gate1.is_empty());
    assert_eq!(docs.gate2, vec!["doc-review"]);
}
