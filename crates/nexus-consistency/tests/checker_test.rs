//! End-to-end consistency check tests
//!
//! Tests:
//! - Repeated checks report the same violations whatever the thread and shard layout
//! - Counts recomputed from records match counts maintained by the writer
//! - Pass selection through configuration
//! - Discarding and configured sinks, JSON lines export
//! - Storage failures abort the check

use nexus_consistency::config::{CheckConfig, ReporterMode};
use nexus_consistency::record::{
    CountsKey, EntityKind, IndexState, RecordCategory, SchemaDescriptor, TokenKind, Value,
};
use nexus_consistency::report::{
    CollectingSink, ConfiguredSink, CountsViolation, NoReport, ReportSink, Violation,
    ViolationRecord,
};
use nexus_consistency::store::{MemoryStore, StoreAccess, StoreFile};
use nexus_consistency::{ConsistencyChecker, Error, StopSignal};
use std::io::{BufRead, BufReader};

struct Graph {
    store: MemoryStore,
    person: u32,
    knows: u32,
    relationships: Vec<u64>,
}

fn social_graph() -> Graph {
    let store = MemoryStore::with_dense_threshold(5);
    let person = store.create_token(TokenKind::Label, "Person").unwrap();
    let admin = store.create_token(TokenKind::Label, "Admin").unwrap();
    let knows = store.create_token(TokenKind::RelationshipType, "KNOWS").unwrap();
    let likes = store.create_token(TokenKind::RelationshipType, "LIKES").unwrap();
    let name = store.create_token(TokenKind::PropertyKey, "name").unwrap();
    store
        .create_index("person_name", SchemaDescriptor::node(person, vec![name]))
        .unwrap();

    let nodes: Vec<u64> = (0..40)
        .map(|i| {
            let labels = if i % 7 == 0 { vec![person, admin] } else { vec![person] };
            let node = store.create_node(&labels).unwrap();
            store
                .set_property(EntityKind::Node, node, name, Value::String(format!("person-{i}")))
                .unwrap();
            node
        })
        .collect();

    let mut relationships = Vec::new();
    for (i, window) in nodes.windows(2).enumerate() {
        let rel_type = if i % 3 == 0 { likes } else { knows };
        relationships.push(store.create_relationship(window[0], window[1], rel_type).unwrap());
        relationships.push(store.create_relationship(nodes[0], window[1], knows).unwrap());
    }
    relationships.push(store.create_relationship(nodes[3], nodes[3], knows).unwrap());

    Graph {
        store,
        person,
        knows,
        relationships,
    }
}

/// Damage the graph in several independent ways
fn corrupt(graph: &Graph) {
    let store = &graph.store;
    store.delete_relationship(graph.relationships[4], false).unwrap();
    store.remove_index_entries(0, 11);
    store.remove_scan_document(EntityKind::Node, 12);
    store.set_count(CountsKey::Nodes { label: Some(graph.person) }, 3);

    let mut rel = store.relationship(graph.relationships[20]).unwrap();
    rel.source_next = graph.relationships[30];
    store.put_relationship(rel).unwrap();

    let mut node = store.node(25).unwrap();
    node.first_property = 10_000;
    store.put_node(node).unwrap();
}

fn sorted_json(sink: &CollectingSink) -> Vec<String> {
    let mut lines: Vec<String> = sink
        .export()
        .iter()
        .map(|record| serde_json::to_string(record).unwrap())
        .collect();
    lines.sort();
    lines
}

fn run(store: &MemoryStore, config: CheckConfig) -> CollectingSink {
    let sink = CollectingSink::new();
    let summary = ConsistencyChecker::new(store, config).check(&sink).unwrap();
    assert!(summary.completed);
    sink
}

#[test]
fn test_clean_graph_is_consistent() {
    let graph = social_graph();
    let sink = CollectingSink::new();
    let summary = ConsistencyChecker::new(&graph.store, CheckConfig::default())
        .check(&sink)
        .unwrap();

    assert!(sink.is_empty(), "unexpected: {:?}", sink.violations());
    assert!(summary.is_consistent());
    assert_eq!(summary.records_checked[&RecordCategory::Node], 40);
    assert_eq!(
        summary.records_checked[&RecordCategory::Relationship],
        graph.store.high_id(StoreFile::Relationships)
    );
    assert!(summary.records_checked[&RecordCategory::IndexEntry] >= 40);

    let admin_node = graph.store.node(7).unwrap();
    assert_eq!(admin_node.inline_labels().map(<[u32]>::len), Some(2));
}

#[test]
fn test_repeated_checks_agree() {
    let graph = social_graph();
    corrupt(&graph);

    let baseline = sorted_json(&run(&graph.store, CheckConfig::default()));
    assert!(!baseline.is_empty());

    for (threads, shard_size) in [(0, 1024), (1, 1), (2, 3), (4, 7), (8, 64)] {
        let config = CheckConfig {
            threads,
            shard_size,
            ..CheckConfig::default()
        };
        for _ in 0..3 {
            let found = sorted_json(&run(&graph.store, config.clone()));
            assert_eq!(found, baseline, "threads={threads} shard_size={shard_size}");
        }
    }
}

#[test]
fn test_summary_matches_sink() {
    let graph = social_graph();
    corrupt(&graph);

    let sink = CollectingSink::new();
    let summary = ConsistencyChecker::new(&graph.store, CheckConfig::default())
        .check(&sink)
        .unwrap();
    let report = sink.summary();

    assert!(!summary.is_consistent());
    assert_eq!(summary.errors, report.errors);
    assert_eq!(summary.warnings, report.warnings);
    assert_eq!(report.total(), sink.len() as u64);
}

#[test]
fn test_counts_follow_writes() {
    let graph = social_graph();
    let counts_only = CheckConfig {
        check_graph: false,
        check_indexes: false,
        check_token_scans: false,
        check_schema: false,
        ..CheckConfig::default()
    };
    assert!(run(&graph.store, counts_only.clone()).is_empty());

    let store = &graph.store;
    store.delete_relationship(graph.relationships[1], true).unwrap();
    store.delete_relationship(graph.relationships[2], true).unwrap();
    let extra = store.create_node(&[graph.person]).unwrap();
    store.create_relationship(extra, 0, graph.knows).unwrap();
    assert!(run(store, counts_only.clone()).is_empty());

    store.delete_relationship(graph.relationships[3], false).unwrap();
    let sink = run(store, counts_only);
    assert_eq!(sink.len(), 1);
    let found = &sink.violations()[0];
    assert_eq!(found.record.category, RecordCategory::CountsEntry);
    assert!(matches!(
        found.violation,
        Violation::Counts(CountsViolation::InconsistentRelationshipCount { expected, actual })
            if actual == expected + 1
    ));
}

#[test]
fn test_disabled_passes_stay_quiet() {
    let graph = social_graph();
    corrupt(&graph);

    let nothing = CheckConfig {
        check_graph: false,
        check_indexes: false,
        check_token_scans: false,
        check_counts: false,
        check_schema: false,
        ..CheckConfig::default()
    };
    let sink = run(&graph.store, nothing);
    assert!(sink.is_empty(), "unexpected: {:?}", sink.violations());

    let scans_only = CheckConfig {
        check_graph: false,
        check_indexes: false,
        check_counts: false,
        check_schema: false,
        ..CheckConfig::default()
    };
    let sink = run(&graph.store, scans_only);
    assert!(!sink.is_empty());
    assert!(sink.violations().iter().all(|v| matches!(
        v.violation,
        Violation::Node(_) | Violation::Relationship(_) | Violation::TokenScan(_)
    )));
}

#[test]
fn test_no_report_discards_everything() {
    let graph = social_graph();
    corrupt(&graph);

    let summary = ConsistencyChecker::new(&graph.store, CheckConfig::default())
        .check(&NoReport)
        .unwrap();
    assert!(summary.completed);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.warnings, 0);
}

#[test]
fn test_storage_failure_aborts() {
    let graph = social_graph();
    graph.store.fail_reads_of(StoreFile::Nodes, 17);

    let result = ConsistencyChecker::new(&graph.store, CheckConfig::default()).check(&NoReport);
    assert!(matches!(result, Err(Error::Storage(_))));

    graph.store.clear_failures();
    assert!(run(&graph.store, CheckConfig::default()).is_empty());
}

#[test]
fn test_configured_sink_and_json_lines() {
    let graph = social_graph();
    corrupt(&graph);

    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("check.toml");
    std::fs::write(
        &config_path,
        "threads = 2\nshard_size = 5\nreporter = \"collect\"\n",
    )
    .unwrap();
    let config = CheckConfig::from_file(&config_path).unwrap();
    assert_eq!(config.reporter, ReporterMode::Collect);

    let sink = ConfiguredSink::from_mode(config.reporter);
    let summary = ConsistencyChecker::new(&graph.store, config)
        .check(&sink)
        .unwrap();
    let collected = sink.collected().unwrap();
    assert_eq!(summary.errors + summary.warnings, collected.len() as u64);

    let exported = collected.export();
    let out_path = dir.path().join("violations.jsonl");
    let file = std::fs::File::create(&out_path).unwrap();
    ViolationRecord::write_json_lines(&exported, file).unwrap();

    let reader = BufReader::new(std::fs::File::open(&out_path).unwrap());
    let parsed: Vec<ViolationRecord> = reader
        .lines()
        .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
        .collect();
    assert_eq!(parsed, exported);

    let discard = ConfiguredSink::from_mode(ReporterMode::Discard);
    assert!(discard.collected().is_none());
}

#[test]
fn test_log_mode_counts_what_it_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("nexus_consistency=debug"))
        .with_test_writer()
        .try_init();

    let graph = social_graph();
    corrupt(&graph);
    let expected = run(&graph.store, CheckConfig::default()).summary();

    let sink = ConfiguredSink::from_mode(ReporterMode::Log);
    assert!(sink.collected().is_none());
    let summary = ConsistencyChecker::new(&graph.store, CheckConfig::default())
        .check(&sink)
        .unwrap();
    assert_eq!(summary.errors, expected.errors);
    assert_eq!(summary.warnings, expected.warnings);
}

#[test]
fn test_populating_index_is_only_a_warning() {
    let graph = social_graph();
    graph.store.remove_index_entries(0, 5);
    assert_eq!(run(&graph.store, CheckConfig::default()).count_of("not_indexed"), 1);

    graph.store.set_index_state(0, IndexState::Populating).unwrap();
    let sink = CollectingSink::new();
    let summary = ConsistencyChecker::new(&graph.store, CheckConfig::default())
        .check(&sink)
        .unwrap();
    assert_eq!(sink.len(), 1, "unexpected: {:?}", sink.violations());
    assert_eq!(sink.count_of("schema_rule_not_online"), 1);
    assert_eq!(summary.warnings, 1);
    assert!(summary.is_consistent());
}

#[test]
fn test_shared_stop_signal() {
    let graph = social_graph();
    let signal = StopSignal::new();
    let checker = ConsistencyChecker::new(&graph.store, CheckConfig::default())
        .with_stop_signal(signal.clone());
    assert!(!checker.stop_signal().is_stopped());

    signal.stop();
    assert!(checker.stop_signal().is_stopped());
    let summary = checker.check(&NoReport).unwrap();
    assert!(!summary.completed);
}
