//! Tests for report rendering and CSV export.

use mangoprof::analyzer::{AggregateState, report};

fn sample_state() -> AggregateState {
    let mut state = AggregateState::new();
    state.seed_index("people", "_id_");
    state.seed_index("people", "name_1");
    state.record_index_use("people", "name_1");
    state.record_index_use("orders", "total_-1");
    state.record_full_scan("audit.people {\"a\":1}".to_string(), 9_000);
    state.record_full_scan("audit.people {\"b\":2}".to_string(), 2_000);
    state.record_slow_sort("audit.orders {\"c\":3}".to_string(), 50 << 20);
    state.record_overfetch("audit.orders {\"d\":4}".to_string(), 7_500);
    state.record_unknown_operator("weird");
    state.record_unknown_command("[reIndex]".to_string());
    state.mark_summarized("legacy_events");
    state
}

fn render(state: &AggregateState, diagnostics: bool) -> String {
    let mut out = Vec::new();
    report::render(state, diagnostics, &mut out).expect("render failed");
    String::from_utf8(out).expect("report is valid UTF-8")
}

#[test]
fn test_report_contains_all_four_groupings() {
    let text = render(&sample_state(), false);
    assert!(text.contains("IN-MEMORY SORTS:"));
    assert!(text.contains("OVER-FETCHING INDEX SCANS:"));
    assert!(text.contains("FULL COLLECTION SCANS:"));
    assert!(text.contains("INDEX USE COUNTS:"));
}

#[test]
fn test_severity_buckets_print_ascending() {
    let text = render(&sample_state(), false);
    let small = text.find("2,000 docs scanned").expect("small scan missing");
    let large = text.find("9,000 docs scanned").expect("large scan missing");
    assert!(small < large, "full scans must print ascending by docs scanned");
}

#[test]
fn test_unused_indexes_render_as_zero() {
    let text = render(&sample_state(), false);
    assert!(text.contains("_id_: 0"));
    assert!(text.contains("name_1: 1"));
}

#[test]
fn test_diagnostics_are_opt_in() {
    let quiet = render(&sample_state(), false);
    assert!(!quiet.contains("UNHANDLED OPERATORS FOUND:"));
    assert!(!quiet.contains("legacy_events"));

    let verbose = render(&sample_state(), true);
    assert!(verbose.contains("UNHANDLED OPERATORS FOUND:"));
    assert!(verbose.contains("weird"));
    assert!(verbose.contains("UNHANDLED COMMAND SHAPES FOUND:"));
    assert!(verbose.contains("[reIndex]"));
    assert!(verbose.contains("COLLECTIONS WHERE SOME QUERIES COULD NOT BE ANALYZED:"));
    assert!(verbose.contains("legacy_events"));
}

#[test]
fn test_sort_memory_renders_in_binary_units() {
    let text = render(&sample_state(), false);
    assert!(text.contains("50 MiB sorted in memory"));
}

#[test]
fn test_json_export_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("aggregate.json");

    report::export_json(&sample_state(), &path).expect("export failed");

    let contents = std::fs::read_to_string(&path).expect("read back failed");
    let value: serde_json::Value = serde_json::from_str(&contents).expect("valid JSON");
    assert_eq!(value["index_use_counts"]["people"]["name_1"], 1);
    assert_eq!(value["index_use_counts"]["people"]["_id_"], 0);
    assert_eq!(value["unknown_operators"][0], "weird");
}

#[test]
fn test_csv_export_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("use_counts.csv");

    report::export_use_counts_csv(&sample_state(), &path).expect("export failed");

    let contents = std::fs::read_to_string(&path).expect("read back failed");
    let mut lines = contents.lines();
    assert_eq!(lines.next(), Some("collection,index,uses"));
    // BTreeMap ordering: orders before people
    assert_eq!(lines.next(), Some("orders,total_-1,1"));
    assert_eq!(lines.next(), Some("people,_id_,0"));
    assert_eq!(lines.next(), Some("people,name_1,1"));
    assert_eq!(lines.next(), None);
}
