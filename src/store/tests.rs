use super::*;
use crate::evaluation::{EvaluationResult, UnknownRelevanceStrategy};
use crate::gridsearch::GridRow;

fn doc(topic_id: u32, doc_id: &str, scores: &[(&str, f64)]) -> DocumentCandidate {
    scores
        .iter()
        .fold(DocumentCandidate::new(topic_id, doc_id), |acc, (name, value)| {
            acc.with_score(*name, *value)
        })
}

fn store() -> RankingStore {
    RankingStore::open_in_memory().expect("in-memory store should open")
}

fn sample_run() -> Vec<DocumentCandidate> {
    vec![
        doc(2, "clueweb12-0002", &[("chatnoir", 1530.123456789), ("nlp", 0.1 + 0.2)]),
        doc(2, "clueweb12-0001", &[("chatnoir", 1e-300), ("nlp", 2.5e-7)]),
        doc(1, "clueweb12-0100", &[("chatnoir", f64::MAX), ("nlp", 1.0 / 3.0)]),
    ]
}

fn empty_result() -> EvaluationResult {
    EvaluationResult {
        strategy: UnknownRelevanceStrategy::AssumeNotRelevant,
        metrics: BTreeMap::from([("ndcg@5".to_string(), 0.25)]),
        summary: BTreeMap::new(),
        per_topic: BTreeMap::new(),
    }
}

#[test]
fn round_trip_preserves_ids_order_and_exact_scores() {
    let mut store = store();
    store.write("baseline", &sample_run()).expect("write should succeed");

    let read = store.read("baseline").expect("read should succeed");

    let ids = read
        .iter()
        .map(|document| (document.topic_id, document.doc_id.as_str()))
        .collect::<Vec<(u32, &str)>>();
    assert_eq!(
        ids,
        vec![
            (1, "clueweb12-0100"),
            (2, "clueweb12-0002"),
            (2, "clueweb12-0001"),
        ]
    );

    for original in sample_run() {
        let stored = read
            .iter()
            .find(|document| document.doc_id == original.doc_id)
            .expect("document should survive the round trip");
        assert_eq!(stored.topic_id, original.topic_id);
        for (name, value) in &original.scores {
            assert_eq!(stored.scores[name].to_bits(), value.to_bits(), "{name}");
        }
    }
}

#[test]
fn rewriting_a_run_overwrites_previous_documents() {
    let mut store = store();
    store.write("baseline", &sample_run()).expect("first write should succeed");

    let replacement = vec![doc(7, "only", &[("bm25", 3.5)])];
    store.write("baseline", &replacement).expect("second write should succeed");
    store.write("baseline", &replacement).expect("repeat write should succeed");

    let read = store.read("baseline").expect("read should succeed");
    assert_eq!(read, replacement);

    let metadata = store.read_metadata("baseline").expect("metadata should exist");
    assert_eq!(metadata.score_names, vec!["bm25".to_string()]);
    assert_eq!(metadata.topic_count, 1);
    assert_eq!(metadata.document_count, 1);
}

#[test]
fn append_replaces_only_present_topics() {
    let mut store = store();
    store.write("baseline", &sample_run()).expect("write should succeed");

    let topic_two = vec![doc(2, "fresh", &[("chatnoir", 5.0), ("nlp", 0.5)])];
    store.append("baseline", &topic_two).expect("append should succeed");
    let topic_three = vec![doc(3, "new", &[("chatnoir", 2.0), ("nlp", 0.0)])];
    store.append("baseline", &topic_three).expect("append should succeed");

    let read = store.read("baseline").expect("read should succeed");
    let ids = read
        .iter()
        .map(|document| (document.topic_id, document.doc_id.as_str()))
        .collect::<Vec<(u32, &str)>>();
    assert_eq!(ids, vec![(1, "clueweb12-0100"), (2, "fresh"), (3, "new")]);
}

#[test]
fn append_creates_missing_run() {
    let mut store = store();
    let documents = vec![doc(5, "a", &[("chatnoir", 1.0)])];
    store.append("fresh-run", &documents).expect("append should succeed");
    assert_eq!(store.read("fresh-run").expect("read should succeed"), documents);
}

#[test]
fn append_with_different_score_keys_is_rejected_and_keeps_state() {
    let mut store = store();
    store.write("baseline", &sample_run()).expect("write should succeed");

    let error = store
        .append("baseline", &[doc(3, "x", &[("chatnoir", 1.0), ("terms", 0.2)])])
        .expect_err("schema mismatch should fail");
    assert!(matches!(error, CoreError::Schema { .. }), "unexpected error: {error}");

    let read = store.read("baseline").expect("read should succeed");
    assert_eq!(read.len(), 3);
    assert!(read.iter().all(|document| document.topic_id != 3));
}

#[test]
fn write_rejects_inconsistent_documents_before_touching_disk() {
    let mut store = store();
    store.write("baseline", &sample_run()).expect("write should succeed");

    let inconsistent = vec![
        doc(1, "a", &[("chatnoir", 1.0), ("nlp", 0.2)]),
        doc(1, "b", &[("chatnoir", 1.0)]),
    ];
    let error = store
        .write("baseline", &inconsistent)
        .expect_err("inconsistent keys should fail");
    assert!(error.to_string().contains("inconsistent score schema"));
    assert_eq!(store.read("baseline").expect("read should succeed").len(), 3);
}

#[test]
fn validate_documents_rejects_duplicates_and_non_finite_scores() {
    let duplicate = vec![doc(1, "a", &[("x", 1.0)]), doc(1, "a", &[("x", 2.0)])];
    let error = validate_documents("run", &duplicate).expect_err("duplicate should fail");
    assert!(error.to_string().contains("appears twice"));

    let not_a_number = vec![doc(1, "a", &[("x", f64::NAN)])];
    let error = validate_documents("run", &not_a_number).expect_err("NaN should fail");
    assert!(error.to_string().contains("non-finite"));

    let same_doc_other_topic = vec![doc(1, "a", &[("x", 1.0)]), doc(2, "a", &[("x", 2.0)])];
    let names = validate_documents("run", &same_doc_other_topic).expect("valid run");
    assert_eq!(names, BTreeSet::from(["x".to_string()]));
}

#[test]
fn unknown_run_is_not_found() {
    let store = store();
    let error = store.read("missing").expect_err("unknown run should fail");
    assert!(matches!(error, CoreError::NotFound { kind: "run", .. }));
    assert!(matches!(
        store.read_metadata("missing"),
        Err(CoreError::NotFound { .. })
    ));
}

#[test]
fn run_settings_and_listing_round_trip() {
    let mut store = store();
    store.write("b-run", &sample_run()).expect("write should succeed");
    store.write("a-run", &sample_run()).expect("write should succeed");

    let weights = WeightVector::from([("chatnoir".to_string(), 0.4)]);
    store
        .record_run_settings("b-run", &weights, Some("{\"run_name\":\"b-run\"}"))
        .expect("settings should be recorded");

    let metadata = store.read_metadata("b-run").expect("metadata should exist");
    assert_eq!(metadata.recorded_weights, weights);
    assert_eq!(metadata.recorded_weight("chatnoir"), 0.4);
    assert_eq!(metadata.recorded_weight("nlp"), 1.0);
    assert_eq!(metadata.config_json.as_deref(), Some("{\"run_name\":\"b-run\"}"));
    assert_eq!(metadata.topic_count, 2);
    assert_eq!(metadata.document_count, 3);

    let listed = store
        .list_runs()
        .expect("listing should succeed")
        .into_iter()
        .map(|metadata| metadata.run_id)
        .collect::<Vec<String>>();
    assert_eq!(listed, vec!["a-run".to_string(), "b-run".to_string()]);
}

#[test]
fn delete_removes_run_and_its_documents() {
    let mut store = store();
    store.write("baseline", &sample_run()).expect("write should succeed");
    store.delete("baseline").expect("delete should succeed");

    assert!(matches!(store.read("baseline"), Err(CoreError::NotFound { .. })));
    let orphaned: i64 = store
        .connection
        .query_row("SELECT COUNT(*) FROM run_scores", [], |row| row.get(0))
        .expect("count should succeed");
    assert_eq!(orphaned, 0);
    assert!(matches!(store.delete("baseline"), Err(CoreError::NotFound { .. })));
}

#[test]
fn grid_checkpoints_are_recorded_and_read_in_order() {
    let mut store = store();
    store
        .begin_grid_search("search-1", "baseline", "{\"step\":0.5}")
        .expect("search should register");

    for index in [2_usize, 0, 1] {
        let row = GridRow {
            index,
            weights: WeightVector::from([("nlp".to_string(), index as f64 * 0.5)]),
            result: empty_result(),
        };
        store
            .record_grid_point("search-1", &row)
            .expect("checkpoint should be recorded");
    }

    let rows = store.grid_points("search-1").expect("rows should load");
    assert_eq!(
        rows.iter().map(|row| row.index).collect::<Vec<usize>>(),
        vec![0, 1, 2]
    );
    assert_eq!(rows[2].weights["nlp"], 1.0);
    assert_eq!(rows[1].result.metric("ndcg@5"), Some(0.25));

    let again = store
        .begin_grid_search("search-1", "baseline", "{\"step\":0.5}")
        .expect("identical settings should resume");
    assert_eq!(again.run_id, "baseline");

    let error = store
        .begin_grid_search("search-1", "baseline", "{\"step\":0.2}")
        .expect_err("different settings should conflict");
    assert!(matches!(error, CoreError::Config(_)));

    store
        .clear_grid_search("search-1")
        .expect("clear should succeed");
    assert!(store.grid_search("search-1").expect("lookup should succeed").is_none());
    assert!(store.grid_points("search-1").expect("rows should load").is_empty());
}
