use std::collections::BTreeMap;

use super::*;

fn doc(topic_id: u32, doc_id: &str, scores: &[(&str, f64)]) -> DocumentCandidate {
    scores
        .iter()
        .fold(DocumentCandidate::new(topic_id, doc_id), |acc, (name, value)| {
            acc.with_score(*name, *value)
        })
}

fn fixed(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn documents() -> Vec<DocumentCandidate> {
    vec![
        doc(1, "a", &[("chatnoir", 2.0), ("nlp", 0.0), ("terms", 0.1)]),
        doc(1, "b", &[("chatnoir", 1.0), ("nlp", 5.0), ("terms", 0.0)]),
        doc(2, "c", &[("chatnoir", 3.0), ("nlp", 0.2), ("terms", 0.9)]),
    ]
}

fn qrels() -> Qrels {
    Qrels::parse("inline", "1 Q0 a 0\n1 Q0 b 2\n2 Q0 c 1\n").expect("qrels fixture should parse")
}

fn range(start: f64, end: f64, step: f64) -> GridRange {
    GridRange { start, end, step }
}

fn row(index: usize, ndcg: f64) -> GridRow {
    GridRow {
        index,
        weights: WeightVector::from([("nlp".to_string(), index as f64)]),
        result: EvaluationResult {
            strategy: UnknownRelevanceStrategy::AssumeNotRelevant,
            metrics: BTreeMap::from([("ndcg@5".to_string(), ndcg)]),
            summary: BTreeMap::new(),
            per_topic: BTreeMap::new(),
        },
    }
}

#[test]
fn default_range_hits_the_end_bound_exactly() {
    let values = GridRange::default().values().expect("default range is valid");
    assert_eq!(values, vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0, 1.2, 1.4]);
}

#[test]
fn one_dimensional_grid_yields_rows_in_ascending_order() {
    let documents = vec![
        doc(1, "a", &[("chatnoir", 2.0), ("nlp", 0.0)]),
        doc(1, "b", &[("chatnoir", 1.0), ("nlp", 5.0)]),
    ];

    let rows = search(
        &documents,
        range(0.5, 1.0, 0.5),
        &fixed(&["chatnoir"]),
        &qrels(),
        UnknownRelevanceStrategy::AssumeNotRelevant,
    )
    .expect("search should succeed");

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].index, 0);
    assert_eq!(rows[0].weights["nlp"], 0.5);
    assert_eq!(rows[1].index, 1);
    assert_eq!(rows[1].weights["nlp"], 1.0);
    assert!(rows.iter().all(|row| row.weights["chatnoir"] == 1.0));
    assert!(rows.iter().all(|row| row.metric("ndcg@5").is_some()));
}

#[test]
fn enumeration_is_lexicographic_with_first_dimension_outermost() {
    let settings = GridSearchSettings::new("run", range(0.0, 1.0, 1.0), fixed(&["chatnoir"]));
    let plan = GridPlan::new(&documents(), &settings).expect("plan should build");

    assert_eq!(plan.dimensions(), ["nlp".to_string(), "terms".to_string()]);
    assert_eq!(plan.len(), 4);

    let points = (0..plan.len())
        .map(|index| {
            let weights = plan.weights_at(index);
            (weights["nlp"], weights["terms"])
        })
        .collect::<Vec<(f64, f64)>>();
    assert_eq!(points, vec![(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)]);
}

#[test]
fn fixed_dimensions_keep_their_recorded_weight() {
    let mut settings =
        GridSearchSettings::new("run", range(0.0, 0.5, 0.5), fixed(&["chatnoir", "terms"]));
    settings
        .fixed_weights
        .insert("chatnoir".to_string(), 0.3);

    let plan = GridPlan::new(&documents(), &settings).expect("plan should build");
    let weights = plan.weights_at(1);
    assert_eq!(weights["chatnoir"], 0.3);
    assert_eq!(weights["terms"], 1.0);
    assert_eq!(weights["nlp"], 0.5);
}

#[test]
fn empty_fixed_set_is_a_config_error() {
    let error = search(
        &documents(),
        GridRange::default(),
        &BTreeSet::new(),
        &qrels(),
        UnknownRelevanceStrategy::AssumeNotRelevant,
    )
    .expect_err("empty fixed set should fail");
    assert!(matches!(error, CoreError::Config(_)), "unexpected error: {error}");
}

#[test]
fn invalid_ranges_are_config_errors() {
    for invalid in [
        range(0.0, 1.0, 0.0),
        range(0.0, 1.0, -0.2),
        range(1.0, 0.5, 0.1),
        range(f64::NAN, 1.0, 0.1),
        range(0.0, f64::INFINITY, 0.1),
    ] {
        let error = search(
            &documents(),
            invalid,
            &fixed(&["chatnoir"]),
            &qrels(),
            UnknownRelevanceStrategy::AssumeNotRelevant,
        )
        .expect_err("invalid range should fail");
        assert!(matches!(error, CoreError::Config(_)), "{invalid:?}: {error}");
    }
}

#[test]
fn unknown_fixed_dimension_is_a_dimension_error() {
    let error = search(
        &documents(),
        GridRange::default(),
        &fixed(&["chatnior"]),
        &qrels(),
        UnknownRelevanceStrategy::AssumeNotRelevant,
    )
    .expect_err("typo in fixed set should fail");
    assert!(matches!(error, CoreError::Dimension { ref dimension } if dimension == "chatnior"));
}

#[test]
fn fixing_every_dimension_leaves_nothing_to_vary() {
    let error = search(
        &documents(),
        GridRange::default(),
        &fixed(&["chatnoir", "nlp", "terms"]),
        &qrels(),
        UnknownRelevanceStrategy::AssumeNotRelevant,
    )
    .expect_err("nothing to vary should fail");
    assert!(error.to_string().contains("nothing to vary"));
}

#[test]
fn resuming_skips_points_already_evaluated() {
    let mut settings = GridSearchSettings::new("run", range(0.0, 1.0, 0.5), fixed(&["chatnoir"]));
    settings.strategy = UnknownRelevanceStrategy::AssumeRelevant;

    let mut full = Vec::new();
    let evaluated = search_with(&documents(), &settings, &qrels(), 0, |row| {
        full.push(row);
        Ok(())
    })
    .expect("full search should succeed");
    assert_eq!(evaluated, 9);

    let mut resumed = Vec::new();
    let evaluated = search_with(&documents(), &settings, &qrels(), 6, |row| {
        resumed.push(row);
        Ok(())
    })
    .expect("resumed search should succeed");

    assert_eq!(evaluated, 3);
    assert_eq!(resumed, full[6..].to_vec());
}

#[test]
fn sink_failure_aborts_the_search() {
    let settings = GridSearchSettings::new("run", range(0.0, 1.0, 0.5), fixed(&["chatnoir"]));
    let mut seen = 0_usize;
    let error = search_with(&documents(), &settings, &qrels(), 0, |row| {
        seen += 1;
        if row.index == 1 {
            return Err(CoreError::Backend("checkpoint write failed".to_string()));
        }
        Ok(())
    })
    .expect_err("sink error should propagate");

    assert_eq!(seen, 2);
    assert!(error.to_string().contains("checkpoint write failed"));
}

#[test]
fn evaluation_errors_abort_the_search() {
    let documents = vec![
        doc(1, "b", &[("chatnoir", 1.0), ("nlp", 1.0)]),
        doc(9, "unjudged", &[("chatnoir", 1.0), ("nlp", 1.0)]),
    ];
    let error = search(
        &documents,
        GridRange::default(),
        &fixed(&["chatnoir"]),
        &qrels(),
        UnknownRelevanceStrategy::Ignore,
    )
    .expect_err("topic 9 has no judged documents");
    assert!(matches!(error, CoreError::EmptyRanking { topic_id: 9 }));
}

#[test]
fn best_prefers_highest_metric_then_lowest_index() {
    let rows = vec![row(0, 0.4), row(1, 0.7), row(2, 0.7), row(3, 0.1)];
    let winner = best(&rows, "ndcg@5").expect("rows carry the metric");
    assert_eq!(winner.index, 1);
    assert!(best(&rows, "ndcg@1000").is_none());
    assert!(best(&[], "ndcg@5").is_none());
}

#[test]
fn csv_lists_weights_then_metrics() {
    let rows = vec![row(0, 0.25), row(1, 0.75), row(2, 0.75)];
    let metrics = vec!["ndcg@5".to_string()];

    let plain = render_csv(&rows, &metrics, None);
    assert_eq!(plain, "index,nlp,ndcg@5\n0,0,0.25\n1,1,0.75\n2,2,0.75\n");

    let sorted = render_csv(&rows, &metrics, Some("ndcg@5"));
    assert_eq!(sorted, "index,nlp,ndcg@5\n1,1,0.75\n2,2,0.75\n0,0,0.25\n");
}

#[test]
fn search_id_names_run_fixed_set_range_and_strategy() {
    let settings = GridSearchSettings::new(
        "baseline",
        GridRange::default(),
        fixed(&["chatnoir", "terms"]),
    );
    assert_eq!(
        settings.search_id(),
        "baseline-ignore-chatnoir+terms-0-1.4-0.2-assume_not_relevant"
    );
}

#[test]
fn input_fingerprints_track_judgments_and_documents() {
    let settings = || GridSearchSettings::new("baseline", GridRange::default(), fixed(&["chatnoir"]));
    let pinned = settings().with_inputs(&documents(), &qrels());
    assert!(!pinned.inputs_differ(&settings().with_inputs(&documents(), &qrels())));

    let reordered_lines =
        Qrels::parse("inline", "2 Q0 c 1\n\n1 Q0 b   2\n1 Q0 a 0\n").expect("qrels should parse");
    assert_eq!(reordered_lines.fingerprint(), qrels().fingerprint());

    let other_judgments =
        Qrels::parse("inline", "1 Q0 a 2\n1 Q0 b 0\n2 Q0 c 1\n").expect("qrels should parse");
    assert!(pinned.inputs_differ(&settings().with_inputs(&documents(), &other_judgments)));

    let mut rescored = documents();
    rescored[1].scores.insert("nlp".to_string(), 5.000_000_1);
    assert!(pinned.inputs_differ(&settings().with_inputs(&rescored, &qrels())));

    let mut extended = documents();
    extended.push(doc(3, "d", &[("chatnoir", 1.0), ("nlp", 0.0), ("terms", 0.0)]));
    assert!(pinned.inputs_differ(&settings().with_inputs(&extended, &qrels())));

    let restored = serde_json::from_str::<GridSearchSettings>(
        &serde_json::to_string(&pinned).expect("settings should serialize"),
    )
    .expect("settings should deserialize");
    assert!(!pinned.inputs_differ(&restored));
}
