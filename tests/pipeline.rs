//! End-to-end tests for the prediction pipeline.
//!
//! Artifacts are produced the way the `prepare` and `import-model` commands
//! produce them, a hand-written XGBoost dump stands in for the external
//! trainer, and predictions are served from a freshly loaded `Predictor`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use chrono::{NaiveDate, TimeZone, Utc};
use junction_traffic::{
    ArtifactBundle, ArtifactStore, DirectoryStore, FeatureSchema, LabelPolicy, LoadOptions,
    MemoryStore, MockClock, PipelineError, Predictor,
    history::read_observations,
    ml::{
        persistence::{FEATURE_SCHEMA, LABEL_CODEC, MODEL, import_xgboost_dump},
        training::TrainingDataPreparer,
    },
};
use tempfile::tempdir;

const DATASET: &str = "\
Date,Time,Junction,TrafficLevel
2024-03-02,07:00:00,Hebbal,High
2024-03-31,23:00:00,Nagawara,Low
2024-03-04,13:00:00,KR Puram,Medium
2024-03-04,18:30:00,Electronic City,High
2024-03-05,09:00:00,Hebbal,Medium
";

/// One XGBoost dump tree: `below` when the feature is under 0.5, else `above`.
fn stump(feature: usize, below: f64, above: f64) -> String {
    format!(
        r#"{{"nodeid":0,"depth":0,"split":"f{feature}","split_condition":0.5,"yes":1,"no":2,"missing":1,"children":[{{"nodeid":1,"leaf":{below:?}}},{{"nodeid":2,"leaf":{above:?}}}]}}"#
    )
}

/// High on weekend mornings, Low at night, otherwise Medium.
///
/// One boosting round of a `multi:softprob` booster: a tree per class in
/// codec order (High, Low, Medium).
fn write_model_dump(dir: &Path, schema: &FeatureSchema) -> PathBuf {
    let weekend_morning = schema.position("IsWeekendMorning").unwrap();
    let night = schema.position("PartOfDay_Night").unwrap();

    let trees = [
        stump(weekend_morning, -1.0, 2.0),
        stump(night, -1.0, 2.0),
        stump(0, 0.5, 0.5),
    ];
    let path = dir.join("xgb.dump");
    std::fs::write(&path, format!("0.5\n[{}]\n", trees.join(","))).unwrap();
    path
}

/// Prepare artifacts from the sample dataset and import a model.
fn publish(store: &dyn ArtifactStore) -> FeatureSchema {
    let observations = read_observations(DATASET.as_bytes()).unwrap();
    let set = TrainingDataPreparer::default().prepare(&observations).unwrap();
    set.save(store).unwrap();

    let dir = tempdir().unwrap();
    import_xgboost_dump(store, &write_model_dump(dir.path(), &set.schema)).unwrap();
    set.schema
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ==================== Scenario Tests ====================

#[test]
fn test_saturday_morning_at_hebbal() {
    let store = MemoryStore::new();
    publish(&store);
    let predictor = Predictor::load(&store, LoadOptions::default()).unwrap();

    let time = predictor.observe_local(date(2024, 3, 2), 7, 0).unwrap();
    let features = predictor.features(&time, "Hebbal").unwrap();
    let named: Vec<(&str, f64)> = predictor.schema().label(&features);
    let value = |name: &str| named.iter().find(|(n, _)| *n == name).unwrap().1;

    assert_eq!(value("IsWeekend"), 1.0);
    assert_eq!(value("IsWeekendMorning"), 1.0);
    assert_eq!(value("Quarter"), 1.0);
    assert_eq!(value("IsMonthStart"), 1.0);
    assert_eq!(value("IsMonthEnd"), 0.0);

    // Exactly one indicator per category family is set
    for (name, v) in &named {
        if name.starts_with("JunctionName_") {
            assert_eq!(*v, f64::from(*name == "JunctionName_Hebbal"), "{name}");
        }
        if name.starts_with("PartOfDay_") {
            assert_eq!(*v, f64::from(*name == "PartOfDay_Morning"), "{name}");
        }
    }

    let prediction = predictor.predict(&time, "Hebbal", true).unwrap();
    assert_eq!(prediction.label, "High");
    assert_eq!(prediction.label_policy, LabelPolicy::Persisted);
    assert!(prediction.is_valid());
}

#[test]
fn test_sunday_night_at_nagawara() {
    let store = MemoryStore::new();
    publish(&store);
    let predictor = Predictor::load(&store, LoadOptions::default()).unwrap();

    let time = predictor.observe_local(date(2024, 3, 31), 23, 0).unwrap();
    let features = predictor.features(&time, "Nagawara").unwrap();
    let schema = predictor.schema();

    assert_eq!(features[schema.position("IsMonthEnd").unwrap()], 1.0);
    assert_eq!(features[schema.position("IsWeekend").unwrap()], 1.0);
    assert_eq!(features[schema.position("IsWeekendMorning").unwrap()], 0.0);
    assert_eq!(features[schema.position("PartOfDay_Night").unwrap()], 1.0);

    let prediction = predictor.predict(&time, "Nagawara", false).unwrap();
    assert_eq!(prediction.label, "Low");
    assert!(prediction.probabilities.is_none());
}

#[test]
fn test_weekday_afternoon_falls_back_to_base_class() {
    let store = MemoryStore::new();
    publish(&store);
    let predictor = Predictor::load(&store, LoadOptions::default()).unwrap();

    let time = predictor.observe_local(date(2024, 3, 5), 14, 15).unwrap();
    let prediction = predictor.predict(&time, "KR Puram", true).unwrap();

    assert_eq!(prediction.label, "Medium");
    let confidence = prediction.confidence().unwrap();
    assert_eq!(Some(confidence), prediction.probability_of("Medium"));
    assert!(confidence > prediction.probability_of("High").unwrap());
}

// ==================== Contract Tests ====================

#[test]
fn test_features_are_deterministic_across_loads() {
    let store = MemoryStore::new();
    publish(&store);
    let first = Predictor::load(&store, LoadOptions::default()).unwrap();
    let second = Predictor::load(&store, LoadOptions::default()).unwrap();

    let time = first.observe_local(date(2024, 3, 4), 18, 30).unwrap();
    let a = first.features(&time, "Electronic City").unwrap();
    let b = second.features(&time, "Electronic City").unwrap();
    let c = first.features(&time, "Electronic City").unwrap();

    let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&a), bits(&b));
    assert_eq!(bits(&a), bits(&c));
}

#[test]
fn test_unknown_junction_is_rejected() {
    let store = MemoryStore::new();
    publish(&store);
    let predictor = Predictor::load(&store, LoadOptions::default()).unwrap();
    let time = predictor.observe_local(date(2024, 3, 2), 7, 0).unwrap();

    for junction in ["Silk Board", "hebbal", "Hebbal "] {
        assert!(
            matches!(
                predictor.predict(&time, junction, false),
                Err(PipelineError::UnknownCategory { .. })
            ),
            "{junction:?} should be rejected"
        );
    }
}

#[test]
fn test_schema_drift_is_reported_not_fatal() {
    let store = MemoryStore::new();
    let schema = publish(&store);

    // A schema from an older run: no Quarter column, one retired column
    let mut columns: Vec<String> = schema
        .columns()
        .iter()
        .filter(|c| *c != "Quarter")
        .cloned()
        .collect();
    columns.insert(0, "Legacy".to_string());
    store
        .put(FEATURE_SCHEMA, &serde_json::to_vec(&columns).unwrap())
        .unwrap();

    let bundle = ArtifactBundle::load(&store, LoadOptions::default()).unwrap();
    assert_eq!(bundle.report.dropped, vec!["Quarter".to_string()]);
    assert_eq!(bundle.report.always_zero, vec!["Legacy".to_string()]);

    let predictor = Predictor::new(bundle).unwrap();
    let time = predictor.observe_local(date(2024, 3, 2), 7, 0).unwrap();
    let features = predictor.features(&time, "Hebbal").unwrap();
    assert_eq!(features.len(), columns.len());
    assert_eq!(features[0], 0.0);
}

#[test]
fn test_schema_naming_unknown_junction_is_fatal() {
    let store = MemoryStore::new();
    let schema = publish(&store);

    let mut columns = schema.columns().to_vec();
    let last = columns.len() - 1;
    columns[last] = "JunctionName_Silk Board".to_string();
    store
        .put(FEATURE_SCHEMA, &serde_json::to_vec(&columns).unwrap())
        .unwrap();

    assert!(matches!(
        Predictor::load(&store, LoadOptions::default()),
        Err(PipelineError::SchemaMismatch(_))
    ));
}

#[test]
fn test_static_labels_only_on_opt_in() {
    let store = MemoryStore::new();
    publish(&store);
    store.remove(LABEL_CODEC);

    assert!(matches!(
        Predictor::load(&store, LoadOptions::default()),
        Err(PipelineError::ArtifactLoad { .. })
    ));

    let predictor = Predictor::load(
        &store,
        LoadOptions {
            allow_static_labels: true,
        },
    )
    .unwrap();
    assert_eq!(predictor.label_policy(), LabelPolicy::StaticFallback);

    let time = predictor.observe_local(date(2024, 3, 2), 7, 0).unwrap();
    let prediction = predictor.predict(&time, "Hebbal", false).unwrap();
    assert_eq!(prediction.label, "High");
    assert_eq!(prediction.label_policy, LabelPolicy::StaticFallback);
}

#[test]
fn test_overflowing_booster_is_refused_at_import() {
    let store = MemoryStore::new();
    let observations = read_observations(DATASET.as_bytes()).unwrap();
    let set = TrainingDataPreparer::default().prepare(&observations).unwrap();
    set.save(&store).unwrap();

    let dir = tempdir().unwrap();
    let dump = dir.path().join("xgb.dump");
    let huge = stump(0, 1e308, 1e308);
    std::fs::write(&dump, format!("0.5\n[{huge},{huge},{huge}]\n")).unwrap();

    assert!(matches!(
        import_xgboost_dump(&store, &dump),
        Err(PipelineError::ArtifactLoad { .. })
    ));
    assert_eq!(store.get(MODEL).unwrap(), None);
}

// ==================== Serving Tests ====================

#[test]
fn test_directory_store_round_trip() {
    let dir = tempdir().unwrap();
    let store = DirectoryStore::new(dir.path());
    publish(&store);

    for name in [MODEL, FEATURE_SCHEMA, LABEL_CODEC, "feature_contract"] {
        assert!(store.path_for(name).exists(), "{name}.json missing");
    }

    let predictor = Predictor::load(&store, LoadOptions::default()).unwrap();
    let clock = MockClock::new(Utc.with_ymd_and_hms(2024, 3, 31, 17, 45, 0).unwrap());
    let prediction = predictor.predict_now(&clock, "Nagawara", true).unwrap();

    assert_eq!(prediction.timestamp.to_rfc3339(), "2024-03-31T23:15:00+05:30");
    assert_eq!(prediction.label, "Low");

    let json = serde_json::to_value(&prediction).unwrap();
    assert_eq!(json["label_policy"], "persisted");
    assert_eq!(json["probabilities"].as_array().unwrap().len(), 3);
}

#[test]
fn test_shared_predictor_across_threads() {
    let store = MemoryStore::new();
    publish(&store);
    let predictor = Arc::new(Predictor::load(&store, LoadOptions::default()).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let predictor = Arc::clone(&predictor);
            thread::spawn(move || {
                let time = predictor.observe_local(date(2024, 3, 2), 7, 0).unwrap();
                let junction = ["Electronic City", "Hebbal", "KR Puram", "Nagawara"][i];
                predictor.predict(&time, junction, false).unwrap().label
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), "High");
    }
}
