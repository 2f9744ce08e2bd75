//! SQLite-backed store tests: import, scoring, persistence across reopen

use chrono::{TimeZone, Utc};
use siterisk_core::reconcile::apply_section_fixes;
use siterisk_core::validate::validate_stored_score;
use siterisk_core::{
    import_assessment, AssessmentStore, Questionnaire, RiskEngine, RiskLevel, ScoringPolicy,
    SqliteStore,
};
use std::path::{Path, PathBuf};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn seeded_store(path: &Path) -> SqliteStore {
    let mut store = SqliteStore::open(path).unwrap();
    store
        .load_catalog(&Questionnaire::builtin().unwrap())
        .unwrap();
    store
}

#[test]
fn test_import_collapses_repeated_questions() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = seeded_store(&dir.path().join("siterisk.db"));
    let now = Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap();

    let summary =
        import_assessment(&mut store, &fixture_path("assessment-tokyo.json"), now).unwrap();
    assert_eq!(summary.facility_id, "dc-tokyo-1");
    assert_eq!(summary.answers_written, 9);
    assert!(summary.unknown_questions.is_empty());

    let answers = store.answers("dc-tokyo-1").unwrap();
    assert_eq!(answers.len(), 8);
    let seismic = answers.iter().find(|a| a.question_id == 2004).unwrap();
    assert_eq!(seismic.value.as_deref(), Some("meets-current-code"));

    let facility = store.facility("dc-tokyo-1").unwrap().unwrap();
    assert_eq!(facility.name, "Tokyo DC 1");
    assert_eq!(facility.updated_at, Some(now));
}

#[test]
fn test_scores_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("siterisk.db");
    let now = Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap();

    let stored = {
        let mut store = seeded_store(&db);
        import_assessment(&mut store, &fixture_path("assessment-tokyo.json"), now).unwrap();
        let mut engine = RiskEngine::new(store, ScoringPolicy::default());
        engine.recalculate_and_store("dc-tokyo-1").unwrap()
    };
    assert!(stored.is_evaluated());
    assert_ne!(stored.risk_level, RiskLevel::Unevaluated);

    let reopened = SqliteStore::open(&db).unwrap();
    assert_eq!(reopened.risk_score("dc-tokyo-1").unwrap(), Some(stored.clone()));
    assert!(reopened.score_stored_at("dc-tokyo-1").unwrap().is_some());
    assert!(reopened.facility("dc-tokyo-1").unwrap().unwrap().progress > 0);

    let engine = RiskEngine::new(reopened, ScoringPolicy::default());
    assert_eq!(engine.compute_risk_score("dc-tokyo-1").unwrap(), stored);
    let validation = validate_stored_score(&engine, "dc-tokyo-1").unwrap();
    assert!(validation.matches, "{:?}", validation.differences);
}

#[test]
fn test_validation_flags_stale_record() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = seeded_store(&dir.path().join("siterisk.db"));
    let now = Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap();
    import_assessment(&mut store, &fixture_path("assessment-tokyo.json"), now).unwrap();

    let mut engine = RiskEngine::new(store, ScoringPolicy::default());
    let missing = validate_stored_score(&engine, "dc-tokyo-1").unwrap();
    assert!(!missing.matches);
    assert_eq!(missing.differences[0].field, "record");

    let mut stale = engine.recalculate_and_store("dc-tokyo-1").unwrap();
    stale.total_score += 1.0;
    engine
        .store_mut()
        .upsert_risk_score("dc-tokyo-1", &stale)
        .unwrap();

    let validation = validate_stored_score(&engine, "dc-tokyo-1").unwrap();
    assert!(!validation.matches);
    assert!(validation
        .differences
        .iter()
        .any(|d| d.field == "total_score"));
}

#[test]
fn test_legacy_catalog_reconciliation() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = SqliteStore::open(&dir.path().join("legacy.db")).unwrap();
    let legacy = Questionnaire::load(&fixture_path("legacy-catalog.json")).unwrap();
    assert_eq!(legacy.question(2002).unwrap().section_id, 2);
    assert_eq!(legacy.options_for(2002).len(), 2);
    assert_eq!(legacy.options_for(3001).len(), 2);
    store.load_catalog(&legacy).unwrap();

    let planned = apply_section_fixes(&mut store, true).unwrap();
    let moved: Vec<(u32, bool)> = planned
        .fixes
        .iter()
        .map(|f| (f.question_id, f.applicable))
        .collect();
    assert_eq!(moved, vec![(3005, true), (7001, false)]);
    assert_eq!(planned.applied, 0);
    assert_eq!(store.questions(Some(2)).unwrap().len(), 3);

    let applied = apply_section_fixes(&mut store, false).unwrap();
    assert_eq!(applied.applied, 1);
    assert_eq!(applied.skipped, 1);
    let section3: Vec<u32> = store
        .questions(Some(3))
        .unwrap()
        .iter()
        .map(|q| q.id)
        .collect();
    assert_eq!(section3, vec![3001, 3005, 7001]);

    let again = apply_section_fixes(&mut store, false).unwrap();
    assert_eq!(again.applied, 0);
}

#[test]
fn test_unknown_facility_is_not_scored() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir.path().join("siterisk.db"));
    let engine = RiskEngine::new(store, ScoringPolicy::default());
    assert!(engine.compute_risk_score("nowhere").is_err());
    assert!(engine.store().risk_score("nowhere").unwrap().is_none());
}
