//! End-to-end scoring scenarios against the in-memory store

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use siterisk_core::model::{
    Answer, Facility, InputType, Question, QuestionOption, RiskFactor, Section,
};
use siterisk_core::report::render_json;
use siterisk_core::resolve::ScoreSource;
use siterisk_core::{
    AssessmentStore, EngineError, MemoryStore, Questionnaire, RiskEngine, RiskLevel,
    ScoringPolicy,
};
use std::collections::BTreeSet;

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, minute, 0).unwrap()
}

fn facility(id: &str) -> Facility {
    Facility {
        id: id.to_string(),
        name: format!("Facility {id}"),
        location: String::new(),
        assessor: None,
        assessment_date: None,
        progress: 0,
        created_at: None,
        updated_at: None,
    }
}

fn answer(facility_id: &str, question_id: u32, minute: u32) -> Answer {
    Answer {
        facility_id: facility_id.to_string(),
        question_id,
        value: None,
        numeric_value: None,
        selected_options: None,
        updated_at: at(minute),
    }
}

fn builtin_engine() -> RiskEngine<MemoryStore> {
    let questionnaire = Questionnaire::builtin().unwrap();
    let mut store = MemoryStore::with_questionnaire(&questionnaire);
    store.upsert_facility(&facility("dc-1")).unwrap();
    RiskEngine::new(store, ScoringPolicy::default())
}

#[test]
fn test_building_age_and_redundant_power() {
    let mut engine = builtin_engine();
    let store = engine.store_mut();
    store
        .upsert_answer(&Answer {
            numeric_value: Some(25.0),
            ..answer("dc-1", 2001, 0)
        })
        .unwrap();
    store
        .upsert_answer(&Answer {
            selected_options: Some(json!(["2n-redundant"])),
            ..answer("dc-1", 3002, 5)
        })
        .unwrap();

    let record = engine.compute_risk_score("dc-1").unwrap();
    assert_eq!(record.probability_score, 5.0);
    assert_eq!(record.impact_score, 3.0);
    assert_eq!(record.mitigation_score, 5.0);
    assert_eq!(record.total_score, 3.0);
    assert_eq!(record.risk_level, RiskLevel::Medium);
    assert_eq!(record.computed_at, Some(at(5)));

    let sources: Vec<(u32, ScoreSource)> = record
        .contributions
        .iter()
        .map(|c| (c.question_id, c.source))
        .collect();
    assert_eq!(
        sources,
        vec![(2001, ScoreSource::Threshold), (3002, ScoreSource::Option)]
    );
}

#[test]
fn test_zero_answers_is_unevaluated_not_error() {
    let engine = builtin_engine();
    let record = engine.compute_risk_score("dc-1").unwrap();
    assert_eq!(record.risk_level, RiskLevel::Unevaluated);
    assert!(!record.is_evaluated());
    assert_eq!(record.probability_score, 3.0);
    assert_eq!(record.impact_score, 3.0);
    assert_eq!(record.mitigation_score, 3.0);
    assert_eq!(record.total_score, 3.0);
    assert!(record.contributions.is_empty());
}

#[test]
fn test_unknown_facility_propagates() {
    let engine = builtin_engine();
    assert!(matches!(
        engine.compute_risk_score("missing"),
        Err(EngineError::FacilityNotFound(_))
    ));
}

fn ten_required_questionnaire() -> Questionnaire {
    let sections = vec![Section {
        id: 1,
        name: "General".into(),
        weight: 1.0,
    }];
    let questions = (1..=10)
        .map(|n| Question {
            id: 1000 + n,
            section_id: 1,
            text: format!("Question {n}"),
            input_type: InputType::Select,
            required: true,
            importance: None,
            risk_factor: Some(RiskFactor::Probability),
            scoring: true,
            thresholds: Vec::new(),
        })
        .collect();
    let options = (1..=10)
        .map(|n| QuestionOption {
            question_id: 1000 + n,
            value: "yes".into(),
            label: "Yes".into(),
            risk_score: Some(2.0),
            risk_level: None,
            risk_factor: None,
            weight: None,
        })
        .collect();
    Questionnaire::new(sections, questions, options)
}

#[test]
fn test_overwritten_answers_count_once_for_progress() {
    let questionnaire = ten_required_questionnaire();
    let mut store = MemoryStore::with_questionnaire(&questionnaire);
    store.upsert_facility(&facility("dc-2")).unwrap();
    for n in 1..=7 {
        store.push_raw_answer(Answer {
            value: Some("yes".into()),
            ..answer("dc-2", 1000 + n, n)
        });
    }
    // Two later submissions for questions that were already answered
    for n in [2, 5] {
        store.push_raw_answer(Answer {
            value: Some("yes".into()),
            ..answer("dc-2", 1000 + n, 30 + n)
        });
    }
    assert_eq!(store.answers("dc-2").unwrap().len(), 9);

    let mut engine = RiskEngine::new(store, ScoringPolicy::default());
    let progress = engine.compute_progress("dc-2").unwrap();
    assert_eq!(progress.required, 10);
    assert_eq!(progress.answered, 7);
    assert_eq!(progress.overall, 70);

    engine.recalculate_and_store("dc-2").unwrap();
    assert_eq!(engine.store().facility("dc-2").unwrap().unwrap().progress, 70);
}

#[test]
fn test_recomputation_is_identical() {
    let mut engine = builtin_engine();
    let store = engine.store_mut();
    store
        .upsert_answer(&Answer {
            value: Some("older-code".into()),
            ..answer("dc-1", 2004, 1)
        })
        .unwrap();
    store
        .upsert_answer(&Answer {
            selected_options: Some(json!(["cctv", "badge-access"])),
            ..answer("dc-1", 3008, 2)
        })
        .unwrap();
    store
        .upsert_answer(&Answer {
            numeric_value: Some(99.5),
            ..answer("dc-1", 5005, 3)
        })
        .unwrap();

    let first = engine.compute_risk_score("dc-1").unwrap();
    let second = engine.compute_risk_score("dc-1").unwrap();
    assert_eq!(first, second);
    assert_eq!(render_json(&first), render_json(&second));

    let stored = engine.recalculate_and_store("dc-1").unwrap();
    let again = engine.recalculate_and_store("dc-1").unwrap();
    assert_eq!(stored, again);
    assert_eq!(engine.store().risk_score("dc-1").unwrap(), Some(first));
}

#[test]
fn test_blank_answers_do_not_contribute() {
    let mut engine = builtin_engine();
    let store = engine.store_mut();
    store
        .upsert_answer(&Answer {
            value: Some("   ".into()),
            ..answer("dc-1", 2004, 1)
        })
        .unwrap();
    store
        .upsert_answer(&Answer {
            selected_options: Some(json!([])),
            ..answer("dc-1", 3008, 2)
        })
        .unwrap();

    let record = engine.compute_risk_score("dc-1").unwrap();
    assert!(record.contributions.is_empty());
    assert_eq!(record.answered, 0);
    assert_eq!(record.risk_level, RiskLevel::Unevaluated);
    assert_eq!(engine.compute_progress("dc-1").unwrap().answered, 0);
}

#[test]
fn test_metadata_answers_never_score() {
    let mut engine = builtin_engine();
    engine
        .store_mut()
        .upsert_answer(&Answer {
            value: Some("Tokyo DC 1".into()),
            ..answer("dc-1", 1001, 1)
        })
        .unwrap();
    let record = engine.compute_risk_score("dc-1").unwrap();
    assert_eq!(record.answered, 1);
    assert!(record.contributions.is_empty());
    assert_eq!(engine.compute_progress("dc-1").unwrap().answered, 1);
}

#[test]
fn test_recommendation_buckets_are_disjoint() {
    let mut engine = builtin_engine();
    let store = engine.store_mut();
    let answers = [
        (2001, json!(null), Some(25.0)),
        (2004, json!(["older-code"]), None),
        (2007, json!(["high-zone"]), None),
        (3001, json!(["none"]), None),
        (3005, json!(["business-hours"]), None),
        (4001, json!(["single-feed"]), None),
        (5005, json!(null), Some(99.5)),
    ];
    for (i, (qid, selected, numeric)) in answers.into_iter().enumerate() {
        store
            .upsert_answer(&Answer {
                selected_options: (!selected.is_null()).then_some(selected),
                numeric_value: numeric,
                ..answer("dc-1", qid, i as u32)
            })
            .unwrap();
    }

    let recs = engine.compute_recommendations("dc-1").unwrap();
    let policy = ScoringPolicy::default();
    for (title, group) in recs.groups() {
        let high: BTreeSet<u32> = group.high_risk_items.iter().map(|i| i.question_id).collect();
        let medium: BTreeSet<u32> = group
            .medium_risk_items
            .iter()
            .map(|i| i.question_id)
            .collect();
        assert!(high.is_disjoint(&medium), "{title} lists a question twice");
        assert!(group.high_risk_items.iter().all(|i| i.risk_score >= policy.thresholds.high));
        assert!(group.medium_risk_items.iter().all(|i| {
            i.risk_score >= policy.thresholds.medium && i.risk_score < policy.thresholds.high
        }));
        assert!(!group.general_recommendation.is_empty());
    }

    assert!(recs.total.high_risk_items.len() <= policy.recommendation_top_n);
    let scores: Vec<f64> = recs.total.high_risk_items.iter().map(|i| i.risk_score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    assert!(recs
        .probability
        .high_risk_items
        .iter()
        .any(|i| i.question_id == 2001));
    assert!(recs
        .impact
        .high_risk_items
        .iter()
        .any(|i| i.question_id == 4001));
}

#[test]
fn test_weighted_section_sum_variant() {
    let questionnaire = Questionnaire::builtin().unwrap();
    let mut store = MemoryStore::with_questionnaire(&questionnaire);
    store.upsert_facility(&facility("dc-3")).unwrap();
    store
        .upsert_answer(&Answer {
            numeric_value: Some(25.0),
            ..answer("dc-3", 2001, 0)
        })
        .unwrap();

    let engine = RiskEngine::new(store, ScoringPolicy::weighted_section_sum());
    let record = engine.compute_risk_score("dc-3").unwrap();
    // Only section 2 scored, so its score is the total
    assert_eq!(record.total_score, 100.0);
    assert_eq!(record.risk_level, RiskLevel::High);
}

#[test]
fn test_score_all_persists_every_facility() {
    let mut engine = builtin_engine();
    let store = engine.store_mut();
    store.upsert_facility(&facility("dc-0")).unwrap();
    store
        .upsert_answer(&Answer {
            numeric_value: Some(5.0),
            ..answer("dc-0", 2001, 0)
        })
        .unwrap();

    let mut seen = Vec::new();
    let records = engine.score_all(|r| seen.push(r.facility_id.clone())).unwrap();
    assert_eq!(records.len(), 2);
    for id in ["dc-0", "dc-1"] {
        assert!(seen.iter().any(|s| s == id));
        let stored = engine.store().risk_score(id).unwrap().unwrap();
        assert_eq!(Some(&stored), records.iter().find(|r| r.facility_id == id));
    }
}

fn cooling_only(policy: ScoringPolicy, selected: &str) -> siterisk_core::RiskScoreRecord {
    let questionnaire = Questionnaire::builtin().unwrap();
    let mut store = MemoryStore::with_questionnaire(&questionnaire);
    store.upsert_facility(&facility("dc-4")).unwrap();
    store
        .upsert_answer(&Answer {
            selected_options: Some(json!([selected])),
            ..answer("dc-4", 3002, 0)
        })
        .unwrap();
    RiskEngine::new(store, policy)
        .compute_risk_score("dc-4")
        .unwrap()
}

#[test]
fn test_section_sum_ranks_stronger_cooling_lower() {
    let redundant = cooling_only(ScoringPolicy::weighted_section_sum(), "2n-redundant");
    let none = cooling_only(ScoringPolicy::weighted_section_sum(), "none");

    assert!(redundant.total_score < none.total_score);
    assert_eq!(redundant.total_score, 0.0);
    assert_eq!(redundant.risk_level, RiskLevel::Low);
    assert_eq!(none.total_score, 100.0);
    assert_eq!(none.risk_level, RiskLevel::High);
    // The mitigation axis still reads as maturity
    assert!(redundant.mitigation_score > none.mitigation_score);

    let section = redundant.sections.iter().find(|s| s.section_id == 3).unwrap();
    assert_eq!(section.section_score, 0.0);
}

#[test]
fn test_blank_answer_leaves_axis_denominator() {
    let mut engine = builtin_engine();
    let store = engine.store_mut();
    store
        .upsert_answer(&Answer {
            value: Some("unknown".into()),
            ..answer("dc-1", 2004, 1)
        })
        .unwrap();
    store
        .upsert_answer(&Answer {
            value: Some("".into()),
            ..answer("dc-1", 2007, 2)
        })
        .unwrap();
    store
        .upsert_answer(&Answer {
            selected_options: Some(json!([])),
            ..answer("dc-1", 2001, 3)
        })
        .unwrap();

    let record = engine.compute_risk_score("dc-1").unwrap();
    assert_eq!(record.answered, 1);
    assert_eq!(record.contributions.len(), 1);
    assert_eq!(record.probability_score, 5.0);
    assert_eq!(record.computed_at, Some(at(1)));
}
