//! Reporting and output generation
//!
//! Global invariants enforced:
//! - Deterministic output ordering
//! - Byte-for-byte identical output across runs for the same inputs

use crate::aggregates::RiskScoreRecord;
use crate::config::ConfigSummary;
use crate::progress::ProgressReport;
use crate::recommend::{CategoryRecommendations, RiskRecommendations};
use crate::reconcile::ReconcileSummary;
use crate::validate::ScoreValidation;
use serde::Serialize;

/// Render a score record as text output
pub fn render_record_text(record: &RiskScoreRecord) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Facility {}  ({} / {})\n",
        record.facility_id,
        record.formula.as_str(),
        record.scale.as_str()
    ));
    output.push_str(&format!(
        "{:<12} {:<8} {:<8} {:<8} {}\n",
        "LEVEL", "TOTAL", "PROB", "IMPACT", "MITIG"
    ));
    output.push_str(&format!(
        "{:<12} {:<8.2} {:<8.2} {:<8.2} {:.2}\n",
        record.risk_level.as_str(),
        record.total_score,
        record.probability_score,
        record.impact_score,
        record.mitigation_score
    ));

    if !record.sections.is_empty() {
        output.push('\n');
        output.push_str(&format!(
            "{:<4} {:<30} {:<7} {:<8} {:<12} {}\n",
            "ID", "SECTION", "WEIGHT", "SCORE", "LEVEL", "ANSWERED"
        ));
        for s in &record.sections {
            output.push_str(&format!(
                "{:<4} {:<30} {:<7.2} {:<8.2} {:<12} {}/{}\n",
                s.section_id,
                truncate_or_pad(&s.name, 30),
                s.weight,
                s.section_score,
                s.risk_level.as_str(),
                s.contributing,
                s.answered,
            ));
        }
    }

    if !record.contributions.is_empty() {
        output.push('\n');
        output.push_str(&format!(
            "{:<8} {:<12} {:<6} {:<6} {:<6} {}\n",
            "QUESTION", "AXIS", "RAW", "AXIS", "WEIGHT", "SOURCE"
        ));
        for c in &record.contributions {
            output.push_str(&format!(
                "{:<8} {:<12} {:<6.2} {:<6.2} {:<6.2} {}\n",
                c.question_id,
                c.factor.as_str(),
                c.risk_score,
                c.axis_score,
                c.weight,
                c.source.as_str(),
            ));
        }
    }

    if let Some(at) = record.computed_at {
        output.push_str(&format!("\nBased on answers up to {}\n", at.to_rfc3339()));
    }

    output
}

/// Render a batch of records as a one-line-per-facility table
pub fn render_summary_text(records: &[RiskScoreRecord]) -> String {
    let mut output = format!(
        "{:<20} {:<12} {:<8} {:<8} {:<8} {}\n",
        "FACILITY", "LEVEL", "TOTAL", "PROB", "IMPACT", "MITIG"
    );
    for r in records {
        output.push_str(&format!(
            "{:<20} {:<12} {:<8.2} {:<8.2} {:<8.2} {:.2}\n",
            truncate_or_pad(&r.facility_id, 20),
            r.risk_level.as_str(),
            r.total_score,
            r.probability_score,
            r.impact_score,
            r.mitigation_score
        ));
    }
    output
}

pub fn render_progress_text(facility_id: &str, progress: &ProgressReport) -> String {
    let mut output = format!(
        "Facility {}: {}% complete ({}/{} required answered)\n",
        facility_id, progress.overall, progress.answered, progress.required
    );
    for s in &progress.sections {
        output.push_str(&format!(
            "  section {:<4} {:>3}%  ({}/{})\n",
            s.section_id, s.percent, s.answered, s.required
        ));
    }
    output
}

fn render_group(output: &mut String, title: &str, group: &CategoryRecommendations) {
    output.push_str(&format!("== {} ==\n", title));
    output.push_str(&format!("{}\n", group.general_recommendation));
    for (label, items) in [("HIGH", &group.high_risk_items), ("MEDIUM", &group.medium_risk_items)] {
        for item in items {
            output.push_str(&format!(
                "  [{:<6}] {:.2}  Q{} {}\n           answer: {}\n           -> {}\n",
                label,
                item.risk_score,
                item.question_id,
                item.question,
                item.answer,
                item.recommendation
            ));
        }
    }
    if group.is_empty() {
        output.push_str("  (no items)\n");
    }
}

pub fn render_recommendations_text(recs: &RiskRecommendations) -> String {
    let mut output = format!(
        "Recommendations for {} (overall level: {})\n\n",
        recs.facility_id,
        recs.risk_level.as_str()
    );
    for (title, group) in recs.groups() {
        render_group(&mut output, title, group);
        output.push('\n');
    }
    output
}

pub fn render_validation_text(v: &ScoreValidation) -> String {
    if v.matches {
        return format!("Facility {}: stored score matches recomputation\n", v.facility_id);
    }
    let mut output = format!(
        "Facility {}: stored score differs from recomputation\n",
        v.facility_id
    );
    output.push_str(&format!("{:<32} {:<14} {}\n", "FIELD", "STORED", "RECOMPUTED"));
    for d in &v.differences {
        output.push_str(&format!(
            "{:<32} {:<14} {}\n",
            truncate_or_pad(&d.field, 32),
            d.stored,
            d.recomputed
        ));
    }
    output
}

pub fn render_reconcile_text(summary: &ReconcileSummary) -> String {
    if summary.fixes.is_empty() {
        return "All questions agree with their sections\n".to_string();
    }
    let mut output = format!(
        "{:<10} {:<8} {:<8} {}\n",
        "QUESTION", "CURRENT", "DERIVED", "ACTION"
    );
    for f in &summary.fixes {
        let action = if f.applicable { "move" } else { "skip" };
        output.push_str(&format!(
            "{:<10} {:<8} {:<8} {}\n",
            f.question_id, f.current_section, f.derived_section, action
        ));
    }
    output.push_str(&format!(
        "{} applied, {} skipped\n",
        summary.applied, summary.skipped
    ));
    output
}

pub fn render_config_text(summary: &ConfigSummary) -> String {
    let mut output = String::from("Configuration:\n");
    match &summary.source {
        Some(p) => output.push_str(&format!("  Source: {}\n", p.display())),
        None => output.push_str("  Source: defaults (no config file found)\n"),
    }
    output.push_str("\nScoring:\n");
    output.push_str(&format!("  scale: {}\n", summary.scale.as_str()));
    output.push_str(&format!(
        "  metadata_scale: {}\n",
        summary.metadata_scale.as_str()
    ));
    output.push_str(&format!("  formula: {}\n", summary.formula.as_str()));
    output.push_str(&format!("  multiselect: {}\n", summary.multiselect.as_str()));
    output.push_str(&format!("  neutral_score: {}\n", summary.neutral_score));
    output.push_str(&format!("  fallback_score: {}\n", summary.fallback_score));
    output.push_str(&format!("  invert_mitigation: {}\n", summary.invert_mitigation));
    output.push_str(&format!(
        "  recommendation_top_n: {}\n",
        summary.recommendation_top_n
    ));
    output.push_str("\nThresholds:\n");
    if let Some(m) = summary.thresholds.medium {
        output.push_str(&format!("  medium: {}\n", m));
    }
    if let Some(h) = summary.thresholds.high {
        output.push_str(&format!("  high: {}\n", h));
    }
    if !summary.text_keywords.is_empty() {
        output.push_str("\nText keywords:\n");
        for k in &summary.text_keywords {
            output.push_str(&format!("  {} => {}\n", k.pattern, k.score));
        }
    }
    output.push_str(&format!("\nDatabase: {}\n", summary.database.display()));
    output.push_str(&format!("Auth: {}", summary.auth_mode.as_str()));
    if !summary.auth_users.is_empty() {
        output.push_str(&format!(" ({})", summary.auth_users.join(", ")));
    }
    output.push('\n');
    output
}

/// Render any report value as JSON output
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Truncate or pad string to fixed width
fn truncate_or_pad(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        format!("{:<width$}", s, width = width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ScoringPolicy;
    use crate::risk::RiskLevel;

    fn record() -> RiskScoreRecord {
        let policy = ScoringPolicy::default();
        RiskScoreRecord {
            facility_id: "dc-tokyo-1".into(),
            scale: policy.scale,
            formula: policy.formula,
            probability_score: 5.0,
            impact_score: 3.0,
            mitigation_score: 5.0,
            total_score: 3.0,
            risk_level: RiskLevel::Medium,
            sections: Vec::new(),
            contributions: Vec::new(),
            answered: 2,
            computed_at: None,
        }
    }

    #[test]
    fn test_record_text() {
        let text = render_record_text(&record());
        assert!(text.contains("dc-tokyo-1"));
        assert!(text.contains("medium"));
        assert!(text.contains("3.00"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let r = record();
        assert_eq!(render_record_text(&r), render_record_text(&r));
        assert_eq!(render_json(&r), render_json(&r));
    }

    #[test]
    fn test_json_uses_snake_case() {
        let json = render_json(&record());
        assert!(json.contains("\"total_score\": 3.0"));
        assert!(json.contains("\"risk_level\": \"medium\""));
        assert!(json.contains("\"formula\": \"axis-product\""));
    }

    #[test]
    fn test_config_text_lists_policy() {
        let summary = crate::config::ResolvedConfig::defaults().unwrap().summary();
        let text = render_config_text(&summary);
        assert!(text.contains("defaults (no config file found)"));
        assert!(text.contains("formula: axis-product"));
        assert!(text.contains("metadata_scale: one-to-five"));
        assert!(text.contains("Auth: dev"));
    }

    #[test]
    fn test_truncate_or_pad() {
        assert_eq!(truncate_or_pad("abc", 5), "abc  ");
        assert_eq!(truncate_or_pad("abcdefgh", 6), "abc...");
        assert_eq!(truncate_or_pad("防災対策テスト", 5), "防災...");
    }
}
