//! Configuration file support for siterisk
//!
//! Loads scoring policy, storage and auth settings from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.siteriskrc.json` in the working directory
//! 3. `siterisk.config.json` in the working directory
//!
//! All fields are optional. CLI flags take precedence over config file values.

use crate::auth::AuthMode;
use crate::policy::{KeywordRule, MultiselectStrategy, ScoreScale, ScoringPolicy, TotalFormula};
use crate::risk::LevelThresholds;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default database file, relative to the working directory
pub const DEFAULT_DATABASE: &str = "siterisk.db";

/// Siterisk configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteriskConfig {
    /// Score range (default: one-to-five)
    #[serde(default)]
    pub scale: Option<ScoreScale>,

    /// Scale the catalog's `risk_score` values are written on (default: one-to-five)
    #[serde(default)]
    pub metadata_scale: Option<ScoreScale>,

    /// Total formula (default: axis-product)
    #[serde(default)]
    pub formula: Option<TotalFormula>,

    /// Multiselect strategy (default: weighted-average)
    #[serde(default)]
    pub multiselect: Option<MultiselectStrategy>,

    /// Axis score used when nothing contributed (default: scale midpoint)
    #[serde(default)]
    pub neutral_score: Option<f64>,

    /// Score used when metadata cannot resolve an answer (default: scale midpoint)
    #[serde(default)]
    pub fallback_score: Option<f64>,

    /// Read mitigation answers as maturity (default: true)
    #[serde(default)]
    pub invert_mitigation: Option<bool>,

    /// Risk level thresholds
    #[serde(default)]
    pub thresholds: Option<ThresholdConfig>,

    /// Items per bucket in the cross-axis recommendation group (default: 5)
    #[serde(default)]
    pub recommendation_top_n: Option<usize>,

    /// Optional keyword rules for free-text answers, first match wins
    #[serde(default)]
    pub text_keywords: Vec<KeywordConfig>,

    /// SQLite database path (default: siterisk.db)
    #[serde(default)]
    pub database: Option<PathBuf>,

    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

/// Custom risk level thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdConfig {
    /// Lower bound of medium (default: 2 on one-to-five, 50 on percent)
    pub medium: Option<f64>,
    /// Lower bound of high (default: 4 on one-to-five, 75 on percent)
    pub high: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeywordConfig {
    /// Regular expression matched against the trimmed answer text
    pub pattern: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// `token -> user` table for token mode
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
}

/// Resolved configuration with compiled keyword rules
#[derive(Debug)]
pub struct ResolvedConfig {
    pub policy: ScoringPolicy,
    pub database: PathBuf,
    pub auth_mode: AuthMode,
    pub auth_tokens: BTreeMap<String, String>,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

impl SiteriskConfig {
    fn scale(&self) -> ScoreScale {
        self.scale.unwrap_or(ScoreScale::OneToFive)
    }

    fn thresholds(&self) -> LevelThresholds {
        let defaults = self.scale().default_thresholds();
        match &self.thresholds {
            Some(t) => LevelThresholds {
                medium: t.medium.unwrap_or(defaults.medium),
                high: t.high.unwrap_or(defaults.high),
            },
            None => defaults,
        }
    }

    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        let scale = self.scale();
        let (min, max) = (scale.min(), scale.max());
        let in_scale = |v: f64| v.is_finite() && v >= min && v <= max;

        if let Some(n) = self.neutral_score {
            if !in_scale(n) || n <= 0.0 {
                anyhow::bail!(
                    "neutral_score must be positive and within {}..={} (got {})",
                    min,
                    max,
                    n
                );
            }
        }

        if let Some(f) = self.fallback_score {
            if !in_scale(f) {
                anyhow::bail!("fallback_score must be within {}..={} (got {})", min, max, f);
            }
        }

        let t = self.thresholds();
        if !in_scale(t.medium) {
            anyhow::bail!("thresholds.medium must be within {}..={} (got {})", min, max, t.medium);
        }
        if !in_scale(t.high) {
            anyhow::bail!("thresholds.high must be within {}..={} (got {})", min, max, t.high);
        }
        if t.medium >= t.high {
            anyhow::bail!(
                "thresholds must be ordered: medium ({}) < high ({})",
                t.medium,
                t.high
            );
        }

        if self.recommendation_top_n == Some(0) {
            anyhow::bail!("recommendation_top_n must be at least 1");
        }

        for rule in &self.text_keywords {
            Regex::new(&rule.pattern)
                .with_context(|| format!("invalid text_keywords pattern: {}", rule.pattern))?;
            if !in_scale(rule.score) {
                anyhow::bail!(
                    "text_keywords score for {:?} must be within {}..={} (got {})",
                    rule.pattern,
                    min,
                    max,
                    rule.score
                );
            }
        }

        if let Some(auth) = &self.auth {
            if auth.mode == AuthMode::Token && auth.tokens.is_empty() {
                anyhow::bail!("auth.tokens must not be empty in token mode");
            }
        }

        Ok(())
    }

    /// Resolve config into compiled form ready for use
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let mut policy = ScoringPolicy::for_scale(
            self.scale(),
            self.formula.unwrap_or(TotalFormula::AxisProduct),
        );
        if let Some(m) = self.metadata_scale {
            policy.metadata_scale = m;
        }
        if let Some(m) = self.multiselect {
            policy.multiselect = m;
        }
        if let Some(n) = self.neutral_score {
            policy.neutral_score = n;
        }
        if let Some(f) = self.fallback_score {
            policy.fallback_score = f;
        }
        if let Some(inv) = self.invert_mitigation {
            policy.invert_mitigation = inv;
        }
        if let Some(top) = self.recommendation_top_n {
            policy.recommendation_top_n = top;
        }
        policy.thresholds = self.thresholds();
        policy.keywords = self
            .text_keywords
            .iter()
            .map(|k| {
                Ok(KeywordRule {
                    pattern: Regex::new(&k.pattern)?,
                    score: k.score,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let auth = self.auth.clone().unwrap_or_default();

        Ok(ResolvedConfig {
            policy,
            database: self
                .database
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            auth_mode: auth.mode,
            auth_tokens: auth.tokens,
            config_path: None,
        })
    }
}

/// Printable view of a resolved configuration; token values are omitted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSummary {
    pub source: Option<PathBuf>,
    pub scale: ScoreScale,
    pub metadata_scale: ScoreScale,
    pub formula: TotalFormula,
    pub multiselect: MultiselectStrategy,
    pub neutral_score: f64,
    pub fallback_score: f64,
    pub invert_mitigation: bool,
    pub thresholds: ThresholdConfig,
    pub recommendation_top_n: usize,
    pub text_keywords: Vec<KeywordConfig>,
    pub database: PathBuf,
    pub auth_mode: AuthMode,
    pub auth_users: Vec<String>,
}

impl ResolvedConfig {
    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults() -> Result<Self> {
        SiteriskConfig::default().resolve()
    }

    pub fn summary(&self) -> ConfigSummary {
        let p = &self.policy;
        let mut auth_users: Vec<String> = self.auth_tokens.values().cloned().collect();
        auth_users.sort();
        auth_users.dedup();
        ConfigSummary {
            source: self.config_path.clone(),
            scale: p.scale,
            metadata_scale: p.metadata_scale,
            formula: p.formula,
            multiselect: p.multiselect,
            neutral_score: p.neutral_score,
            fallback_score: p.fallback_score,
            invert_mitigation: p.invert_mitigation,
            thresholds: ThresholdConfig {
                medium: Some(p.thresholds.medium),
                high: Some(p.thresholds.high),
            },
            recommendation_top_n: p.recommendation_top_n,
            text_keywords: p
                .keywords
                .iter()
                .map(|k| KeywordConfig {
                    pattern: k.pattern.as_str().to_string(),
                    score: k.score,
                })
                .collect(),
            database: self.database.clone(),
            auth_mode: self.auth_mode,
            auth_users,
        }
    }
}

/// Discover and load a config file from the working directory
///
/// Search order:
/// 1. `.siteriskrc.json`
/// 2. `siterisk.config.json`
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(root: &Path) -> Result<Option<(SiteriskConfig, PathBuf)>> {
    for name in [".siteriskrc.json", "siterisk.config.json"] {
        let path = root.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<SiteriskConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: SiteriskConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config in `root`.
/// Returns default config if nothing is found.
pub fn load_and_resolve(root: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(root)? {
            Some((config, path)) => (config, Some(path)),
            None => (SiteriskConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config_is_valid() {
        let config = SiteriskConfig::default();
        config.validate().expect("default config should be valid");
        let resolved = config.resolve().expect("default config should resolve");
        assert_eq!(resolved.policy.scale, ScoreScale::OneToFive);
        assert_eq!(resolved.policy.formula, TotalFormula::AxisProduct);
        assert_eq!(resolved.policy.neutral_score, 3.0);
        assert_eq!(resolved.policy.thresholds.medium, 2.0);
        assert_eq!(resolved.policy.thresholds.high, 4.0);
        assert_eq!(resolved.database, PathBuf::from(DEFAULT_DATABASE));
        assert_eq!(resolved.auth_mode, AuthMode::Dev);
    }

    #[test]
    fn test_parse_minimal_config() {
        let json = r#"{}"#;
        let config: SiteriskConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "scale": "percent",
            "metadata_scale": "percent",
            "formula": "weighted-section-sum",
            "multiselect": "high-risk-fraction",
            "neutral_score": 40,
            "fallback_score": 50,
            "invert_mitigation": false,
            "thresholds": {"medium": 45, "high": 80},
            "recommendation_top_n": 3,
            "text_keywords": [{"pattern": "(?i)none", "score": 100}],
            "database": "data/risk.db",
            "auth": {"mode": "token", "tokens": {"abc": "alice"}}
        }"#;
        let config: SiteriskConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        let resolved = config.resolve().unwrap();
        let p = &resolved.policy;
        assert_eq!(p.scale, ScoreScale::Percent);
        assert_eq!(p.metadata_scale, ScoreScale::Percent);
        assert_eq!(p.metadata_score(40.0), Some(40.0));
        assert_eq!(p.formula, TotalFormula::WeightedSectionSum);
        assert_eq!(p.multiselect, MultiselectStrategy::HighRiskFraction);
        assert_eq!(p.neutral_score, 40.0);
        assert_eq!(p.fallback_score, 50.0);
        assert!(!p.invert_mitigation);
        assert_eq!(p.thresholds.medium, 45.0);
        assert_eq!(p.recommendation_top_n, 3);
        assert_eq!(p.keyword_score("None installed"), Some(100.0));
        assert_eq!(resolved.database, PathBuf::from("data/risk.db"));
        assert_eq!(resolved.auth_mode, AuthMode::Token);
    }

    #[test]
    fn test_percent_scale_uses_percent_thresholds() {
        let config: SiteriskConfig = serde_json::from_str(r#"{"scale": "percent"}"#).unwrap();
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.policy.thresholds.high, 75.0);
        assert_eq!(resolved.policy.neutral_score, 50.0);
        assert_eq!(resolved.policy.metadata_scale, ScoreScale::OneToFive);
        assert_eq!(resolved.policy.metadata_score(5.0), Some(100.0));
    }

    #[test]
    fn test_reject_unknown_fields() {
        let json = r#"{"unknown_field": true}"#;
        let result: Result<SiteriskConfig, _> = serde_json::from_str(json);
        assert!(result.is_err(), "unknown fields should be rejected");
    }

    #[test]
    fn test_reject_unknown_formula() {
        let result: Result<SiteriskConfig, _> = serde_json::from_str(r#"{"formula": "magic"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_reject_out_of_scale_neutral() {
        let config: SiteriskConfig = serde_json::from_str(r#"{"neutral_score": 7}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_zero_neutral_on_percent() {
        let config: SiteriskConfig =
            serde_json::from_str(r#"{"scale": "percent", "neutral_score": 0}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_unordered_thresholds() {
        let json = r#"{"thresholds": {"medium": 4.0, "high": 2.0}}"#;
        let config: SiteriskConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_invalid_keyword_pattern() {
        let json = r#"{"text_keywords": [{"pattern": "(unclosed", "score": 3}]}"#;
        let config: SiteriskConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_token_mode_without_tokens() {
        let config: SiteriskConfig =
            serde_json::from_str(r#"{"auth": {"mode": "token"}}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_zero_top_n() {
        let config: SiteriskConfig =
            serde_json::from_str(r#"{"recommendation_top_n": 0}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_discover_siteriskrc() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join(".siteriskrc.json");
        fs::write(&config_path, r#"{"neutral_score": 2.5}"#).unwrap();

        let result = discover_config(dir.path()).unwrap();
        assert!(result.is_some());
        let (config, path) = result.unwrap();
        assert_eq!(config.neutral_score, Some(2.5));
        assert_eq!(path, config_path);
    }

    #[test]
    fn test_discover_siterisk_config_json() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("siterisk.config.json");
        fs::write(&config_path, r#"{"recommendation_top_n": 10}"#).unwrap();

        let (config, _) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.recommendation_top_n, Some(10));
    }

    #[test]
    fn test_discover_priority_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".siteriskrc.json"), r#"{"neutral_score": 2.0}"#).unwrap();
        fs::write(dir.path().join("siterisk.config.json"), r#"{"neutral_score": 4.0}"#).unwrap();

        let (config, _) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.neutral_score, Some(2.0));
    }

    #[test]
    fn test_no_config_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_config(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_and_resolve_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = load_and_resolve(dir.path(), None).unwrap();
        assert!(resolved.config_path.is_none());
        assert_eq!(resolved.policy.recommendation_top_n, 5);
    }

    #[test]
    fn test_load_and_resolve_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        fs::write(&path, r#"{"invert_mitigation": false}"#).unwrap();

        let resolved = load_and_resolve(dir.path(), Some(&path)).unwrap();
        assert_eq!(resolved.config_path, Some(path));
        assert!(!resolved.policy.invert_mitigation);
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"thresholds": {"medium": 9}}"#).unwrap();
        let err = load_config_file(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("bad.json"));
    }

    #[test]
    fn test_summary_hides_token_values() {
        let config: SiteriskConfig = serde_json::from_str(
            r#"{"auth": {"mode": "token", "tokens": {"t1": "bob", "t2": "alice"}}}"#,
        )
        .unwrap();
        let summary = config.resolve().unwrap().summary();
        assert_eq!(summary.auth_mode, AuthMode::Token);
        assert_eq!(summary.auth_users, vec!["alice", "bob"]);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("t1"));
        assert!(json.contains("\"formula\":\"axis-product\""));
    }
}
