use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AcceptabilityChecker, Verdict};
use crate::analysis::{AnalysisKind, AnalysisResult};
use crate::config::ConfigError;

/// A declared tier that is only credible above a primary-metric floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierRule {
    pub kind: AnalysisKind,
    pub tier: String,
    pub min_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Case-insensitive regex patterns that must not appear in any text field
    pub forbidden_phrases: Vec<String>,
    pub tier_rules: Vec<TierRule>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            forbidden_phrases: vec![
                r"as an ai(\s+language)?\s+model".to_string(),
                r"i\s+(cannot|can't)\s+(analy[sz]e|assess)".to_string(),
                r"lorem ipsum".to_string(),
            ],
            tier_rules: vec![
                TierRule { kind: AnalysisKind::Cognitive, tier: "high".to_string(), min_score: 70.0 },
                TierRule { kind: AnalysisKind::Psychological, tier: "high".to_string(), min_score: 6.0 },
            ],
        }
    }
}

/// Schema-driven checker for every analysis kind
pub struct ContractChecker {
    forbidden: Vec<(Regex, String)>,
    tier_rules: Vec<TierRule>,
}

impl ContractChecker {
    pub fn new(config: &CheckerConfig) -> Result<Self, ConfigError> {
        let forbidden = config
            .forbidden_phrases
            .iter()
            .map(|p| {
                Regex::new(&format!("(?i){}", p))
                    .map(|re| (re, p.clone()))
                    .map_err(|e| ConfigError::Invalid(format!("forbidden phrase {:?}: {}", p, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            forbidden,
            tier_rules: config.tier_rules.clone(),
        })
    }

    fn check_metrics(&self, result: &AnalysisResult, verdict: &mut Verdict) {
        for metric in &result.kind().schema().metrics {
            match result.number(metric.name) {
                None => verdict.add_violation(format!("missing metric: {}", metric.name)),
                Some(v) if !(metric.min..=metric.max).contains(&v) => verdict.add_violation(format!(
                    "metric out of range: {} (expected {}-{})",
                    metric.name, metric.min, metric.max
                )),
                Some(_) => {}
            }
        }
    }

    fn check_texts(&self, result: &AnalysisResult, verdict: &mut Verdict) {
        let schema = result.kind().schema();
        for field in &schema.text_fields {
            match result.text(field) {
                Some(text) if !text.trim().is_empty() => {
                    for (re, phrase) in &self.forbidden {
                        if re.is_match(text) {
                            verdict.add_violation(format!("forbidden phrase in {}: {}", field, phrase));
                        }
                    }
                }
                _ => verdict.add_violation(format!("missing text: {}", field)),
            }
        }
    }

    fn check_tier(&self, result: &AnalysisResult, verdict: &mut Verdict) {
        let schema = result.kind().schema();
        let Some(tier_field) = schema.tier_field else { return };

        let declared = match result.fields().get(tier_field) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_lowercase(),
            _ => {
                verdict.add_violation(format!("missing tier: {}", tier_field));
                return;
            }
        };

        let primary = schema.primary_metric();
        // An absent or non-numeric metric was already reported.
        let Some(score) = result.number(primary.name) else { return };

        for rule in self.tier_rules.iter().filter(|r| r.kind == result.kind()) {
            if declared == rule.tier.to_lowercase() && score < rule.min_score {
                verdict.add_violation(format!(
                    "tier {} requires {} >= {}",
                    rule.tier, primary.name, rule.min_score
                ));
            }
        }
    }
}

impl AcceptabilityChecker for ContractChecker {
    fn check(&self, result: &AnalysisResult) -> Verdict {
        let mut verdict = Verdict::pass();
        self.check_metrics(result, &mut verdict);
        self.check_tier(result, &mut verdict);
        self.check_texts(result, &mut verdict);
        verdict
    }
}
