use serde_json::{json, Map, Value};

use super::AnalysisKind;

/// A named scalar metric with its inclusive range
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
}

/// The output contract a backend must honour for one analysis kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSchema {
    pub kind: AnalysisKind,
    /// The first metric is the primary one used by tier rules.
    pub metrics: Vec<MetricSpec>,
    /// Declared quality tier, if the kind carries one
    pub tier_field: Option<&'static str>,
    pub text_fields: Vec<&'static str>,
}

impl ResultSchema {
    pub fn primary_metric(&self) -> &MetricSpec {
        &self.metrics[0]
    }

    /// JSON skeleton embedded in prompts so models answer in shape.
    pub fn template(&self) -> Value {
        let mut obj = Map::new();
        for m in &self.metrics {
            obj.insert(m.name.to_string(), json!(format!("<number {}-{}>", m.min, m.max)));
        }
        if let Some(tier) = self.tier_field {
            obj.insert(tier.to_string(), json!("<low|medium|high>"));
        }
        for t in &self.text_fields {
            obj.insert(t.to_string(), json!("<text>"));
        }
        Value::Object(obj)
    }
}

lazy_static::lazy_static! {
    static ref COGNITIVE: ResultSchema = ResultSchema {
        kind: AnalysisKind::Cognitive,
        metrics: vec![MetricSpec { name: "score", min: 0.0, max: 100.0 }],
        tier_field: Some("tier"),
        text_fields: vec!["summary", "reasoning"],
    };

    static ref PSYCHOLOGICAL: ResultSchema = ResultSchema {
        kind: AnalysisKind::Psychological,
        metrics: vec![MetricSpec { name: "stability_index", min: 0.0, max: 10.0 }],
        tier_field: Some("confidence"),
        text_fields: vec!["profile", "summary"],
    };
}

pub(super) fn schema_for(kind: AnalysisKind) -> &'static ResultSchema {
    match kind {
        AnalysisKind::Cognitive => &COGNITIVE,
        AnalysisKind::Psychological => &PSYCHOLOGICAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_lists_all_fields() {
        let template = AnalysisKind::Psychological.schema().template();
        for field in ["stability_index", "confidence", "profile", "summary"] {
            assert!(template.get(field).is_some(), "missing {}", field);
        }
    }
}
