//! Analysis Domain Types
//!
//! The immutable request input, the kind tag that selects a prompt/schema,
//! and the structured result a backend hands back.

mod schema;

pub use schema::{MetricSpec, ResultSchema};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Default upper bound on accepted input text, in characters
pub const DEFAULT_MAX_INPUT_CHARS: usize = 50_000;

/// Which prompt/schema family a backend should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Cognitive,
    Psychological,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Cognitive => "cognitive",
            AnalysisKind::Psychological => "psychological",
        }
    }

    pub fn schema(&self) -> &'static ResultSchema {
        schema::schema_for(*self)
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cognitive" => Ok(AnalysisKind::Cognitive),
            "psychological" => Ok(AnalysisKind::Psychological),
            other => Err(InputError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("input text is empty")]
    Empty,
    #[error("input text is {len} characters, limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("unknown analysis kind: {0}")]
    UnknownKind(String),
}

/// Already-extracted text plus the analysis kind.
///
/// Cloning is cheap: every worker shares the same text allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisInput {
    text: Arc<str>,
    kind: AnalysisKind,
}

impl AnalysisInput {
    pub fn new(text: impl AsRef<str>, kind: AnalysisKind) -> Result<Self, InputError> {
        Self::with_limit(text, kind, DEFAULT_MAX_INPUT_CHARS)
    }

    pub fn with_limit(text: impl AsRef<str>, kind: AnalysisKind, max_chars: usize) -> Result<Self, InputError> {
        let text = text.as_ref();
        if text.trim().is_empty() {
            return Err(InputError::Empty);
        }
        let len = text.chars().count();
        if len > max_chars {
            return Err(InputError::TooLong { len, max: max_chars });
        }
        Ok(Self { text: Arc::from(text), kind })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> AnalysisKind {
        self.kind
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// A structured verdict from one backend.
///
/// Serialises as the bare JSON object; the kind travels alongside so the
/// checker knows which schema applies.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    kind: AnalysisKind,
    fields: Map<String, Value>,
}

impl AnalysisResult {
    pub fn new(kind: AnalysisKind, fields: Map<String, Value>) -> Self {
        Self { kind, fields }
    }

    /// Fails when `value` is not a JSON object.
    pub fn from_value(kind: AnalysisKind, value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { kind, fields }),
            _ => None,
        }
    }

    pub fn kind(&self) -> AnalysisKind {
        self.kind
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(Value::as_f64)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

impl Serialize for AnalysisResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}
