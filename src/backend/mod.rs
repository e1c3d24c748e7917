//! Backend Module
//!
//! Analysis backends behind one capability trait, the registry the
//! orchestrator iterates, and the fixed internal→public alias table.

mod llm;
mod provider;

pub use llm::LlmBackend;
pub use provider::{LLMProvider, OllamaProvider, OpenAICompatibleProvider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::analysis::{AnalysisInput, AnalysisResult};

/// Internal backend token.
///
/// Never shown to callers; they only see the alias from [`BackendId::alias`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BackendId {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
}

/// Public wire protocol. Entries must never be renamed or reassigned, and
/// each sits at its identifier's discriminant.
pub const ALIAS_TABLE: [(BackendId, &str); 4] = [
    (BackendId::A, "provider-1"),
    (BackendId::B, "provider-2"),
    (BackendId::C, "provider-3"),
    (BackendId::D, "provider-4"),
];

impl BackendId {
    pub fn alias(&self) -> &'static str {
        ALIAS_TABLE[*self as usize].1
    }

    pub fn from_alias(alias: &str) -> Option<Self> {
        ALIAS_TABLE.iter().find(|(_, a)| *a == alias).map(|(id, _)| *id)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::A => "A",
            BackendId::B => "B",
            BackendId::C => "C",
            BackendId::D => "D",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hard failures of a backend call. None of these are retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("backend timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("backend returned malformed output: {0}")]
    Malformed(String),
    #[error("backend rejected credentials: {0}")]
    Auth(String),
    #[error("backend worker terminated: {0}")]
    Crashed(String),
}

/// One opaque analysis service.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    fn id(&self) -> BackendId;

    /// `feedback` carries the violations of the previous attempt, if any.
    async fn analyze(&self, input: &AnalysisInput, feedback: Option<&str>) -> Result<AnalysisResult, BackendError>;
}

/// Registry of configured backends, iterated in identifier order
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<BackendId, Arc<dyn AnalysisBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers under the backend's own id, replacing any previous entry.
    pub fn register(&mut self, backend: Arc<dyn AnalysisBackend>) {
        let id = backend.id();
        if self.backends.insert(id, backend).is_some() {
            tracing::warn!("Backend {} registered twice; keeping the latest", id);
        }
    }

    pub fn register_instance<B: AnalysisBackend + 'static>(&mut self, backend: B) {
        self.register(Arc::new(backend));
    }

    pub fn get(&self, id: BackendId) -> Option<Arc<dyn AnalysisBackend>> {
        self.backends.get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<BackendId> {
        self.backends.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BackendId, &Arc<dyn AnalysisBackend>)> {
        self.backends.iter().map(|(id, b)| (*id, b))
    }
}
