//! Wire Protocol
//!
//! Frame layout and JSON shapes seen by clients. Any change here breaks every
//! deployed client, so the format is versioned and pinned by tests.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backend::BackendId;
use crate::ledger::LedgerDelta;
use crate::orchestrator::{AggregateOutcome, BackendOutcome, StreamEvent};

pub const PROTOCOL_VERSION: u32 = 1;
/// Response header carrying [`PROTOCOL_VERSION`] on every analysis response
pub const VERSION_HEADER: &str = "x-verdict-protocol";

const FRAME_PREFIX: &str = "data: ";
const FRAME_SUFFIX: &str = "\n\n";

/// JSON payload of one streamed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WireEvent {
    Completed {
        provider: String,
        result: Value,
    },
    Error {
        /// `null` for admission denials, which concern no single provider
        provider: Option<String>,
        error: String,
    },
    Done {
        #[serde(rename = "updatedCredits")]
        updated_credits: Option<LedgerDelta>,
    },
}

impl From<&StreamEvent> for WireEvent {
    fn from(event: &StreamEvent) -> Self {
        match event {
            StreamEvent::Completed { backend, invocation } => WireEvent::Completed {
                provider: backend.alias().to_string(),
                result: Value::Object(invocation.result.fields().clone()),
            },
            StreamEvent::Errored { backend, reason } => WireEvent::Error {
                provider: Some(backend.alias().to_string()),
                error: reason.clone(),
            },
            StreamEvent::Denied { reason } => WireEvent::Error { provider: None, error: reason.clone() },
            StreamEvent::Done { credits } => WireEvent::Done { updated_credits: *credits },
        }
    }
}

impl WireEvent {
    pub fn backend(&self) -> Option<BackendId> {
        match self {
            WireEvent::Completed { provider, .. } => BackendId::from_alias(provider),
            WireEvent::Error { provider: Some(p), .. } => BackendId::from_alias(p),
            _ => None,
        }
    }
}

/// JSON body of one frame, without the `data: ` framing.
pub fn event_json(event: &StreamEvent) -> String {
    // Serialising these shapes cannot fail: every key is a string and
    // every value is already JSON.
    serde_json::to_string(&WireEvent::from(event)).unwrap_or_else(|_| "{}".to_string())
}

/// `data: <json>\n\n`
pub fn encode_frame(event: &StreamEvent) -> String {
    format!("{}{}{}", FRAME_PREFIX, event_json(event), FRAME_SUFFIX)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame does not start with `data: `")]
    MissingPrefix,
    #[error("invalid frame payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Parses one frame, with or without its trailing blank line.
pub fn decode_frame(frame: &str) -> Result<WireEvent, FrameError> {
    let body = frame
        .strip_prefix(FRAME_PREFIX)
        .ok_or(FrameError::MissingPrefix)?
        .trim_end_matches('\n');
    Ok(serde_json::from_str(body)?)
}

/// Splits a raw SSE body into its frames.
pub fn decode_body(body: &str) -> Result<Vec<WireEvent>, FrameError> {
    body.split(FRAME_SUFFIX)
        .filter(|f| !f.trim().is_empty())
        .map(decode_frame)
        .collect()
}

/// Blocking response: `{ "<alias>": <result> | {"error": "<reason>"} }`
pub fn outcome_body(outcome: &AggregateOutcome) -> Value {
    let mut body = Map::new();
    for (id, entry) in outcome.iter() {
        let value = match entry {
            BackendOutcome::Completed(inv) => Value::Object(inv.result.fields().clone()),
            BackendOutcome::Failed(e) => serde_json::json!({ "error": e.to_string() }),
        };
        body.insert(id.alias().to_string(), value);
    }
    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisKind, AnalysisResult};
    use crate::orchestrator::{AttemptStatus, Invocation};
    use serde_json::json;

    fn completed() -> StreamEvent {
        StreamEvent::Completed {
            backend: BackendId::A,
            invocation: Invocation {
                result: AnalysisResult::from_value(AnalysisKind::Cognitive, json!({"score": 90})).unwrap(),
                attempts: 1,
                status: AttemptStatus::Accepted,
                violations: vec![],
            },
        }
    }

    #[test]
    fn test_completed_frame_bytes() {
        assert_eq!(
            encode_frame(&completed()),
            "data: {\"status\":\"completed\",\"provider\":\"provider-1\",\"result\":{\"score\":90}}\n\n"
        );
    }

    #[test]
    fn test_error_and_done_frames() {
        let err = StreamEvent::Errored { backend: BackendId::C, reason: "backend unreachable: refused".to_string() };
        assert_eq!(
            encode_frame(&err),
            "data: {\"status\":\"error\",\"provider\":\"provider-3\",\"error\":\"backend unreachable: refused\"}\n\n"
        );

        let done = StreamEvent::Done { credits: Some(LedgerDelta { balance: 7, charged: 2 }) };
        assert_eq!(
            encode_frame(&done),
            "data: {\"status\":\"done\",\"updatedCredits\":{\"balance\":7,\"charged\":2}}\n\n"
        );
    }

    #[test]
    fn test_denied_has_null_provider() {
        let frame = encode_frame(&StreamEvent::Denied { reason: "insufficient credits".to_string() });
        let value: Value = serde_json::from_str(frame.trim_start_matches("data: ").trim_end()).unwrap();
        assert_eq!(value, json!({"status": "error", "provider": null, "error": "insufficient credits"}));
    }

    #[test]
    fn test_decode_body() {
        let body = format!("{}{}", encode_frame(&completed()), encode_frame(&StreamEvent::Done { credits: None }));
        let events = decode_body(&body).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].backend(), Some(BackendId::A));
        assert_eq!(events[1], WireEvent::Done { updated_credits: None });
        assert!(matches!(decode_frame("event: x"), Err(FrameError::MissingPrefix)));
    }
}
