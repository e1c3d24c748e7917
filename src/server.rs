use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Router,
};
use anyhow::{Context, Result};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::analysis::{AnalysisInput, AnalysisKind, InputError};
use crate::orchestrator::{Orchestrator, OrchestratorError};
use crate::protocol;

pub const ACCOUNT_HEADER: &str = "x-account-id";
pub const DEFAULT_ACCOUNT: &str = "anonymous";

// --- Error responses: `{ "message": ... }` with a status per failure class ---
pub enum ServerError {
    BadRequest(String),
    Input(InputError),
    Orchestrator(OrchestratorError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ServerError::BadRequest(message) => (StatusCode::BAD_REQUEST, serde_json::json!({ "message": message })),
            ServerError::Input(e) => (StatusCode::BAD_REQUEST, serde_json::json!({ "message": e.to_string() })),
            ServerError::Orchestrator(OrchestratorError::AdmissionDenied { .. }) => (
                StatusCode::PAYMENT_REQUIRED,
                serde_json::json!({ "message": "Insufficient credits" }),
            ),
            ServerError::Orchestrator(OrchestratorError::TotalFailure { failures }) => {
                let errors: serde_json::Map<String, serde_json::Value> = failures
                    .iter()
                    .map(|(id, e)| (id.alias().to_string(), serde_json::Value::String(e.to_string())))
                    .collect();
                (
                    StatusCode::BAD_GATEWAY,
                    serde_json::json!({ "message": "All providers failed", "errors": errors }),
                )
            }
            ServerError::Orchestrator(OrchestratorError::Ledger(e)) => {
                (StatusCode::SERVICE_UNAVAILABLE, serde_json::json!({ "message": e.to_string() }))
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<InputError> for ServerError {
    fn from(err: InputError) -> Self {
        Self::Input(err)
    }
}

impl From<OrchestratorError> for ServerError {
    fn from(err: OrchestratorError) -> Self {
        Self::Orchestrator(err)
    }
}

impl From<JsonRejection> for ServerError {
    fn from(err: JsonRejection) -> Self {
        Self::BadRequest(err.body_text())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub max_input_chars: usize,
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    text: String,
    #[serde(rename = "analysisKind")]
    analysis_kind: String,
}

impl AnalyzeRequest {
    fn into_input(self, max_chars: usize) -> Result<AnalysisInput, InputError> {
        let kind: AnalysisKind = self.analysis_kind.parse()?;
        AnalysisInput::with_limit(self.text, kind, max_chars)
    }
}

fn account_of(headers: &HeaderMap) -> String {
    headers
        .get(ACCOUNT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_ACCOUNT)
        .to_string()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/analyze", post(analyze))
        .route("/v1/analyze/stream", post(analyze_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(state: AppState, addr: &str) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Verdict orchestrator listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server terminated unexpectedly")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn health() -> &'static str {
    "OK"
}

fn version_header() -> [(&'static str, String); 1] {
    [(protocol::VERSION_HEADER, protocol::PROTOCOL_VERSION.to_string())]
}

async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServerError> {
    let Json(request) = payload?;
    let input = request.into_input(state.max_input_chars)?;
    let account = account_of(&headers);

    let analysis = state.orchestrator.analyze(&account, input).await?;
    Ok((version_header(), Json(protocol::outcome_body(&analysis.outcome))))
}

async fn analyze_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<([(&'static str, String); 1], Sse<impl Stream<Item = Result<Event, Infallible>>>), ServerError> {
    let Json(request) = payload?;
    let input = request.into_input(state.max_input_chars)?;
    let account = account_of(&headers);

    // Dropping the body on client disconnect drops the stream, which aborts the request.
    let events = state
        .orchestrator
        .analyze_streaming(&account, input)
        .map(|event| Ok::<_, Infallible>(Event::default().data(protocol::event_json(&event))));

    Ok((version_header(), Sse::new(events)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_account_header_defaults() {
        let mut headers = HeaderMap::new();
        assert_eq!(account_of(&headers), DEFAULT_ACCOUNT);

        headers.insert(ACCOUNT_HEADER, HeaderValue::from_static("  "));
        assert_eq!(account_of(&headers), DEFAULT_ACCOUNT);

        headers.insert(ACCOUNT_HEADER, HeaderValue::from_static("acct-42"));
        assert_eq!(account_of(&headers), "acct-42");
    }

    #[test]
    fn test_request_kind_is_validated() {
        let request = AnalyzeRequest { text: "hello".to_string(), analysis_kind: "astrological".to_string() };
        assert!(matches!(request.into_input(100), Err(InputError::UnknownKind(_))));

        let request = AnalyzeRequest { text: "hello".to_string(), analysis_kind: "Cognitive".to_string() };
        assert_eq!(request.into_input(100).unwrap().kind(), AnalysisKind::Cognitive);
    }

    #[test]
    fn test_error_status_codes() {
        let denied = ServerError::from(OrchestratorError::AdmissionDenied { account: "a".to_string() });
        assert_eq!(denied.into_response().status(), StatusCode::PAYMENT_REQUIRED);

        let total = ServerError::from(OrchestratorError::TotalFailure { failures: vec![] });
        assert_eq!(total.into_response().status(), StatusCode::BAD_GATEWAY);

        let ledger = ServerError::from(OrchestratorError::Ledger(crate::ledger::LedgerError::Unavailable("x".into())));
        assert_eq!(ledger.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);

        assert_eq!(ServerError::from(InputError::Empty).into_response().status(), StatusCode::BAD_REQUEST);
    }
}
