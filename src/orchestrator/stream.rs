//! Streaming Emitter
//!
//! Surfaces each backend's terminal state as soon as it happens, then one
//! closing `Done` carrying the ledger outcome. The driver task is aborted when
//! the stream is dropped, which in turn aborts every in-flight worker.

use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{info, Instrument};

use super::dispatch::{BackendOutcome, Dispatch};
use super::invoker::Invocation;
use super::Orchestrator;
use crate::analysis::AnalysisInput;
use crate::backend::BackendId;
use crate::ledger::{LedgerDelta, Usage};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Completed { backend: BackendId, invocation: Invocation },
    Errored { backend: BackendId, reason: String },
    /// Admission refused before any dispatch
    Denied { reason: String },
    /// Always last. `None` when no debit was recorded.
    Done { credits: Option<LedgerDelta> },
}

impl StreamEvent {
    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::Done { .. })
    }
}

/// Completion-ordered events for one request.
pub struct AnalysisStream {
    events: mpsc::Receiver<StreamEvent>,
    driver: AbortHandle,
}

impl AnalysisStream {
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Drains the stream. Mostly useful in tests and CLI tools.
    pub async fn collect_all(mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        while let Some(event) = self.next_event().await {
            out.push(event);
        }
        out
    }
}

impl Stream for AnalysisStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for AnalysisStream {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

pub(super) fn spawn(orchestrator: &Orchestrator, account: String, input: AnalysisInput) -> AnalysisStream {
    // Room for every backend event plus `Denied`/`Done` so the driver never
    // waits on a slow reader before it can settle.
    let (tx, events) = mpsc::channel(orchestrator.registry.len() + 2);
    let registry = orchestrator.registry.clone();
    let invoker = orchestrator.invoker.clone();
    let ledger = orchestrator.ledger.clone();
    let span = tracing::Span::current();

    let handle = tokio::spawn(
        async move {
            let estimate = Usage::estimate(input.char_count(), registry.len());
            if let Err(e) = Orchestrator::admit(ledger.as_ref(), &account, &estimate).await {
                info!("Streaming request refused: {}", e);
                let _ = tx.send(StreamEvent::Denied { reason: e.to_string() }).await;
                let _ = tx.send(StreamEvent::Done { credits: None }).await;
                return;
            }

            let mut dispatch = Dispatch::start(&registry, Arc::clone(&invoker), &input);
            let mut succeeded = 0;

            while let Some(report) = dispatch.next().await {
                let event = match report.outcome {
                    BackendOutcome::Completed(invocation) => {
                        succeeded += 1;
                        StreamEvent::Completed { backend: report.backend, invocation }
                    }
                    BackendOutcome::Failed(e) => StreamEvent::Errored { backend: report.backend, reason: e.to_string() },
                };
                if tx.send(event).await.is_err() {
                    info!("Stream receiver gone; abandoning request");
                    return;
                }
            }

            let usage = Usage { input_chars: input.char_count(), dispatched: dispatch.dispatched(), succeeded };
            drop(dispatch);
            let credits = Orchestrator::settle(ledger.as_ref(), &account, &usage).await;
            let _ = tx.send(StreamEvent::Done { credits }).await;
        }
        .instrument(span),
    );

    AnalysisStream { events, driver: handle.abort_handle() }
}
