//! LLM-backed analysis capability.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{AnalysisBackend, BackendError, BackendId, LLMProvider};
use crate::analysis::{AnalysisInput, AnalysisKind, AnalysisResult};

pub struct LlmBackend {
    id: BackendId,
    provider: Arc<dyn LLMProvider>,
    model: String,
    timeout: Duration,
}

impl LlmBackend {
    pub fn new(id: BackendId, provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            id,
            provider,
            model: model.into(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn system_prompt(kind: AnalysisKind) -> String {
        let focus = match kind {
            AnalysisKind::Cognitive => "the reasoning quality, structure and clarity of thought expressed in the text",
            AnalysisKind::Psychological => "the emotional tone, temperament and stability signals expressed in the text",
        };
        format!(
            "You are an analysis engine. Assess {}. \
             Respond with ONE JSON object and nothing else. No markdown, no commentary.",
            focus
        )
    }

    fn build_prompt(input: &AnalysisInput, feedback: Option<&str>) -> String {
        let template = serde_json::to_string_pretty(&input.kind().schema().template())
            .unwrap_or_else(|_| "{}".to_string());

        let mut prompt = format!(
            r#"## TEXT
{}

## OUTPUT FORMAT
Return a JSON object with exactly these fields:
{}
"#,
            input.text(),
            template
        );

        if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
            prompt.push_str(&format!(
                r#"
## PREVIOUS ATTEMPT REJECTED
Your previous answer violated these constraints: {}
You MUST address every listed violation in this answer.
"#,
                feedback
            ));
        }

        prompt
    }

    /// Pulls the outermost `{...}` span out of a model reply.
    fn parse_reply(kind: AnalysisKind, reply: &str) -> Result<AnalysisResult, BackendError> {
        let start = reply.find('{');
        let end = reply.rfind('}');
        let json_str = match (start, end) {
            (Some(s), Some(e)) if s < e => &reply[s..=e],
            _ => return Err(BackendError::Malformed("no JSON object in reply".to_string())),
        };

        let value: Value = serde_json::from_str(json_str)
            .map_err(|e| BackendError::Malformed(format!("invalid JSON: {}", e)))?;

        AnalysisResult::from_value(kind, value)
            .ok_or_else(|| BackendError::Malformed("reply is not a JSON object".to_string()))
    }

    /// HTTP client timeouts count as the same deadline as our own timer.
    fn classify(&self, err: anyhow::Error) -> BackendError {
        if let Some(req_err) = err.downcast_ref::<reqwest::Error>() {
            if req_err.is_timeout() {
                return BackendError::Timeout(self.timeout);
            }
            if let Some(status) = req_err.status() {
                if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
                    return BackendError::Auth(status.to_string());
                }
            }
        }
        BackendError::Transport(format!("{:#}", err))
    }
}

#[async_trait]
impl AnalysisBackend for LlmBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    async fn analyze(&self, input: &AnalysisInput, feedback: Option<&str>) -> Result<AnalysisResult, BackendError> {
        let prompt = Self::build_prompt(input, feedback);
        let system = Some(Self::system_prompt(input.kind()));
        debug!("Backend {} ({}) prompt is {} bytes", self.id, self.model, prompt.len());

        let reply = tokio::time::timeout(self.timeout, self.provider.generate(&self.model, prompt, system))
            .await
            .map_err(|_| BackendError::Timeout(self.timeout))?
            .map_err(|e| self.classify(e))?;

        Self::parse_reply(input.kind(), &reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::OpenAICompatibleProvider;
    use tokio::sync::Mutex;

    struct Recording {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LLMProvider for Recording {
        async fn generate(&self, _model: &str, prompt: String, _system: Option<String>) -> anyhow::Result<String> {
            self.prompts.lock().await.push(prompt);
            Ok(self.reply.clone())
        }
    }

    struct Stalled;

    #[async_trait]
    impl LLMProvider for Stalled {
        async fn generate(&self, _model: &str, _prompt: String, _system: Option<String>) -> anyhow::Result<String> {
            std::future::pending::<anyhow::Result<String>>().await
        }
    }

    fn input() -> AnalysisInput {
        AnalysisInput::new("I think, therefore I am.", AnalysisKind::Cognitive).unwrap()
    }

    #[test]
    fn test_parse_reply_strips_fences() {
        let reply = "```json\n{\"score\": 64, \"summary\": \"fine\"}\n```";
        let result = LlmBackend::parse_reply(AnalysisKind::Cognitive, reply).unwrap();
        assert_eq!(result.number("score"), Some(64.0));
    }

    #[test]
    fn test_parse_reply_malformed() {
        assert!(matches!(
            LlmBackend::parse_reply(AnalysisKind::Cognitive, "I cannot help with that."),
            Err(BackendError::Malformed(_))
        ));
        assert!(matches!(
            LlmBackend::parse_reply(AnalysisKind::Cognitive, "{ score: }"),
            Err(BackendError::Malformed(_))
        ));
    }

    #[test]
    fn test_prompt_without_feedback_has_no_rejection_block() {
        let prompt = LlmBackend::build_prompt(&input(), None);
        assert!(prompt.contains("I think, therefore I am."));
        assert!(!prompt.contains("PREVIOUS ATTEMPT REJECTED"));
    }

    #[tokio::test]
    async fn test_feedback_is_forwarded() {
        let provider = Arc::new(Recording { reply: "{\"score\": 1}".to_string(), prompts: Mutex::new(Vec::new()) });
        let backend = LlmBackend::new(BackendId::B, provider.clone(), "test-model");

        backend.analyze(&input(), Some("missing text: summary")).await.unwrap();

        let prompts = provider.prompts.lock().await;
        assert!(prompts[0].contains("PREVIOUS ATTEMPT REJECTED"));
        assert!(prompts[0].contains("missing text: summary"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_hard_failure() {
        let backend = LlmBackend::new(BackendId::A, Arc::new(Stalled), "m").with_timeout(Duration::from_secs(5));
        let err = backend.analyze(&input(), None).await.unwrap_err();
        assert_eq!(err, BackendError::Timeout(Duration::from_secs(5)));
    }

    /// Local endpoint that accepts connections and answers each request with `reply`,
    /// or never answers when `reply` is `None`.
    async fn local_endpoint(reply: Option<&'static str>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                if let Some(reply) = reply {
                    let _ = socket.write_all(reply.as_bytes()).await;
                }
                held.push(socket);
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_client_timeout_is_reported_as_timeout() {
        let url = local_endpoint(None).await;
        let provider = OpenAICompatibleProvider::new(url, None)
            .with_timeout(Duration::from_millis(100))
            .unwrap();
        let backend = LlmBackend::new(BackendId::C, Arc::new(provider), "m").with_timeout(Duration::from_secs(10));

        let err = backend.analyze(&input(), None).await.unwrap_err();
        assert_eq!(err, BackendError::Timeout(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_unauthorized_is_reported_as_auth() {
        let url = local_endpoint(Some("HTTP/1.1 401 Unauthorized\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")).await;
        let provider = OpenAICompatibleProvider::new(url, Some("bad-key".to_string()));
        let backend = LlmBackend::new(BackendId::D, Arc::new(provider), "m");

        let err = backend.analyze(&input(), None).await.unwrap_err();
        assert!(matches!(err, BackendError::Auth(_)), "got {:?}", err);
    }
}
