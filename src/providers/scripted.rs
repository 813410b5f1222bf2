use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    providers::LLMProvider,
    types::{CompletionRequest, CompletionResponse},
    LLMError,
};

/// Replays queued responses in order and records every request it receives.
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<CompletionResponse, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptEntry {
    Text(String),
    Failure { error: String },
    Response(CompletionResponse),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::new();
        for text in texts {
            provider.push_text(text);
        }
        provider
    }

    /// Parses a JSON array whose entries are plain strings, full responses or
    /// `{"error": "..."}` failures.
    pub fn from_json_str(source: &str) -> Result<Self, LLMError> {
        let entries: Vec<ScriptEntry> = serde_json::from_str(source)?;
        let provider = Self::new();
        for entry in entries {
            match entry {
                ScriptEntry::Text(text) => provider.push_text(text),
                ScriptEntry::Failure { error } => provider.push_failure(error),
                ScriptEntry::Response(response) => provider.push_response(response),
            }
        }
        Ok(provider)
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push_response(CompletionResponse::text(text));
    }

    pub fn push_response(&self, response: CompletionResponse) {
        lock(&self.responses).push_back(Ok(response));
    }

    /// Queues a provider failure in place of the next response.
    pub fn push_failure(&self, message: impl Into<String>) {
        lock(&self.responses).push_back(Err(message.into()));
    }

    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LLMError> {
        let model = request.model.clone();
        lock(&self.requests).push(request);
        match lock(&self.responses).pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(LLMError::Provider(message)),
            None => Err(LLMError::ScriptExhausted { model }),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    #[tokio::test]
    async fn replays_in_order_then_runs_dry() {
        let provider = ScriptedProvider::from_texts(["first", "second"]);
        let request = CompletionRequest::new("test-model", vec![ChatMessage::user("hi")]);

        let first = provider.complete(request.clone()).await.unwrap();
        let second = provider.complete(request.clone()).await.unwrap();
        assert_eq!(first.message.text(), Some("first"));
        assert_eq!(second.message.text(), Some("second"));

        let error = provider.complete(request).await.unwrap_err();
        assert!(matches!(error, LLMError::ScriptExhausted { model } if model == "test-model"));
        assert_eq!(provider.requests().len(), 3);
    }

    #[test]
    fn parses_mixed_script() {
        let provider = ScriptedProvider::from_json_str(
            r#"["plain", {"error": "rate limited"}, {"message": {"role": "assistant", "content": "full"}}]"#,
        )
        .unwrap();
        assert_eq!(provider.remaining(), 3);
    }

    #[tokio::test]
    async fn scripted_failures_surface_as_provider_errors() {
        let provider = ScriptedProvider::new();
        provider.push_failure("rate limited");
        provider.push_text("recovered");
        let request = CompletionRequest::new("test-model", vec![ChatMessage::user("hi")]);

        let error = provider.complete(request.clone()).await.unwrap_err();
        assert!(matches!(error, LLMError::Provider(message) if message == "rate limited"));
        let next = provider.complete(request).await.unwrap();
        assert_eq!(next.message.text(), Some("recovered"));
    }
}
