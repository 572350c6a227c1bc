//! OpenAI-compatible chat completion provider.
//!
//! Works with OpenAI's API and any compatible endpoint.

use async_trait::async_trait;
use herald_core::{
    context::{Completion, Context, ContextEntry},
    error::HeraldError,
    traits::Provider,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// OpenAI-compatible provider.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    /// Create from config values.
    pub fn from_config(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Build OpenAI-format messages from the conversation history.
pub(crate) fn build_openai_messages(history: &[ContextEntry]) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|m| ChatMessage {
            role: m.role.clone(),
            content: Some(m.content.clone()),
        })
        .collect()
}

#[derive(Serialize, Deserialize, Clone)]
pub(crate) struct ChatMessage {
    pub role: String,
    pub content: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
pub(crate) struct ChatCompletionResponse {
    pub choices: Option<Vec<ChatChoice>>,
    pub model: Option<String>,
    pub usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
pub(crate) struct ChatChoice {
    pub message: Option<ChatMessage>,
}

#[derive(Deserialize)]
pub(crate) struct ChatUsage {
    pub total_tokens: Option<u64>,
}

/// Extract the trimmed completion text; empty or missing content is an error.
pub(crate) fn extract_completion(parsed: ChatCompletionResponse) -> Result<Completion, HeraldError> {
    let text = parsed
        .choices
        .as_ref()
        .and_then(|c| c.first())
        .and_then(|c| c.message.as_ref())
        .and_then(|m| m.content.as_deref())
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    if text.is_empty() {
        return Err(HeraldError::Provider(
            "no content returned in response from AI model".into(),
        ));
    }

    Ok(Completion {
        text,
        tokens_used: parsed.usage.as_ref().and_then(|u| u.total_tokens),
        model: parsed.model,
    })
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, context: &Context) -> Result<Completion, HeraldError> {
        let effective_model = context.model.as_deref().unwrap_or(&self.model);
        let start = Instant::now();

        let body = ChatCompletionRequest {
            model: effective_model.to_string(),
            messages: build_openai_messages(&context.history),
            max_completion_tokens: context.max_completion_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!("openai: POST {url} model={effective_model}");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| HeraldError::Provider(format!("openai request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(HeraldError::Provider(format!(
                "openai returned {status}: {text}"
            )));
        }

        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| HeraldError::Provider(format!("openai: failed to parse response: {e}")))?;

        let completion = extract_completion(parsed)?;
        debug!(
            "openai: {} tokens in {}ms",
            completion.tokens_used.unwrap_or(0),
            start.elapsed().as_millis()
        );
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_provider_name() {
        let p = OpenAiProvider::from_config(
            "https://api.openai.com/v1".into(),
            "sk-test".into(),
            "o4-mini".into(),
        );
        assert_eq!(p.name(), "openai");
        assert_eq!(p.model(), "o4-mini");
    }

    #[test]
    fn test_build_openai_messages_keeps_order() {
        let history = vec![
            ContextEntry::user("Hi"),
            ContextEntry::assistant("Hello!"),
            ContextEntry::user("How?"),
        ];
        let messages = build_openai_messages(&history);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].content.as_deref(), Some("Hello!"));
        assert_eq!(messages[2].role, "user");
    }

    #[test]
    fn test_request_serialization() {
        let body = ChatCompletionRequest {
            model: "o4-mini".into(),
            messages: build_openai_messages(&[ContextEntry::user("Hi")]),
            max_completion_tokens: Some(1000),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "o4-mini");
        assert_eq!(json["max_completion_tokens"], 1000);
        assert_eq!(json["messages"][0]["content"], "Hi");

        let body = ChatCompletionRequest {
            max_completion_tokens: None,
            ..body
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("max_completion_tokens").is_none());
    }

    #[test]
    fn test_extract_completion() {
        let raw = r#"{
            "model": "o4-mini-2025-04-16",
            "choices": [{"message": {"role": "assistant", "content": "  Paris.  "}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        let completion = extract_completion(parsed).unwrap();
        assert_eq!(completion.text, "Paris.");
        assert_eq!(completion.tokens_used, Some(13));
        assert_eq!(completion.model.as_deref(), Some("o4-mini-2025-04-16"));
    }

    #[test]
    fn test_extract_completion_rejects_empty_content() {
        for raw in [
            r#"{"choices": [{"message": {"role": "assistant", "content": "   "}}]}"#,
            r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#,
            r#"{"choices": []}"#,
            r#"{}"#,
        ] {
            let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
            assert!(
                matches!(extract_completion(parsed), Err(HeraldError::Provider(_))),
                "expected error for {raw}"
            );
        }
    }
}
