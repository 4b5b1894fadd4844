//! OpenAI-compatible chat completions client (OpenRouter, OpenAI, Ollama, Groq)

use super::{Completion, GenerationClient, LlmError, TokenUsage};
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OpenAiClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::InitializationError(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

fn parse_chat_response(body: &str) -> Result<Completion, LlmError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or(LlmError::EmptyCompletion)?;

    if text.trim().is_empty() {
        return Err(LlmError::EmptyCompletion);
    }

    Ok(Completion::new(text, response.usage.unwrap_or_default()))
}

impl GenerationClient for OpenAiClient {
    fn complete(&self, prompt: &str, temperature: f32) -> Result<Completion, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| LlmError::RequestError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| LlmError::RequestError(e.to_string()))?;

        if !status.is_success() {
            return Err(LlmError::ServiceError {
                status: status.as_u16(),
                body,
            });
        }

        parse_chat_response(&body)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "Penalty is 5%."}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
        }"#;

        let completion = parse_chat_response(body).unwrap();
        assert_eq!(completion.text, "Penalty is 5%.");
        assert_eq!(completion.usage.total_tokens, 16);
    }

    #[test]
    fn test_parse_missing_usage() {
        let body = r#"{"choices": [{"message": {"content": "ok"}}]}"#;
        let completion = parse_chat_response(body).unwrap();
        assert_eq!(completion.usage, TokenUsage::default());
    }

    #[test]
    fn test_parse_empty_choices() {
        let body = r#"{"choices": []}"#;
        assert!(matches!(
            parse_chat_response(body),
            Err(LlmError::EmptyCompletion)
        ));
    }

    #[test]
    fn test_parse_null_content() {
        let body = r#"{"choices": [{"message": {"content": null}}]}"#;
        assert!(matches!(
            parse_chat_response(body),
            Err(LlmError::EmptyCompletion)
        ));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_chat_response("<html>bad gateway</html>"),
            Err(LlmError::MalformedResponse(_))
        ));
    }
}
