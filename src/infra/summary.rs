//! OpenAI-compatible chat-completions summarizer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::application::summary::{SYSTEM_PROMPT, Summarizer, SummarizerError, SummaryPrompt};
use crate::config::SummarySettings;
use crate::infra::error::InfraError;

const TEMPERATURE: f32 = 0.5;
const MAX_TOKENS: u32 = 500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

pub struct ChatCompletionsSummarizer {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

impl ChatCompletionsSummarizer {
    /// `None` when no API key is configured.
    pub fn from_settings(settings: &SummarySettings) -> Result<Option<Self>, InfraError> {
        let Some(api_key) = settings.api_key.clone() else {
            return Ok(None);
        };

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        Ok(Some(Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_key,
            model: settings.model.clone(),
        }))
    }
}

#[async_trait]
impl Summarizer for ChatCompletionsSummarizer {
    async fn summarize(&self, prompt: &SummaryPrompt) -> Result<String, SummarizerError> {
        let user = prompt.render();
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| SummarizerError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SummarizerError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|err| SummarizerError::Malformed(err.to_string()))?;

        extract_summary(body)
    }
}

fn extract_summary(body: ChatResponse) -> Result<String, SummarizerError> {
    body.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| SummarizerError::Malformed("response contained no summary".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_disables_summarizer() {
        let settings = SummarySettings {
            api_key: None,
            endpoint: Url::parse("https://llm.example.test/v1/chat/completions").expect("url"),
            model: "test-model".to_string(),
        };
        assert!(
            ChatCompletionsSummarizer::from_settings(&settings)
                .expect("settings")
                .is_none()
        );
    }

    #[test]
    fn request_serializes_chat_shape() {
        let request = ChatRequest {
            model: "test-model",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "sys",
                },
                ChatMessage {
                    role: "user",
                    content: "hi",
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };
        let value = serde_json::to_value(&request).expect("json");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["max_tokens"], 500);
    }

    #[test]
    fn first_choice_is_the_summary() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"  Acme builds rockets. "}}]}"#,
        )
        .expect("json");
        assert_eq!(
            extract_summary(body).expect("summary"),
            "Acme builds rockets."
        );
    }

    #[test]
    fn empty_choices_are_malformed() {
        let body: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).expect("json");
        assert!(matches!(
            extract_summary(body),
            Err(SummarizerError::Malformed(_))
        ));
    }
}
