//! Chat-completions client for any OpenAI-compatible server (hosted APIs,
//! Ollama, vLLM, LM Studio).

use super::sanitize_api_error;
use super::traits::Provider;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OpenAiCompatibleProvider {
    name: String,
    api_key: Option<String>,
    endpoint: String,
    client: Client,
}

impl OpenAiCompatibleProvider {
    /// `base_url` may be the API root or the full `/chat/completions` URL.
    pub fn new(name: &str, base_url: &str, api_key: Option<&str>) -> Self {
        let base_url = base_url.trim_end_matches('/');
        let endpoint = if base_url.ends_with("/chat/completions") {
            base_url.to_string()
        } else {
            format!("{base_url}/chat/completions")
        };

        Self {
            name: name.to_string(),
            api_key: api_key
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(ToString::to_string),
            endpoint,
            client: build_client(),
        }
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

// Callers bound each request more tightly; these only stop a dead socket
// from pinning a connection.
fn build_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_else(|_| Client::new())
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Turn<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct Turn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl CompletionResponse {
    fn into_text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    async fn chat_with_system(
        &self,
        system_prompt: Option<&str>,
        message: &str,
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            anyhow::bail!(
                "{} API key not set. Set provider.api_key or TENAX_API_KEY.",
                self.name
            );
        };

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(Turn {
                role: "system",
                content: system,
            });
        }
        messages.push(Turn {
            role: "user",
            content: message,
        });

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&CompletionRequest {
                model,
                messages,
                temperature,
            })
            .send()
            .await
            .with_context(|| format!("{} request failed", self.name))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "{} API error ({status}): {}",
                self.name,
                sanitize_api_error(&body)
            );
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .with_context(|| format!("{} returned an unreadable completion", self.name))?;
        completion
            .into_text()
            .ok_or_else(|| anyhow::anyhow!("{} returned no completion", self.name))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(url: &str, key: Option<&str>) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new("mock", url, key)
    }

    #[test]
    fn endpoint_is_derived_from_base_url() {
        let p = provider("https://example.com/v1/", None);
        assert_eq!(p.endpoint(), "https://example.com/v1/chat/completions");

        let p = provider("https://example.com/v1/chat/completions", None);
        assert_eq!(p.endpoint(), "https://example.com/v1/chat/completions");
    }

    #[test]
    fn blank_key_counts_as_missing() {
        assert!(provider("https://example.com", Some("  ")).api_key.is_none());
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let err = provider("https://example.com", None)
            .chat_with_system(None, "hello", "m", 0.0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("mock API key not set"));
    }

    #[tokio::test]
    async fn sends_system_prompt_and_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "test-model",
                "messages": [
                    {"role": "system", "content": "label it"},
                    {"role": "user", "content": "done gym"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"intent\":\"mark_complete\"}"}}]
            })))
            .mount(&server)
            .await;

        let reply = provider(&server.uri(), Some("test-key"))
            .chat_with_system(Some("label it"), "done gym", "test-model", 0.0)
            .await
            .unwrap();
        assert_eq!(reply, "{\"intent\":\"mark_complete\"}");
    }

    #[tokio::test]
    async fn empty_completion_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .mount(&server)
            .await;

        let err = provider(&server.uri(), Some("k"))
            .chat_with_system(None, "hello", "m", 0.0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no completion"));
    }

    #[tokio::test]
    async fn api_errors_are_redacted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string(
                "{\"error\":\"invalid credentials api_key=raw-secret-123\"}",
            ))
            .mount(&server)
            .await;

        let err = provider(&server.uri(), Some("key"))
            .chat_with_system(None, "hello", "test-model", 0.1)
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("401"));
        assert!(!err.contains("raw-secret-123"));
        assert!(err.contains("[REDACTED]"));
    }
}
