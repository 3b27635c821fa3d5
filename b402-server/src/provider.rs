//! AI completion backends.
//!
//! The protected operation forwards the caller's text to a
//! [`CompletionProvider`] and returns whatever it answers. The provider is an
//! external collaborator: this module only speaks its HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{ProviderConfig, ProviderKind};

/// System prompt sent ahead of every request.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the user's message concisely.";

/// Default bound on one completion request.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors reported by a completion backend.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The request could not be sent or the response not read.
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The backend answered with a non-success status.
    #[error("completion backend returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: reqwest::StatusCode,
        /// Response body, as text.
        body: String,
    },
    /// The backend answered without any completion text.
    #[error("completion backend returned no content")]
    EmptyCompletion,
    /// The configured base URL cannot be extended with the API path.
    #[error("invalid completion endpoint: {0}")]
    Url(#[from] url::ParseError),
}

/// Something that turns a prompt into a completion.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Runs one completion over `context`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the backend fails or answers nothing.
    async fn execute(&self, context: &str) -> Result<String, ProviderError>;
}

/// Builds the provider selected by the configuration.
///
/// # Errors
///
/// Returns [`ProviderError`] if the HTTP client or endpoint cannot be built.
pub fn from_config(config: &ProviderConfig) -> Result<Box<dyn CompletionProvider>, ProviderError> {
    match config.kind {
        ProviderKind::OpenAi => Ok(Box::new(OpenAiProvider::try_new(
            config.base_url.clone(),
            config.api_key.clone(),
            config.model.clone(),
        )?)),
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    completions_url: Url,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("completions_url", &self.completions_url.as_str())
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiProvider {
    /// Creates a provider posting to `{base_url}/chat/completions`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the endpoint URL or HTTP client cannot be built.
    pub fn try_new(
        base_url: Url,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let mut base = base_url.as_str().trim_end_matches('/').to_owned();
        base.push('/');
        let completions_url = Url::parse(&base)?.join("chat/completions")?;
        let client = Client::builder().timeout(DEFAULT_PROVIDER_TIMEOUT).build()?;
        Ok(Self {
            client,
            completions_url,
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Endpoint requests are posted to.
    #[must_use]
    pub const fn completions_url(&self) -> &Url {
        &self.completions_url
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(
            name = "b402.provider.openai",
            skip_all,
            fields(model = %self.model),
            err
        )
    )]
    async fn execute(&self, context: &str) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: context,
                },
            ],
        };
        let response = self
            .client
            .post(self.completions_url.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let completion: ChatResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(ProviderError::EmptyCompletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider(server: &MockServer) -> OpenAiProvider {
        let base = Url::parse(&format!("{}/v1", server.uri())).unwrap();
        OpenAiProvider::try_new(base, "sk-test", "gpt-4o-mini").unwrap()
    }

    #[tokio::test]
    async fn test_execute_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "messages": [
                    { "role": "system" },
                    { "role": "user", "content": "hello" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "hi there" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = provider(&server).await.execute("hello").await.unwrap();
        assert_eq!(text, "hi there");
    }

    #[tokio::test]
    async fn test_execute_surfaces_backend_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = provider(&server).await.execute("hello").await.unwrap_err();
        match err {
            ProviderError::Status { status, body } => {
                assert_eq!(status.as_u16(), 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_execute_rejects_empty_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = provider(&server).await.execute("hello").await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyCompletion));
    }

    #[test]
    fn test_completions_url_tolerates_trailing_slash() {
        let with = OpenAiProvider::try_new(
            Url::parse("https://api.openai.com/v1/").unwrap(),
            "k",
            "m",
        )
        .unwrap();
        let without =
            OpenAiProvider::try_new(Url::parse("https://api.openai.com/v1").unwrap(), "k", "m")
                .unwrap();
        assert_eq!(
            with.completions_url().as_str(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(with.completions_url(), without.completions_url());
    }
}
