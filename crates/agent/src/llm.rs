use std::time::Duration;

use async_trait::async_trait;
use insight_core::config::LlmConfig;
use insight_core::{CapabilityError, ClassifierCapability};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const CAPABILITY: &str = "llm";
const SYSTEM_PROMPT: &str =
    "You are a careful HR analytics assistant. Follow the output format exactly.";

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CapabilityError>;
}

/// Chat-completions client for LM Studio, Ollama and OpenAI, which all expose the
/// same `/chat/completions` shape.
pub struct OpenAiCompatibleClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
    timeout: Duration,
    max_retries: u32,
}

impl std::fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
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
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, CapabilityError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| CapabilityError::unavailable(CAPABILITY, error.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout,
            max_retries: config.max_retries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Lists models to confirm the endpoint is reachable.
    pub async fn ping(&self) -> Result<(), CapabilityError> {
        let mut request = self.client.get(format!("{}/models", self.base_url));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }
        let response = request.send().await.map_err(|error| self.transport_error(error))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(CapabilityError::unavailable(
                CAPABILITY,
                format!("{} responded with {}", self.base_url, response.status()),
            ))
        }
    }

    async fn send_once(&self, prompt: &str) -> Result<String, Attempt> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: self.temperature,
            stream: false,
        };

        let mut request =
            self.client.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| Attempt::Retry(self.transport_error(error)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let message = format!("{status}: {}", truncate(&detail, 200));
            return Err(if retryable_status(status) {
                Attempt::Retry(CapabilityError::unavailable(CAPABILITY, message))
            } else {
                Attempt::Fatal(CapabilityError::rejected(CAPABILITY, message))
            });
        }

        let payload: ChatResponse = response.json().await.map_err(|error| {
            Attempt::Fatal(CapabilityError::invalid_output(CAPABILITY, error.to_string()))
        })?;

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                Attempt::Fatal(CapabilityError::invalid_output(CAPABILITY, "empty completion"))
            })
    }

    fn transport_error(&self, error: reqwest::Error) -> CapabilityError {
        if error.is_timeout() {
            CapabilityError::Timeout {
                capability: CAPABILITY,
                after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            CapabilityError::unavailable(CAPABILITY, error.to_string())
        }
    }
}

enum Attempt {
    Retry(CapabilityError),
    Fatal(CapabilityError),
}

fn retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, prompt: &str) -> Result<String, CapabilityError> {
        let mut attempt = 0;
        loop {
            match self.send_once(prompt).await {
                Ok(content) => return Ok(content),
                Err(Attempt::Fatal(error)) => return Err(error),
                Err(Attempt::Retry(error)) if attempt < self.max_retries => {
                    attempt += 1;
                    debug!(
                        event_name = "llm.request.retry",
                        attempt,
                        error = %error,
                        "retrying chat completion"
                    );
                }
                Err(Attempt::Retry(error)) => {
                    warn!(event_name = "llm.request.failed", error = %error, "chat completion failed");
                    return Err(error);
                }
            }
        }
    }
}

#[async_trait]
impl ClassifierCapability for OpenAiCompatibleClient {
    async fn classify_text(&self, prompt: &str) -> Result<String, CapabilityError> {
        self.complete(prompt).await
    }
}
