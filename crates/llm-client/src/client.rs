//! OpenAI-compatible HTTP client.

use crate::error::LlmError;
use crate::types::*;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

/// Default retry configuration
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;
const DEFAULT_MAX_BACKOFF_MS: u64 = 5000;

/// Completion provider client.
///
/// The API key is stored using `SecretString` to prevent accidental
/// exposure in logs or debug output.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl LlmClient {
    /// Create a new client. `timeout` bounds every HTTP request.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: SecretString::new(api_key.into()),
            model: model.into(),
        })
    }

    /// Get the configured default model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a chat completion request with the default model.
    pub async fn chat(
        &self,
        messages: Vec<Message>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<String, LlmError> {
        self.chat_with_model(&self.model, messages, temperature, max_tokens)
            .await
    }

    /// Send a chat completion request to a specific model.
    #[instrument(skip(self, messages), fields(message_count = messages.len()))]
    pub async fn chat_with_model(
        &self,
        model: &str,
        messages: Vec<Message>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages,
            temperature,
            max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", self.bearer())
            .json(&request)
            .send()
            .await?;

        let chat_response = self.handle_response::<ChatResponse>(response).await?;

        if let Some(usage) = &chat_response.usage {
            debug!(
                "Usage: {} prompt + {} completion tokens",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        // Extract content from response, returning error if empty
        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    /// Send a chat completion request with automatic retry and exponential backoff.
    ///
    /// Retries on transient errors (network issues, rate limits) up to `max_retries` times.
    /// Does not retry on authentication errors or empty responses.
    #[instrument(skip(self, messages), fields(message_count = messages.len()))]
    pub async fn chat_with_retry(
        &self,
        messages: Vec<Message>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
        max_retries: Option<u32>,
    ) -> Result<String, LlmError> {
        let max_retries = max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        let mut backoff_ms = DEFAULT_INITIAL_BACKOFF_MS;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                debug!("Retry attempt {} after {}ms backoff", attempt, backoff_ms);
                sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(DEFAULT_MAX_BACKOFF_MS);
            }

            match self.chat(messages.clone(), temperature, max_tokens).await {
                Ok(response) => return Ok(response),
                Err(LlmError::Unauthorized) => return Err(LlmError::Unauthorized),
                Err(LlmError::EmptyResponse) => return Err(LlmError::EmptyResponse),
                Err(e) => {
                    warn!("Chat request failed (attempt {}): {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(LlmError::Api {
            status: 0,
            message: "Max retries exceeded".into(),
        }))
    }

    /// Generate one image and return its raw bytes.
    #[instrument(skip(self, prompt))]
    pub async fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        size: &str,
    ) -> Result<Vec<u8>, LlmError> {
        let request = ImageRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            n: 1,
            size: size.to_string(),
            response_format: "b64_json".into(),
        };

        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .header("Authorization", self.bearer())
            .json(&request)
            .send()
            .await?;

        let image = self
            .handle_response::<ImageResponse>(response)
            .await?
            .data
            .into_iter()
            .next()
            .and_then(|d| d.b64_json)
            .ok_or(LlmError::EmptyResponse)?;

        Ok(STANDARD.decode(image.as_bytes())?)
    }

    /// Transcribe an audio file.
    #[instrument(skip(self, audio), fields(bytes = audio.len()))]
    pub async fn transcribe(
        &self,
        model: &str,
        audio: Vec<u8>,
        filename: &str,
        mimetype: &str,
    ) -> Result<String, LlmError> {
        let file = Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str(mimetype)?;
        let form = Form::new()
            .text("model", model.to_string())
            .part("file", file);

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header("Authorization", self.bearer())
            .multipart(form)
            .send()
            .await?;

        let text = self
            .handle_response::<TranscriptionResponse>(response)
            .await?
            .text;

        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }

    /// List available models.
    #[instrument(skip(self))]
    pub async fn list_models(&self) -> Result<Vec<Model>, LlmError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", self.bearer())
            .send()
            .await?;

        self.handle_response::<ModelsResponse>(response)
            .await
            .map(|r| r.data)
    }

    /// Health check - returns true if API is reachable.
    pub async fn health_check(&self) -> bool {
        self.list_models().await.is_ok()
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key.expose_secret())
    }

    /// Handle HTTP response, converting errors appropriately.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, LlmError> {
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            debug!("Response body: {}", body.chars().take(200).collect::<String>());
            serde_json::from_str(&body).map_err(LlmError::from)
        } else {
            Err(self.extract_error(response).await)
        }
    }

    /// Extract error information from failed response.
    async fn extract_error(&self, response: reqwest::Response) -> LlmError {
        let status = response.status();

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Rate limit exceeded");
                LlmError::RateLimit
            }
            StatusCode::UNAUTHORIZED => {
                warn!("Authentication failed");
                LlmError::Unauthorized
            }
            _ => {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".into());
                LlmError::Api {
                    status: status.as_u16(),
                    message,
                }
            }
        }
    }
}
