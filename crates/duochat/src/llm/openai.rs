//! OpenAI chat-completions provider (streaming).

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::{LLMError, check_response_error};
use super::provider::StreamingProvider;
use super::types::{FragmentStream, Message};

/// OpenAI-compatible provider that always requests a streamed reply.
pub struct OpenAIProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
}

impl OpenAIProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &'static str = "gpt-3.5-turbo";

    #[must_use]
    pub fn new(client: Client, base_url: String, api_key: String, model: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
            model,
            temperature: None,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    fn to_request(&self, messages: Vec<Message>) -> StreamRequest {
        StreamRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            stream: true,
        }
    }
}

#[async_trait]
impl StreamingProvider for OpenAIProvider {
    async fn completion(&self, messages: Vec<Message>) -> Result<FragmentStream, LLMError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = self.to_request(messages);

        debug!(model = %self.model, messages = request.messages.len(), "Sending chat completion");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if let Some(err) = check_response_error(&response) {
            return Err(err);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LLMError::Api { status, message });
        }

        Ok(Box::pin(StreamParser::new(response.bytes_stream())))
    }
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(serde::Serialize)]
struct StreamRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

// ============================================================================
// Streaming
// ============================================================================

/// Turns a server-sent-events body into text fragments.
struct StreamParser<S> {
    inner: S,
    buffer: Vec<u8>,
    eof: bool,
    done: bool,
}

impl<S> StreamParser<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            eof: false,
            done: false,
        }
    }

    fn next_line(&mut self) -> Option<String> {
        let line_end = self.buffer.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

impl<S> Stream for StreamParser<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<String, LLMError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            if let Some(line) = self.next_line() {
                let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                    continue;
                };

                if data == "[DONE]" {
                    self.done = true;
                    return Poll::Ready(None);
                }

                let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
                    continue;
                };

                if let Some(error) = chunk.error {
                    let message = error_message(&error);
                    warn!(%message, "Provider reported an error mid-stream");
                    self.done = true;
                    return Poll::Ready(Some(Err(LLMError::Stream(message))));
                }

                if let Some(choice) = chunk.choices.into_iter().next()
                    && let Some(content) = choice.delta.content
                    && !content.is_empty()
                {
                    return Poll::Ready(Some(Ok(content)));
                }
                continue;
            }

            if self.eof {
                self.done = true;
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.buffer.extend_from_slice(&bytes);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(LLMError::Request(e))));
                }
                Poll::Ready(None) => {
                    self.eof = true;
                    if !self.buffer.is_empty() {
                        self.buffer.push(b'\n');
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<Value>,
}

/// `{"error": {"message": ...}}` is the usual shape; some proxies send a bare string.
fn error_message(error: &Value) -> String {
    error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}

#[derive(serde::Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(serde::Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
