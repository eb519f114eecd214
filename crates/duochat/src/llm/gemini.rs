//! Google Gemini generate-content provider (batch).
//!
//! The reply body is handed back untouched; text extraction happens in
//! [`crate::normalize`] because the response shape drifts between API
//! revisions. A successful body that is not JSON is kept as a plain string.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::error::{LLMError, check_response_error};
use super::provider::BatchProvider;
use super::types::RawResponse;
use crate::payload::GenerationContent;

/// Gemini provider using the `generateContent` endpoint.
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com/v1beta";
    pub const DEFAULT_MODEL: &'static str = "gemini-2.5-flash";

    #[must_use]
    pub fn new(client: Client, base_url: String, api_key: String, model: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl BatchProvider for GeminiProvider {
    async fn completion(
        &self,
        contents: Vec<GenerationContent>,
    ) -> Result<RawResponse, LLMError> {
        let url = self.endpoint();
        let request = Request { contents };

        debug!(model = %self.model, contents = request.contents.len(), "Sending generate content");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
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

        let body = response.bytes().await?;
        let value = serde_json::from_slice(&body).unwrap_or_else(|e| {
            debug!(error = %e, "Response body is not JSON, keeping it as text");
            Value::String(String::from_utf8_lossy(&body).into_owned())
        });
        Ok(RawResponse::new(value))
    }
}

#[derive(serde::Serialize)]
struct Request {
    contents: Vec<GenerationContent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use crate::llm::test_server::{http_response, serve_once};
    use crate::normalize::normalize_response;
    use crate::payload::build_generation_payload;

    fn provider(base_url: &str) -> GeminiProvider {
        GeminiProvider::new(
            Client::new(),
            base_url.to_string(),
            "key".to_string(),
            GeminiProvider::DEFAULT_MODEL.to_string(),
        )
    }

    #[test]
    fn test_endpoint_includes_model() {
        assert_eq!(
            provider(GeminiProvider::DEFAULT_BASE_URL).endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            provider("http://localhost:8080/").endpoint(),
            "http://localhost:8080/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_request_serialization() {
        let contents = build_generation_payload("Be brief", &[Message::user("Hi")]);
        let json = serde_json::to_value(Request { contents }).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "System instructions: Be brief" }] },
                    { "role": "user", "parts": [{ "text": "Hi" }] }
                ]
            })
        );
    }

    async fn complete_against(response: String) -> Result<RawResponse, LLMError> {
        let base_url = serve_once(response).await;
        let contents = build_generation_payload("", &[Message::user("Hi")]);
        provider(&base_url).completion(contents).await
    }

    #[tokio::test]
    async fn test_completion_returns_json_body() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Hello"}]}}]}"#;
        let raw = complete_against(http_response(
            "200 OK",
            &[("Content-Type", "application/json")],
            body,
        ))
        .await
        .unwrap();

        assert_eq!(normalize_response(&raw), "Hello");
    }

    #[tokio::test]
    async fn test_completion_keeps_plain_text_body() {
        let raw = complete_against(http_response(
            "200 OK",
            &[("Content-Type", "text/plain")],
            "Hello from a proxy",
        ))
        .await
        .unwrap();

        assert_eq!(raw.as_value(), &Value::String("Hello from a proxy".to_string()));
        assert_eq!(normalize_response(&raw), "Hello from a proxy");
    }

    #[tokio::test]
    async fn test_completion_maps_unauthorized() {
        let err = complete_against(http_response("401 Unauthorized", &[], "API key not valid"))
            .await
            .unwrap_err();

        match err {
            LLMError::Api { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("API key not valid"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_completion_maps_rate_limit() {
        let err = complete_against(http_response(
            "429 Too Many Requests",
            &[("retry-after", "7")],
            "slow down",
        ))
        .await
        .unwrap_err();

        assert!(matches!(err, LLMError::RateLimit { retry_after: Some(7) }));
    }

    #[tokio::test]
    async fn test_completion_maps_server_error() {
        let err = complete_against(http_response("500 Internal Server Error", &[], "boom"))
            .await
            .unwrap_err();

        assert!(matches!(err, LLMError::Api { status: 500, .. }));
    }
}
