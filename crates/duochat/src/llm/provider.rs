//! Provider identities and the completion capability.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::LLMError;
use super::types::{FragmentStream, Message, RawResponse};
use crate::payload::GenerationContent;

/// The LLM backends a conversation can be held with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAI,
    Gemini,
}

/// How a provider delivers its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderVariant {
    /// Incremental text fragments.
    Streaming,
    /// One opaque response object.
    Batch,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::OpenAI, Provider::Gemini];

    /// Stable key used to partition conversation state.
    pub fn key(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Gemini => "gemini",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OpenAI",
            Provider::Gemini => "Gemini (Google)",
        }
    }

    pub fn variant(&self) -> ProviderVariant {
        match self {
            Provider::OpenAI => ProviderVariant::Streaming,
            Provider::Gemini => ProviderVariant::Batch,
        }
    }

    /// Environment variable consulted for this provider's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Error returned when a provider name is not recognized.
#[derive(Debug, thiserror::Error)]
#[error("unknown provider '{0}' (expected 'openai' or 'gemini')")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "gemini" | "google" => Ok(Provider::Gemini),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

impl<'de> serde::Deserialize<'de> for Provider {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Provider that streams its reply as text fragments.
#[async_trait]
pub trait StreamingProvider: Send + Sync {
    async fn completion(&self, messages: Vec<Message>) -> Result<FragmentStream, LLMError>;
}

/// Provider that returns its whole reply in one response object.
#[async_trait]
pub trait BatchProvider: Send + Sync {
    async fn completion(&self, contents: Vec<GenerationContent>)
    -> Result<RawResponse, LLMError>;
}

/// A provider client, fixed to one variant when it is built.
#[derive(Clone)]
pub enum ProviderClient {
    Streaming(Arc<dyn StreamingProvider>),
    Batch(Arc<dyn BatchProvider>),
}

impl ProviderClient {
    pub fn variant(&self) -> ProviderVariant {
        match self {
            ProviderClient::Streaming(_) => ProviderVariant::Streaming,
            ProviderClient::Batch(_) => ProviderVariant::Batch,
        }
    }
}

impl fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProviderClient").field(&self.variant()).finish()
    }
}
