//! Provider registry: builds the client for a provider once a key is known.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use reqwest::Client;
use tracing::debug;

use super::gemini::GeminiProvider;
use super::openai::OpenAIProvider;
use super::provider::{Provider, ProviderClient};
use crate::config::ProvidersConfig;

/// Registry of provider clients, keyed by provider.
///
/// Registered clients take precedence. Otherwise a client is built from the
/// provider settings and the caller's credential, and reused until the
/// credential changes.
#[derive(Clone)]
pub struct ProviderRegistry {
    client: Client,
    settings: ProvidersConfig,
    registered: HashMap<Provider, ProviderClient>,
    built: Arc<Mutex<HashMap<Provider, (String, ProviderClient)>>>,
}

impl ProviderRegistry {
    pub fn new(settings: ProvidersConfig) -> Self {
        Self {
            client: Client::new(),
            settings,
            registered: HashMap::new(),
            built: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a fixed client implementation for a provider.
    pub fn register(&mut self, provider: Provider, client: ProviderClient) {
        self.registered.insert(provider, client);
    }

    /// Get the client for a provider, or `None` if no credential was given.
    pub fn resolve(&self, provider: Provider, credential: Option<&str>) -> Option<ProviderClient> {
        if let Some(client) = self.registered.get(&provider) {
            return Some(client.clone());
        }

        let api_key = credential.map(str::trim).filter(|k| !k.is_empty())?;

        let mut built = self.built.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((key, client)) = built.get(&provider)
            && key == api_key
        {
            return Some(client.clone());
        }

        debug!(%provider, "Building provider client");
        let client = self.build(provider, api_key.to_string());
        built.insert(provider, (api_key.to_string(), client.clone()));
        Some(client)
    }

    fn build(&self, provider: Provider, api_key: String) -> ProviderClient {
        match provider {
            Provider::OpenAI => {
                let settings = &self.settings.openai;
                let openai = OpenAIProvider::new(
                    self.client.clone(),
                    settings.base_url.clone(),
                    api_key,
                    settings.model.clone(),
                )
                .with_temperature(settings.temperature);
                ProviderClient::Streaming(Arc::new(openai))
            }
            Provider::Gemini => {
                let settings = &self.settings.gemini;
                let gemini = GeminiProvider::new(
                    self.client.clone(),
                    settings.base_url.clone(),
                    api_key,
                    settings.model.clone(),
                );
                ProviderClient::Batch(Arc::new(gemini))
            }
        }
    }
}
