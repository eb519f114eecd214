//! LLM provider clients.

mod error;
mod gemini;
mod openai;
mod provider;
mod registry;
#[cfg(test)]
pub(crate) mod test_server;
mod types;

pub use error::LLMError;
pub use gemini::GeminiProvider;
pub use openai::OpenAIProvider;
pub use provider::{
    BatchProvider, Provider, ProviderClient, ProviderVariant, StreamingProvider, UnknownProvider,
};
pub use registry::ProviderRegistry;
pub use types::{FragmentStream, Message, RawResponse, Role};
