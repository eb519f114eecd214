//! Turn orchestration.
//!
//! A turn moves through [`TurnPhase`]s:
//! `Idle -> AwaitingPrompt -> BuildingPayload -> Calling -> Normalizing (batch only) -> Appended -> Idle`.
//!
//! - Empty prompts and missing credentials are rejected before anything is
//!   written to the store.
//! - The user message is committed before the provider is called and stays
//!   in history if the call fails.
//! - The assistant message is appended only when the reply is complete. For
//!   streaming replies that is when the fragment stream ends normally.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::{Stream, StreamExt};
use thiserror::Error;
use tracing::{debug, warn};

use crate::conversation::ConversationStore;
use crate::llm::{
    FragmentStream, LLMError, Provider, ProviderClient, ProviderRegistry, ProviderVariant,
};
use crate::normalize::normalize_response;
use crate::payload::{build_chat_payload, build_generation_payload};

/// Everything the UI hands over for one turn.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub provider: Provider,
    pub prompt: Option<String>,
    /// Replaces the stored instructions once the turn is accepted.
    pub instructions: Option<String>,
    pub credential: Option<String>,
}

impl TurnInput {
    pub fn new(provider: Provider, prompt: impl Into<String>) -> Self {
        Self {
            provider,
            prompt: Some(prompt.into()),
            instructions: None,
            credential: None,
        }
    }

    #[must_use]
    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential;
        self
    }

    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

/// Errors surfaced to the caller of a turn.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("missing API key for {}", .provider.display_name())]
    MissingCredential { provider: Provider },

    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("provider request failed: {0}")]
    Provider(#[from] LLMError),
}

/// Phases of a single turn, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingPrompt,
    BuildingPayload,
    Calling,
    Normalizing,
    Appended,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnPhase::Idle => "idle",
            TurnPhase::AwaitingPrompt => "awaiting_prompt",
            TurnPhase::BuildingPayload => "building_payload",
            TurnPhase::Calling => "calling",
            TurnPhase::Normalizing => "normalizing",
            TurnPhase::Appended => "appended",
        };
        f.write_str(s)
    }
}

/// Runs turns against whichever provider the caller selects.
pub struct Orchestrator {
    registry: ProviderRegistry,
}

impl Orchestrator {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    /// Run one turn.
    ///
    /// Batch providers return [`Reply::Complete`]. Streaming providers return
    /// [`Reply::Streaming`], which must be polled to completion for the
    /// assistant message to be stored.
    pub async fn submit<'s>(
        &self,
        store: &'s mut ConversationStore,
        input: TurnInput,
    ) -> Result<Reply<'s>, TurnError> {
        let provider = input.provider;
        debug!(%provider, phase = %TurnPhase::AwaitingPrompt, "Turn started");

        let Some(prompt) = input.prompt.filter(|p| !p.trim().is_empty()) else {
            debug!(%provider, phase = %TurnPhase::Idle, "Turn rejected: empty prompt");
            return Err(TurnError::EmptyPrompt);
        };

        let credential = input
            .credential
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        if provider.variant() == ProviderVariant::Streaming && credential.is_none() {
            debug!(%provider, phase = %TurnPhase::Idle, "Turn rejected: missing credential");
            return Err(TurnError::MissingCredential { provider });
        }
        let Some(client) = self.registry.resolve(provider, credential) else {
            debug!(%provider, phase = %TurnPhase::Idle, "Turn rejected: missing credential");
            return Err(TurnError::MissingCredential { provider });
        };

        if let Some(instructions) = input.instructions {
            store.set_instructions(provider, instructions);
        }
        store.append_user(provider, prompt);

        let conversation = store.get(provider);
        debug!(
            %provider,
            phase = %TurnPhase::BuildingPayload,
            history_len = conversation.len(),
            "Building payload"
        );

        match client {
            ProviderClient::Streaming(client) => {
                let payload = build_chat_payload(conversation.instructions(), conversation.history());
                debug!(%provider, phase = %TurnPhase::Calling, turns = payload.len(), "Calling provider");

                let fragments = client.completion(payload).await.inspect_err(|e| {
                    warn!(%provider, error = %e, "Provider call failed");
                })?;
                Ok(Reply::Streaming(ReplyStream::new(fragments, store, provider)))
            }
            ProviderClient::Batch(client) => {
                let payload =
                    build_generation_payload(conversation.instructions(), conversation.history());
                debug!(%provider, phase = %TurnPhase::Calling, turns = payload.len(), "Calling provider");

                let response = client.completion(payload).await.inspect_err(|e| {
                    warn!(%provider, error = %e, "Provider call failed");
                })?;

                debug!(%provider, phase = %TurnPhase::Normalizing, "Extracting reply text");
                let text = normalize_response(&response);
                store.append_assistant(provider, text.clone());
                debug!(%provider, phase = %TurnPhase::Appended, "Turn complete");

                Ok(Reply::Complete(text))
            }
        }
    }
}

/// The outcome of an accepted turn.
pub enum Reply<'s> {
    /// Fragments to render as they arrive.
    Streaming(ReplyStream<'s>),
    /// Final text, already stored.
    Complete(String),
}

impl Reply<'_> {
    /// Drain the reply into its final text.
    pub async fn into_text(self) -> Result<String, TurnError> {
        match self {
            Reply::Complete(text) => Ok(text),
            Reply::Streaming(mut stream) => {
                while let Some(fragment) = stream.next().await {
                    fragment?;
                }
                Ok(stream.accumulated().to_string())
            }
        }
    }
}

/// Streaming reply that stores the full text when the provider finishes.
///
/// A provider error ends the stream without storing anything. Dropping the
/// stream early also stores nothing; [`ReplyStream::accumulated`] exposes the
/// partial text if the caller wants it.
pub struct ReplyStream<'s> {
    inner: FragmentStream,
    store: &'s mut ConversationStore,
    provider: Provider,
    accumulated: String,
    fragments: usize,
    finished: bool,
}

impl<'s> ReplyStream<'s> {
    fn new(inner: FragmentStream, store: &'s mut ConversationStore, provider: Provider) -> Self {
        Self {
            inner,
            store,
            provider,
            accumulated: String::new(),
            fragments: 0,
            finished: false,
        }
    }

    /// Text received so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Stream for ReplyStream<'_> {
    type Item = Result<String, TurnError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(fragment)) if fragment.is_empty() => continue,
                Some(Ok(fragment)) => {
                    this.accumulated.push_str(&fragment);
                    this.fragments += 1;
                    return Poll::Ready(Some(Ok(fragment)));
                }
                Some(Err(e)) => {
                    this.finished = true;
                    warn!(provider = %this.provider, error = %e, "Stream failed, reply not stored");
                    return Poll::Ready(Some(Err(TurnError::Provider(e))));
                }
                None => {
                    this.finished = true;
                    this.store
                        .append_assistant(this.provider, this.accumulated.clone());
                    debug!(
                        provider = %this.provider,
                        phase = %TurnPhase::Appended,
                        fragments = this.fragments,
                        "Turn complete"
                    );
                    return Poll::Ready(None);
                }
            }
        }
    }
}
