//! Per-provider conversation state.
//!
//! Each provider owns one [`Conversation`]. There is no API that reads or
//! writes across providers, so switching providers never leaks history or
//! instructions. History is append-only.

use std::collections::HashMap;

use tracing::trace;

use crate::llm::{Message, Provider};

/// Ordered history plus free-text instructions for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    provider_key: String,
    history: Vec<Message>,
    instructions: String,
}

impl Conversation {
    fn new(provider: Provider) -> Self {
        Self {
            provider_key: provider.key().to_string(),
            history: Vec::new(),
            instructions: String::new(),
        }
    }

    pub fn provider_key(&self) -> &str {
        &self.provider_key
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

/// Conversations for the session, keyed by provider.
///
/// Owned by the caller for the lifetime of a session. Not meant for concurrent
/// writers to the same provider.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: HashMap<Provider, Conversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the conversation for a provider, creating an empty one on first use.
    pub fn get(&mut self, provider: Provider) -> &Conversation {
        self.entry(provider)
    }

    /// Get the conversation for a provider without creating it.
    pub fn peek(&self, provider: Provider) -> Option<&Conversation> {
        self.conversations.get(&provider)
    }

    /// Replace the instructions; history is untouched.
    pub fn set_instructions(&mut self, provider: Provider, text: impl Into<String>) {
        self.entry(provider).instructions = text.into();
    }

    pub fn append_user(&mut self, provider: Provider, content: impl Into<String>) {
        self.append(provider, Message::user(content));
    }

    pub fn append_assistant(&mut self, provider: Provider, content: impl Into<String>) {
        self.append(provider, Message::assistant(content));
    }

    fn append(&mut self, provider: Provider, message: Message) {
        let conversation = self.entry(provider);
        conversation.history.push(message);
        trace!(%provider, history_len = conversation.history.len(), "Appended message");
    }

    fn entry(&mut self, provider: Provider) -> &mut Conversation {
        self.conversations
            .entry(provider)
            .or_insert_with(|| Conversation::new(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn get_creates_empty_conversation() {
        let mut store = ConversationStore::new();
        assert!(store.peek(Provider::OpenAI).is_none());

        let conversation = store.get(Provider::OpenAI);
        assert_eq!(conversation.provider_key(), "openai");
        assert!(conversation.is_empty());
        assert_eq!(conversation.instructions(), "");
        assert!(store.peek(Provider::OpenAI).is_some());
    }

    #[test]
    fn appends_preserve_order_and_roles() {
        let mut store = ConversationStore::new();
        store.append_user(Provider::Gemini, "Hi");
        store.append_assistant(Provider::Gemini, "Hello");
        store.append_user(Provider::Gemini, "Bye");

        let history = store.get(Provider::Gemini).history();
        let roles: Vec<_> = history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(history[1].content, "Hello");
    }

    #[test]
    fn set_instructions_keeps_history() {
        let mut store = ConversationStore::new();
        store.append_user(Provider::OpenAI, "Hi");
        store.set_instructions(Provider::OpenAI, "Be terse");
        store.set_instructions(Provider::OpenAI, "Be verbose");

        let conversation = store.get(Provider::OpenAI);
        assert_eq!(conversation.instructions(), "Be verbose");
        assert_eq!(conversation.history(), &[Message::user("Hi")]);
    }

    #[test]
    fn providers_are_isolated() {
        let mut store = ConversationStore::new();
        store.set_instructions(Provider::OpenAI, "Reply in French");
        store.append_user(Provider::OpenAI, "Hi");
        store.append_assistant(Provider::OpenAI, "Salut");
        let before = store.get(Provider::OpenAI).clone();

        store.set_instructions(Provider::Gemini, "Reply in German");
        store.append_user(Provider::Gemini, "Hallo?");

        assert_eq!(store.get(Provider::OpenAI), &before);
        let gemini = store.get(Provider::Gemini);
        assert_eq!(gemini.instructions(), "Reply in German");
        assert_eq!(gemini.history(), &[Message::user("Hallo?")]);
    }
}
