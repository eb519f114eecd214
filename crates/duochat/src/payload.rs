//! Request payload builders.
//!
//! Each provider family gets one pure function that turns the stored
//! instructions and history into its native turn list. Payloads are rebuilt
//! from scratch on every turn and never stored.

use serde::{Deserialize, Serialize};

use crate::llm::{Message, Role};

/// Prefix used to smuggle instructions into a generation payload, which has
/// no system role.
pub const SYSTEM_INSTRUCTIONS_PREFIX: &str = "System instructions: ";

/// A turn in the generation (Gemini-style) request shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationContent {
    pub role: GenerationRole,
    pub parts: Vec<Part>,
}

impl GenerationContent {
    fn text(role: GenerationRole, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part { text: text.into() }],
        }
    }
}

/// Roles understood by the generation API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationRole {
    User,
    Model,
}

/// A single text part of a generation turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Part {
    pub text: String,
}

/// Build the chat-completion turn list.
///
/// Non-blank instructions become one leading system turn; history follows
/// verbatim.
pub fn build_chat_payload(instructions: &str, history: &[Message]) -> Vec<Message> {
    let instructions = instructions.trim();
    let mut payload = Vec::with_capacity(history.len() + 1);

    if !instructions.is_empty() {
        payload.push(Message::system(instructions));
    }
    payload.extend(history.iter().cloned());

    payload
}

/// Build the generation turn list.
///
/// Non-blank instructions become a synthetic leading user turn. Anything that
/// is not a user message is sent as `model`.
pub fn build_generation_payload(instructions: &str, history: &[Message]) -> Vec<GenerationContent> {
    let instructions = instructions.trim();
    let mut contents = Vec::with_capacity(history.len() + 1);

    if !instructions.is_empty() {
        contents.push(GenerationContent::text(
            GenerationRole::User,
            format!("{SYSTEM_INSTRUCTIONS_PREFIX}{instructions}"),
        ));
    }

    contents.extend(history.iter().map(|message| {
        let role = match message.role {
            Role::User => GenerationRole::User,
            Role::Assistant | Role::System => GenerationRole::Model,
        };
        GenerationContent::text(role, message.content.clone())
    }));

    contents
}
