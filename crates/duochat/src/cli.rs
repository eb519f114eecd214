//! REPL command parsing and rendering helpers.

use crate::llm::{Message, Provider, UnknownProvider};

pub const HELP: &str = "\
Type a message to chat with the current provider.

Commands:
  /provider <openai|gemini>   switch provider (each keeps its own history)
  /instructions [text]        show or set custom instructions for this provider
  /history                    show this provider's conversation
  /help                       show this help
  /quit                       exit";

/// A line entered at the prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Prompt(String),
    Provider(Provider),
    Instructions(Option<String>),
    History,
    Help,
    Quit,
    Empty,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '/{0}' (try /help)")]
    Unknown(String),

    #[error("usage: /provider <openai|gemini>")]
    MissingProvider,

    #[error("{0}")]
    BadProvider(String),
}

impl From<UnknownProvider> for CommandError {
    fn from(err: UnknownProvider) -> Self {
        CommandError::BadProvider(err.to_string())
    }
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Command::Empty);
        }
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Ok(Command::Prompt(line.to_string()));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        match name {
            "provider" | "p" if arg.is_empty() => Err(CommandError::MissingProvider),
            "provider" | "p" => Ok(Command::Provider(arg.parse()?)),
            "instructions" | "i" if arg.is_empty() => Ok(Command::Instructions(None)),
            "instructions" | "i" => Ok(Command::Instructions(Some(arg.to_string()))),
            "history" => Ok(Command::History),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

pub fn render_message(message: &Message) -> String {
    format!("[{}] {}", message.role, message.content)
}

pub fn missing_key_hint(provider: Provider) -> String {
    format!(
        "Please add your {} API key to continue (--{}-api-key or {}).",
        provider.display_name(),
        provider.key(),
        provider.api_key_env()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_prompts() {
        assert_eq!(
            Command::parse("What is up?").unwrap(),
            Command::Prompt("What is up?".to_string())
        );
        assert_eq!(Command::parse("   ").unwrap(), Command::Empty);
    }

    #[test]
    fn parses_provider_switch() {
        assert_eq!(
            Command::parse("/provider gemini").unwrap(),
            Command::Provider(Provider::Gemini)
        );
        assert_eq!(
            Command::parse("/p OpenAI").unwrap(),
            Command::Provider(Provider::OpenAI)
        );
        assert_eq!(
            Command::parse("/provider").unwrap_err(),
            CommandError::MissingProvider
        );
        assert!(matches!(
            Command::parse("/provider claude"),
            Err(CommandError::BadProvider(_))
        ));
    }

    #[test]
    fn parses_instructions() {
        assert_eq!(
            Command::parse("/instructions").unwrap(),
            Command::Instructions(None)
        );
        assert_eq!(
            Command::parse("/instructions  Reply in French ").unwrap(),
            Command::Instructions(Some("Reply in French".to_string()))
        );
    }

    #[test]
    fn parses_simple_commands() {
        assert_eq!(Command::parse("/history").unwrap(), Command::History);
        assert_eq!(Command::parse("/help").unwrap(), Command::Help);
        assert_eq!(Command::parse("/quit").unwrap(), Command::Quit);
        assert_eq!(
            Command::parse("/nope").unwrap_err(),
            CommandError::Unknown("nope".to_string())
        );
    }

    #[test]
    fn renders_messages_and_hints() {
        assert_eq!(render_message(&Message::assistant("Hi")), "[assistant] Hi");
        let hint = missing_key_hint(Provider::Gemini);
        assert!(hint.contains("--gemini-api-key"));
        assert!(hint.contains("GEMINI_API_KEY"));
    }
}
