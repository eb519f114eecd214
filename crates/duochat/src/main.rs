use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use reedline::{DefaultPrompt, DefaultPromptSegment, Reedline, Signal};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use duochat::cli::{Command, HELP, missing_key_hint, render_message};
use duochat::config::Config;
use duochat::conversation::ConversationStore;
use duochat::llm::{Provider, ProviderRegistry};
use duochat::orchestrator::{Orchestrator, Reply, TurnError, TurnInput};

#[derive(Parser)]
#[command(name = "duochat", version, about = "Chat with OpenAI or Gemini from the terminal")]
struct Cli {
    /// Path to the config file
    #[arg(short, long, default_value = "duochat.yaml")]
    config: PathBuf,

    /// Provider to start with (openai or gemini)
    #[arg(short, long)]
    provider: Option<Provider>,

    /// OpenAI API key (falls back to OPENAI_API_KEY)
    #[arg(long)]
    openai_api_key: Option<String>,

    /// Gemini API key (falls back to GEMINI_API_KEY)
    #[arg(long)]
    gemini_api_key: Option<String>,

    /// Initial custom instructions for every provider
    #[arg(long)]
    instructions: Option<String>,
}

struct Credentials {
    openai: Option<String>,
    gemini: Option<String>,
}

impl Credentials {
    fn for_provider(&self, provider: Provider) -> Option<String> {
        match provider {
            Provider::OpenAI => self.openai.clone(),
            Provider::Gemini => self.gemini.clone(),
        }
    }

    fn available(&self, provider: Provider) -> bool {
        self.for_provider(provider).is_some()
    }
}

/// Explicit flag wins, then the provider's environment variable. Blank keys
/// count as missing.
fn flag_or_env(flag: Option<String>, provider: Provider) -> Option<String> {
    flag.or_else(|| std::env::var(provider.api_key_env()).ok())
        .filter(|key| !key.trim().is_empty())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .await
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    let orchestrator = Orchestrator::new(ProviderRegistry::new(config.providers.clone()));
    let mut store = ConversationStore::new();
    let mut provider = cli.provider.unwrap_or(config.default_provider);

    if let Some(ref instructions) = cli.instructions {
        for p in Provider::ALL {
            store.set_instructions(p, instructions.clone());
        }
    }

    let credentials = Credentials {
        openai: flag_or_env(cli.openai_api_key, Provider::OpenAI),
        gemini: flag_or_env(cli.gemini_api_key, Provider::Gemini),
    };

    println!("duochat: chatting with {}. Type /help for commands.", provider.display_name());
    if !credentials.available(provider) {
        println!("{}", missing_key_hint(provider));
    }

    let mut editor = Reedline::create();
    loop {
        let prompt = DefaultPrompt::new(
            DefaultPromptSegment::Basic(provider.key().to_string()),
            DefaultPromptSegment::Empty,
        );
        let line = match editor.read_line(&prompt).context("failed to read input")? {
            Signal::Success(line) => line,
            Signal::CtrlD => break,
            _ => continue,
        };

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        match command {
            Command::Empty => {}
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::History => render_history(&mut store, provider),
            Command::Provider(next) => {
                provider = next;
                println!("Switched to {}.", provider.display_name());
                if !credentials.available(provider) {
                    println!("{}", missing_key_hint(provider));
                }
                render_history(&mut store, provider);
            }
            Command::Instructions(None) => {
                let conversation = store.get(provider);
                if conversation.instructions().trim().is_empty() {
                    println!("(no custom instructions)");
                } else {
                    println!("{}", conversation.instructions());
                }
            }
            Command::Instructions(Some(text)) => {
                store.set_instructions(provider, text);
                println!("Instructions updated for {}.", provider.display_name());
            }
            Command::Prompt(prompt) => {
                let input =
                    TurnInput::new(provider, prompt).with_credential(credentials.for_provider(provider));
                run_turn(&orchestrator, &mut store, input).await;
            }
        }
    }

    Ok(())
}

async fn run_turn(orchestrator: &Orchestrator, store: &mut ConversationStore, input: TurnInput) {
    let reply = match orchestrator.submit(store, input).await {
        Ok(reply) => reply,
        Err(TurnError::MissingCredential { provider }) => {
            println!("{}", missing_key_hint(provider));
            return;
        }
        Err(e) => {
            eprintln!("error: {e}");
            return;
        }
    };

    match reply {
        Reply::Complete(text) => println!("{text}"),
        Reply::Streaming(mut stream) => {
            let mut stdout = std::io::stdout();
            while let Some(fragment) = stream.next().await {
                match fragment {
                    Ok(fragment) => {
                        print!("{fragment}");
                        let _ = stdout.flush();
                    }
                    Err(e) => {
                        println!();
                        eprintln!("error: {e}");
                        return;
                    }
                }
            }
            println!();
        }
    }
}

fn render_history(store: &mut ConversationStore, provider: Provider) {
    for message in store.get(provider).history() {
        println!("{}", render_message(message));
    }
}
