//! Command-line entry point: flag parsing, settings resolution, and session
//! bootstrap.

use std::error::Error;

use clap::Parser;
use tracing::warn;

use crate::core::app::{App, SessionSettings};
use crate::core::config::Config;
use crate::core::store::ChatsFile;
use crate::ui::chat_loop::run_chat_loop;
use crate::ui::theme::Theme;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Parser)]
#[command(name = "causerie")]
#[command(about = "A terminal chat client with multiple persisted conversations")]
#[command(long_about = "Causerie is a full-screen terminal chat client. Conversations live in a \
sidebar, persist across sessions, and replies stream in token by token from any \
OpenAI-compatible API.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    Your API key (required)\n\
  OPENAI_BASE_URL   Custom API base URL (optional, defaults to https://api.openai.com/v1)\n\n\
Controls:\n\
  Enter             Send the message (Alt+Enter inserts a newline)\n\
  Ctrl+N / Ctrl+D   New chat / delete the current chat\n\
  Ctrl+R            Rename the current chat\n\
  Ctrl+Up/Down      Switch between chats\n\
  Ctrl+B            Toggle the sidebar\n\
  Ctrl+L            Pause/resume transcript logging\n\
  Up/Down/Mouse     Scroll through the transcript\n\
  Esc               Cancel the in-flight reply\n\
  Ctrl+C            Quit")]
pub struct Args {
    #[arg(short, long, help = "Model to use for chat")]
    pub model: Option<String>,

    #[arg(long, help = "API base URL (overrides OPENAI_BASE_URL and config)")]
    pub base_url: Option<String>,

    #[arg(long, help = "UI theme (dark, light)")]
    pub theme: Option<String>,

    #[arg(long, help = "Append the conversation transcript to this file")]
    pub log: Option<String>,
}

/// Flags beat environment, environment beats config, config beats built-in
/// defaults.
fn resolve_settings(
    args: &Args,
    config: &Config,
    env_base_url: Option<String>,
    api_key: String,
) -> SessionSettings {
    let base_url = args
        .base_url
        .clone()
        .or(env_base_url)
        .or_else(|| config.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let model = args
        .model
        .clone()
        .or_else(|| config.default_model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let theme_name = args
        .theme
        .clone()
        .or_else(|| config.theme.clone())
        .unwrap_or_else(|| "dark".to_string());

    SessionSettings {
        model,
        base_url,
        api_key,
        theme: Theme::from_name(&theme_name),
        sidebar_visible: config.sidebar_visible.unwrap_or(true),
        log_file: args.log.clone(),
    }
}

fn missing_api_key_message() -> String {
    "Error: OPENAI_API_KEY environment variable not set\n\n\
Please set your API key:\n\
export OPENAI_API_KEY=\"your-api-key-here\"\n\n\
Optionally, you can also set a custom base URL:\n\
export OPENAI_BASE_URL=\"https://api.openai.com/v1\""
        .to_string()
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    // Keep the TUI clean: diagnostics only flow when RUST_LOG asks for them.
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    let config = Config::load()?;
    let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| missing_api_key_message())?;
    let env_base_url = std::env::var("OPENAI_BASE_URL").ok();

    let settings = resolve_settings(&args, &config, env_base_url, api_key);

    let persistence = ChatsFile::default_location();
    let chats = match persistence.load() {
        Ok(chats) => chats,
        Err(e) => {
            // An unreadable store starts the session fresh rather than
            // refusing to launch.
            warn!(error = %e, "could not load persisted chats");
            Vec::new()
        }
    };

    let app = App::new(settings, persistence, chats);
    run_chat_loop(app).await
}
