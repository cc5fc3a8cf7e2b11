//! Command-line front end: `playlist-agent "add Yellow by Coldplay to Road trip"`.
//!
//! Reads `OPENAI_API_KEY` and `SPOTIFY_ACCESS_TOKEN` (a `.env` file is loaded
//! when present) and streams the reply to stdout. `PLAYLIST_AGENT_INSTRUCTIONS`
//! is appended to the system prompt. Tool activity is logged to
//! stderr; set `RUST_LOG=playlist_agent=debug` for more detail.

use std::io::Write;
use std::sync::Arc;

use dotenv::dotenv;
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use playlist_agent::{
    observability::log_observer, AgentConfig, Client, ConversationMessage, OpenAIConfig,
    OpenAIProvider, Orchestrator, SpotifyClient, StaticToken, TurnEvent, TurnRequest,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let prompt = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if prompt.trim().is_empty() {
        eprintln!("usage: playlist-agent \"<request>\"");
        std::process::exit(2);
    }

    let config = AgentConfig::from_env()?;
    let provider = OpenAIProvider::new(Arc::new(Client::<OpenAIConfig>::new()));
    let api = Arc::new(SpotifyClient::new(&config.spotify));
    let mut builder = Orchestrator::builder(provider, api)
        .config(config)
        .observer(log_observer());
    if let Ok(extra) = std::env::var("PLAYLIST_AGENT_INSTRUCTIONS") {
        builder = builder.extra_instructions(&extra);
    }
    let agent = builder.build();

    let token = Arc::new(StaticToken::from(std::env::var("SPOTIFY_ACCESS_TOKEN").ok()));
    let request = TurnRequest::new(vec![ConversationMessage::user(prompt)]);

    let mut events = agent.stream_turn(request, token);
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            TurnEvent::TextDelta(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            TurnEvent::ToolCall { name, arguments, .. } => {
                tracing::info!(tool = %name, %arguments, "calling tool");
            }
            TurnEvent::ToolResult { name, is_error: true, output, .. } => {
                tracing::warn!(tool = %name, %output, "tool reported an error");
            }
            TurnEvent::Finished(outcome) => {
                writeln!(stdout)?;
                tracing::info!(steps = outcome.steps, stop = ?outcome.stop, "done");
            }
            TurnEvent::Failed(message) => {
                writeln!(stdout)?;
                eprintln!("error: {message}");
                std::process::exit(1);
            }
            _ => {}
        }
    }
    Ok(())
}
