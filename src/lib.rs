//! # playlist-agent
//!
//! A Tower-based conversational agent that manages Spotify playlists through
//! natural-language requests.
//!
//! ## Core Concepts
//!
//! - **Orchestrator**: drives one turn. Model steps alternate with tool
//!   execution until the model answers in plain text or the step budget runs out.
//! - **Tools**: `listPlaylists`, `searchTracks`, `getPlaylistTracks` and
//!   `modifyPlaylist`, each a Tower service with a schemars-generated schema.
//! - **Seams**: the model ([`ModelService`]), the platform ([`PlaylistApi`])
//!   and the access token ([`TokenProvider`]) are injected, so tests swap in
//!   scripted fakes.
//!
//! ## Getting Started
//!
//! Set `OPENAI_API_KEY` and provide a Spotify access token.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_openai::{config::OpenAIConfig, Client};
//! use playlist_agent::{
//!     AgentConfig, ConversationMessage, OpenAIProvider, Orchestrator, SpotifyClient, StaticToken,
//!     TurnRequest,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let config = AgentConfig::default();
//! let provider = OpenAIProvider::new(Arc::new(Client::<OpenAIConfig>::new()));
//! let api = Arc::new(SpotifyClient::new(&config.spotify));
//! let agent = Orchestrator::builder(provider, api).config(config).build();
//!
//! let request = TurnRequest::new(vec![ConversationMessage::user("List my playlists")]);
//! let outcome = agent
//!     .run_turn(request, Arc::new(StaticToken::new("BQD...")))
//!     .await?;
//! println!("{}", outcome.text);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod core;
pub mod error;
pub mod messages;
pub mod observability;
pub mod orchestrator;
pub mod prompts;
pub mod provider;
pub mod spotify;
pub mod tools;
pub mod uri;

pub use crate::auth::{
    sync_token_fn, token_fn, ExpiringToken, SharedTokenProvider, StaticToken, TokenProvider,
    REQUIRED_SCOPES,
};
pub use crate::config::{AgentConfig, SpotifyConfig};
pub use crate::core::{
    policies, AgentPolicy, AgentStopReason, CompositePolicy, LoopState, PolicyFn, Step, StepAux,
    StepLayer, StepOutcome,
};
pub use crate::error::{AgentError, Result, ToolError, UpstreamKind};
pub use crate::messages::{ConversationMessage, MessagePart, Role};
pub use crate::observability::{StepObserver, StepStats, TracingLayer};
pub use crate::orchestrator::{
    collect_text, Orchestrator, OrchestratorBuilder, TurnEvent, TurnOutcome, TurnRequest,
    TurnStream,
};
pub use crate::provider::{ModelService, OpenAIProvider, ProviderResponse, SequenceProvider};
pub use crate::spotify::{PlaylistApi, SharedPlaylistApi, SpotifyClient};
pub use crate::tools::{playlist_tools, ToolDef, ToolInvocation, ToolOutput, ToolRouter};
pub use crate::uri::{normalize_track_uri, playlist_id};

// Re-export async-openai types that users need
pub use async_openai::{config::OpenAIConfig, Client};

// Re-export Tower traits that users need
pub use tower::{Layer, Service, ServiceExt};
