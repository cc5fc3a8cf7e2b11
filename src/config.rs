//! Configuration for the orchestrator and the platform client.
//!
//! Defaults are usable as-is; `from_env` overrides individual values.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AgentError, Result};

/// Turn orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model to use
    pub model: String,

    /// Temperature for generation
    pub temperature: Option<f32>,

    /// Completion token cap per model call
    pub max_completion_tokens: Option<u32>,

    /// Step budget for one turn
    pub max_steps: usize,

    /// Whole-turn deadline
    pub turn_timeout: Option<Duration>,

    /// Run the tool calls of one step concurrently
    pub parallel_tools: bool,

    /// Optional cap on concurrently running tool calls
    pub tool_concurrency_limit: Option<usize>,

    /// Remote platform settings
    pub spotify: SpotifyConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: None,
            max_completion_tokens: None,
            max_steps: 20,
            turn_timeout: Some(Duration::from_secs(30)),
            parallel_tools: true,
            tool_concurrency_limit: None,
            spotify: SpotifyConfig::default(),
        }
    }
}

/// Spotify Web API client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    /// Base URL, without trailing slash
    pub api_base: String,

    /// Timeout for a whole request
    pub request_timeout: Duration,

    /// Timeout for establishing the connection
    pub connect_timeout: Duration,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.spotify.com/v1".to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl AgentConfig {
    /// Defaults overridden by `PLAYLIST_AGENT_*` / `SPOTIFY_API_BASE` variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(model) = lookup("PLAYLIST_AGENT_MODEL") {
            cfg.model = model;
        }
        if let Some(t) = parse(&lookup, "PLAYLIST_AGENT_TEMPERATURE")? {
            cfg.temperature = Some(t);
        }
        if let Some(mt) = parse(&lookup, "PLAYLIST_AGENT_MAX_COMPLETION_TOKENS")? {
            cfg.max_completion_tokens = Some(mt);
        }
        if let Some(steps) = parse::<usize, _>(&lookup, "PLAYLIST_AGENT_MAX_STEPS")? {
            if steps == 0 {
                return Err(AgentError::Config {
                    key: "PLAYLIST_AGENT_MAX_STEPS".into(),
                    message: "must be at least 1".into(),
                });
            }
            cfg.max_steps = steps;
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "PLAYLIST_AGENT_TURN_TIMEOUT_SECS")? {
            // 0 disables the deadline
            cfg.turn_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(p) = parse(&lookup, "PLAYLIST_AGENT_PARALLEL_TOOLS")? {
            cfg.parallel_tools = p;
        }
        if let Some(base) = lookup("SPOTIFY_API_BASE") {
            cfg.spotify.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(secs) = parse(&lookup, "SPOTIFY_REQUEST_TIMEOUT_SECS")? {
            cfg.spotify.request_timeout = Duration::from_secs(secs);
        }
        Ok(cfg)
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AgentError::Config {
                key: key.to_string(),
                message: e.to_string(),
            }),
    }
}
