//! Turn driver.
//!
//! One [`Orchestrator`] call handles one conversational turn: the history is
//! converted, the four playlist tools are bound to this turn's token accessor,
//! and the step service runs until the model answers without tool calls, the
//! step budget is spent, or the turn deadline passes.
//!
//! [`Orchestrator::stream_turn`] reports progress as [`TurnEvent`]s over a
//! channel; [`Orchestrator::run_turn`] drives the same loop and returns only
//! the outcome.

use std::sync::Arc;

use async_openai::types::{ChatCompletionRequestMessage, CreateChatCompletionRequestArgs};
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower::{BoxError, Layer, Service, ServiceExt};
use tracing::{debug, info, warn};

use crate::auth::SharedTokenProvider;
use crate::config::AgentConfig;
use crate::core::{
    policies, AgentPolicy, AgentStopReason, CompositePolicy, LoopState, StepLayer, StepOutcome,
};
use crate::error::AgentError;
use crate::messages::{to_request_messages, ConversationMessage};
use crate::observability::{StepObserver, StepStats, TracingLayer};
use crate::prompts::{self, FALLBACK_RESPONSE, SYSTEM_PROMPT};
use crate::provider::{tool_call, ModelService};
use crate::spotify::SharedPlaylistApi;
use crate::tools::{playlist_tools, ToolRouter};

/// Input of one turn.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub messages: Vec<ConversationMessage>,
    pub session_id: Option<String>,
}

impl TurnRequest {
    pub fn new(messages: Vec<ConversationMessage>) -> Self {
        Self {
            messages,
            session_id: None,
        }
    }

    pub fn session(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }
}

/// Result of a finished turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Assistant text of every step, blank-line separated; the fallback message when empty.
    pub text: String,
    pub steps: usize,
    pub stop: AgentStopReason,
    /// Assistant and tool messages produced during the turn, ending with the fallback when it was used.
    pub appended: Vec<ConversationMessage>,
}

/// Progress of a streamed turn.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    StepStarted(usize),
    TextDelta(String),
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolResult {
        id: String,
        name: String,
        output: Value,
        is_error: bool,
    },
    Finished(TurnOutcome),
    Failed(String),
}

pub type TurnStream = ReceiverStream<TurnEvent>;

/// Reassemble the reply text from a turn's events.
pub async fn collect_text<S>(stream: S) -> String
where
    S: Stream<Item = TurnEvent>,
{
    futures::pin_mut!(stream);
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        if let TurnEvent::TextDelta(delta) = event {
            text.push_str(&delta);
        }
    }
    text
}

/// Conversational playlist agent.
#[derive(Clone)]
pub struct Orchestrator<P> {
    provider: P,
    api: SharedPlaylistApi,
    config: AgentConfig,
    system_prompt: Arc<str>,
    observer: Option<StepObserver>,
    policy: Option<CompositePolicy>,
}

pub struct OrchestratorBuilder<P> {
    provider: P,
    api: SharedPlaylistApi,
    config: AgentConfig,
    system_prompt: String,
    observer: Option<StepObserver>,
    policy: Option<CompositePolicy>,
}

impl<P> OrchestratorBuilder<P> {
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Keep the default prompt and append `extra` after a blank line.
    pub fn extra_instructions(mut self, extra: &str) -> Self {
        self.system_prompt = prompts::with_context(extra);
        self
    }

    pub fn observer(mut self, observer: StepObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Extra stop conditions. The step budget and the no-tool-calls stop always apply.
    pub fn policy(mut self, policy: CompositePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn build(self) -> Orchestrator<P> {
        Orchestrator {
            provider: self.provider,
            api: self.api,
            config: self.config,
            system_prompt: self.system_prompt.into(),
            observer: self.observer,
            policy: self.policy,
        }
    }
}

/// Per-turn accumulation, kept outside the deadline so it survives expiry.
#[derive(Default)]
struct TurnState {
    steps: usize,
    texts: Vec<String>,
    appended: Vec<ConversationMessage>,
}

type Events<'a> = Option<&'a mpsc::Sender<TurnEvent>>;

async fn emit(events: Events<'_>, event: TurnEvent) -> Result<(), AgentError> {
    match events {
        Some(tx) => tx.send(event).await.map_err(|_| AgentError::Cancelled),
        None => Ok(()),
    }
}

impl<P> Orchestrator<P>
where
    P: ModelService + Clone + Send + Sync + 'static,
    P::Future: Send + 'static,
{
    pub fn builder(provider: P, api: SharedPlaylistApi) -> OrchestratorBuilder<P> {
        OrchestratorBuilder {
            provider,
            api,
            config: AgentConfig::default(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            observer: None,
            policy: None,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run a turn and stream its events. The stream ends after `Finished` or `Failed`.
    pub fn stream_turn(&self, request: TurnRequest, token: SharedTokenProvider) -> TurnStream {
        let (tx, rx) = mpsc::channel::<TurnEvent>(32);
        let this = self.clone();
        tokio::spawn(async move {
            match this.drive(request, token, Some(&tx)).await {
                Ok(outcome) => {
                    let _ = tx.send(TurnEvent::Finished(outcome)).await;
                }
                Err(AgentError::Cancelled) => debug!("turn stream dropped by caller"),
                Err(e) => {
                    warn!(error = %e, "turn failed");
                    let _ = tx.send(TurnEvent::Failed(e.to_string())).await;
                }
            }
        });
        ReceiverStream::new(rx)
    }

    /// Run a turn to completion without streaming.
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        token: SharedTokenProvider,
    ) -> Result<TurnOutcome, AgentError> {
        self.drive(request, token, None).await
    }

    async fn drive(
        &self,
        request: TurnRequest,
        token: SharedTokenProvider,
        events: Events<'_>,
    ) -> Result<TurnOutcome, AgentError> {
        let messages = to_request_messages(&self.system_prompt, &request.messages)?;
        let (router, specs) =
            ToolRouter::new(playlist_tools(token, self.api.clone())).map_err(AgentError::Tool)?;
        let step_layer = StepLayer::new(self.provider.clone(), &self.config.model, specs)
            .temperature(self.config.temperature)
            .max_completion_tokens(self.config.max_completion_tokens)
            .parallel_tools(self.config.parallel_tools)
            .tool_concurrency_limit(self.config.tool_concurrency_limit);
        let mut step = TracingLayer::new().layer(step_layer.layer(router));

        let session_id = request.session_id.as_deref();
        info!(
            session = ?session_id,
            history = request.messages.len(),
            max_steps = self.config.max_steps,
            "turn started"
        );

        let mut state = TurnState::default();
        let run = self.run_steps(&mut step, messages, &mut state, session_id, events);
        let stop = match self.config.turn_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(stop) => stop?,
                Err(_) => {
                    warn!(?limit, steps = state.steps, "turn deadline exceeded");
                    AgentStopReason::DeadlineExceeded
                }
            },
            None => run.await?,
        };

        let mut text = state.texts.join("\n\n");
        if text.trim().is_empty() && stop != AgentStopReason::DeadlineExceeded {
            text = FALLBACK_RESPONSE.to_string();
            state
                .appended
                .push(ConversationMessage::assistant(text.clone()));
            emit(events, TurnEvent::TextDelta(text.clone())).await?;
        }
        info!(steps = state.steps, stop = ?stop, "turn finished");

        Ok(TurnOutcome {
            text,
            steps: state.steps,
            stop,
            appended: state.appended,
        })
    }

    async fn run_steps<S>(
        &self,
        step: &mut S,
        mut messages: Vec<ChatCompletionRequestMessage>,
        state: &mut TurnState,
        session_id: Option<&str>,
        events: Events<'_>,
    ) -> Result<AgentStopReason, AgentError>
    where
        S: Service<
                async_openai::types::CreateChatCompletionRequest,
                Response = StepOutcome,
                Error = BoxError,
            > + Send,
        S::Future: Send,
    {
        let budget = policies::max_steps(self.config.max_steps.max(1));
        loop {
            let n = state.steps + 1;
            emit(events, TurnEvent::StepStarted(n)).await?;

            let req = CreateChatCompletionRequestArgs::default()
                .model(&self.config.model)
                .messages(messages)
                .build()?;
            let outcome = step
                .ready()
                .await
                .map_err(AgentError::Model)?
                .call(req)
                .await
                .map_err(AgentError::Model)?;
            state.steps = n;

            if let Some(text) = outcome.text() {
                let delta = if state.texts.is_empty() {
                    text.to_string()
                } else {
                    format!("\n\n{text}")
                };
                state.texts.push(text.to_string());
                emit(events, TurnEvent::TextDelta(delta)).await?;
            }

            match &outcome {
                StepOutcome::Next { calls, results, .. } => {
                    for call in calls {
                        emit(
                            events,
                            TurnEvent::ToolCall {
                                id: call.id.clone(),
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            },
                        )
                        .await?;
                    }
                    for result in results {
                        emit(
                            events,
                            TurnEvent::ToolResult {
                                id: result.id.clone(),
                                name: result.name.clone(),
                                output: result.to_value(),
                                is_error: result.is_error(),
                            },
                        )
                        .await?;
                    }
                    let requested: Vec<_> = calls
                        .iter()
                        .map(|c| tool_call(&c.id, &c.name, &c.arguments))
                        .collect();
                    state
                        .appended
                        .push(ConversationMessage::assistant_step(outcome.text(), &requested));
                    state.appended.push(ConversationMessage::tool_results(results));
                }
                StepOutcome::Done { .. } => {
                    if let Some(text) = outcome.text() {
                        state.appended.push(ConversationMessage::assistant(text));
                    }
                }
            }

            if let Some(observer) = &self.observer {
                observer(&StepStats::from_outcome(n, &outcome, session_id));
            }

            let loop_state = LoopState { steps: n };
            let stop = self
                .policy
                .as_ref()
                .and_then(|p| p.decide(&loop_state, &outcome))
                .or_else(|| policies::until_no_tool_calls().decide(&loop_state, &outcome))
                .or_else(|| budget.decide(&loop_state, &outcome));
            if let Some(stop) = stop {
                return Ok(stop);
            }
            messages = outcome.into_messages();
        }
    }
}
