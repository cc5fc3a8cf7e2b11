//! Step service and loop policies.
//!
//! A [`Step`] is one model invocation plus the tool calls it requested. The
//! orchestrator drives steps until a policy stops it.

use std::{future::Future, pin::Pin, sync::Arc};

use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestToolMessageArgs, ChatCompletionTool, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs,
};
use tokio::sync::Semaphore;
use tower::{BoxError, Layer, Service, ServiceExt};

use crate::provider::{ModelService, ProviderResponse};
use crate::tools::{ToolInvocation, ToolOutput};

// =============================
// Step service and layer
// =============================

/// Auxiliary accounting captured per step.
#[derive(Debug, Clone, Default)]
pub struct StepAux {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub tool_invocations: usize,
    pub tool_errors: usize,
}

/// Outcome of a single agent step.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Tools ran; the model needs another look.
    Next {
        messages: Vec<ChatCompletionRequestMessage>,
        aux: StepAux,
        text: Option<String>,
        calls: Vec<ToolInvocation>,
        results: Vec<ToolOutput>,
    },
    /// The model answered without requesting tools.
    Done {
        messages: Vec<ChatCompletionRequestMessage>,
        aux: StepAux,
        text: Option<String>,
    },
}

impl StepOutcome {
    pub fn aux(&self) -> &StepAux {
        match self {
            Self::Next { aux, .. } | Self::Done { aux, .. } => aux,
        }
    }

    /// Assistant text of this step, if non-blank.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Next { text, .. } | Self::Done { text, .. } => {
                text.as_deref().filter(|t| !t.trim().is_empty())
            }
        }
    }

    pub fn invoked_tools(&self) -> Vec<String> {
        match self {
            Self::Next { calls, .. } => calls.iter().map(|c| c.name.clone()).collect(),
            Self::Done { .. } => Vec::new(),
        }
    }

    pub fn into_messages(self) -> Vec<ChatCompletionRequestMessage> {
        match self {
            Self::Next { messages, .. } | Self::Done { messages, .. } => messages,
        }
    }
}

/// One-step agent service parameterized by a routed tool service `S`.
pub struct Step<S, P> {
    provider: Arc<tokio::sync::Mutex<P>>,
    model: String,
    temperature: Option<f32>,
    max_completion_tokens: Option<u32>,
    tools: S,
    tool_specs: Arc<Vec<ChatCompletionTool>>,
    parallel_tools: bool,
    tool_concurrency_limit: Option<usize>,
}

impl<S, P> Step<S, P> {
    pub fn new(
        provider: P,
        model: impl Into<String>,
        tools: S,
        tool_specs: Vec<ChatCompletionTool>,
    ) -> Self {
        Self {
            provider: Arc::new(tokio::sync::Mutex::new(provider)),
            model: model.into(),
            temperature: None,
            max_completion_tokens: None,
            tools,
            tool_specs: Arc::new(tool_specs),
            parallel_tools: false,
            tool_concurrency_limit: None,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn max_completion_tokens(mut self, mt: u32) -> Self {
        self.max_completion_tokens = Some(mt);
        self
    }

    pub fn enable_parallel_tools(mut self, enabled: bool) -> Self {
        self.parallel_tools = enabled;
        self
    }

    pub fn tool_concurrency_limit(mut self, limit: usize) -> Self {
        self.tool_concurrency_limit = Some(limit);
        self
    }
}

/// Layer that lifts a routed tool service `S` into a `Step<S>` service.
pub struct StepLayer<P> {
    provider: P,
    model: String,
    temperature: Option<f32>,
    max_completion_tokens: Option<u32>,
    tool_specs: Vec<ChatCompletionTool>,
    parallel_tools: bool,
    tool_concurrency_limit: Option<usize>,
}

impl<P> StepLayer<P> {
    pub fn new(provider: P, model: impl Into<String>, tool_specs: Vec<ChatCompletionTool>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: None,
            max_completion_tokens: None,
            tool_specs,
            parallel_tools: false,
            tool_concurrency_limit: None,
        }
    }

    pub fn temperature(mut self, t: Option<f32>) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_completion_tokens(mut self, mt: Option<u32>) -> Self {
        self.max_completion_tokens = mt;
        self
    }

    pub fn parallel_tools(mut self, enabled: bool) -> Self {
        self.parallel_tools = enabled;
        self
    }

    pub fn tool_concurrency_limit(mut self, limit: Option<usize>) -> Self {
        self.tool_concurrency_limit = limit;
        self
    }
}

impl<S, P> Layer<S> for StepLayer<P>
where
    P: Clone,
{
    type Service = Step<S, P>;

    fn layer(&self, tools: S) -> Self::Service {
        let mut s = Step::new(
            self.provider.clone(),
            self.model.clone(),
            tools,
            self.tool_specs.clone(),
        );
        s.temperature = self.temperature;
        s.max_completion_tokens = self.max_completion_tokens;
        s.parallel_tools = self.parallel_tools;
        s.tool_concurrency_limit = self.tool_concurrency_limit;
        s
    }
}

impl<S, P> Service<CreateChatCompletionRequest> for Step<S, P>
where
    S: Service<ToolInvocation, Response = ToolOutput, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    P: ModelService + Send + 'static,
    P::Future: Send + 'static,
{
    type Response = StepOutcome;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        // Provider and tools readiness is awaited inside `call`
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CreateChatCompletionRequest) -> Self::Future {
        let provider = self.provider.clone();
        let model = self.model.clone();
        let temperature = self.temperature;
        let max_completion_tokens = self.max_completion_tokens;
        let tools = self.tools.clone();
        let tool_specs = self.tool_specs.clone();
        let parallel_tools = self.parallel_tools;
        let tool_concurrency_limit = self.tool_concurrency_limit;

        Box::pin(async move {
            let mut builder = CreateChatCompletionRequestArgs::default();
            builder.messages(req.messages.clone());
            builder.model(if req.model.is_empty() { &model } else { &req.model });
            if let Some(t) = req.temperature.or(temperature) {
                builder.temperature(t);
            }
            if let Some(mt) = max_completion_tokens {
                builder.max_completion_tokens(mt);
            }
            if let Some(ts) = req.tools.clone() {
                builder.tools(ts);
            } else if !tool_specs.is_empty() {
                builder.tools((*tool_specs).clone());
            }
            let rebuilt_req = builder
                .build()
                .map_err(|e| format!("request build error: {}", e))?;

            let mut messages = rebuilt_req.messages.clone();

            let ProviderResponse {
                content,
                tool_calls,
                prompt_tokens,
                completion_tokens,
            } = {
                let mut p = provider.lock().await;
                ServiceExt::ready(&mut *p).await?.call(rebuilt_req).await?
            };
            let mut aux = StepAux {
                prompt_tokens,
                completion_tokens,
                ..StepAux::default()
            };

            // Append assistant message by constructing request-side equivalent
            let mut asst_builder = ChatCompletionRequestAssistantMessageArgs::default();
            asst_builder.content(content.clone().unwrap_or_default());
            if !tool_calls.is_empty() {
                asst_builder.tool_calls(tool_calls.clone());
            }
            messages.push(asst_builder.build()?.into());

            if tool_calls.is_empty() {
                return Ok(StepOutcome::Done {
                    messages,
                    aux,
                    text: content,
                });
            }

            let calls: Vec<ToolInvocation> = tool_calls
                .iter()
                .map(|tc| ToolInvocation::from_raw(&tc.id, &tc.function.name, &tc.function.arguments))
                .collect();

            let results: Vec<ToolOutput> = if calls.len() > 1 && parallel_tools {
                // Fire in parallel, preserve order
                let sem = tool_concurrency_limit.map(|n| Arc::new(Semaphore::new(n.max(1))));
                let pending = calls.iter().cloned().map(|inv| {
                    let mut svc = tools.clone();
                    let sem = sem.clone();
                    async move {
                        let _permit = match sem {
                            Some(s) => Some(s.acquire_owned().await?),
                            None => None,
                        };
                        ServiceExt::ready(&mut svc).await?.call(inv).await
                    }
                });
                futures::future::try_join_all(pending).await?
            } else {
                let mut out = Vec::with_capacity(calls.len());
                for inv in calls.iter().cloned() {
                    let mut svc = tools.clone();
                    out.push(ServiceExt::ready(&mut svc).await?.call(inv).await?);
                }
                out
            };

            for result in &results {
                aux.tool_invocations += 1;
                if result.is_error() {
                    aux.tool_errors += 1;
                }
                let tool_msg = ChatCompletionRequestToolMessageArgs::default()
                    .content(result.to_value().to_string())
                    .tool_call_id(result.id.clone())
                    .build()?;
                messages.push(tool_msg.into());
            }

            Ok(StepOutcome::Next {
                messages,
                aux,
                text: content,
                calls,
                results,
            })
        })
    }
}

// =============================
// Loop policies
// =============================

/// Stop reasons reported by the turn loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStopReason {
    DoneNoToolCalls,
    MaxSteps,
    DeadlineExceeded,
}

/// Loop state visible to policies.
#[derive(Debug, Clone, Default)]
pub struct LoopState {
    pub steps: usize,
}

/// Policy interface controlling loop termination.
pub trait AgentPolicy: Send + Sync {
    fn decide(&self, state: &LoopState, last: &StepOutcome) -> Option<AgentStopReason>;
}

/// Function-backed policy for ergonomic composition.
#[derive(Clone)]
#[allow(clippy::type_complexity)]
pub struct PolicyFn(
    pub Arc<dyn Fn(&LoopState, &StepOutcome) -> Option<AgentStopReason> + Send + Sync + 'static>,
);

impl AgentPolicy for PolicyFn {
    fn decide(&self, state: &LoopState, last: &StepOutcome) -> Option<AgentStopReason> {
        (self.0)(state, last)
    }
}

/// Composite policy: stop when any sub-policy returns a stop reason.
#[derive(Clone, Default)]
pub struct CompositePolicy {
    policies: Vec<PolicyFn>,
}

impl CompositePolicy {
    pub fn new(policies: Vec<PolicyFn>) -> Self {
        Self { policies }
    }

    pub fn push(&mut self, p: PolicyFn) {
        self.policies.push(p);
    }
}

impl AgentPolicy for CompositePolicy {
    fn decide(&self, state: &LoopState, last: &StepOutcome) -> Option<AgentStopReason> {
        self.policies.iter().find_map(|p| p.decide(state, last))
    }
}

/// Built-in policies
pub mod policies {
    use super::*;

    pub fn until_no_tool_calls() -> PolicyFn {
        PolicyFn(Arc::new(|_s, last| match last {
            StepOutcome::Done { .. } => Some(AgentStopReason::DoneNoToolCalls),
            _ => None,
        }))
    }

    pub fn max_steps(max: usize) -> PolicyFn {
        PolicyFn(Arc::new(move |s, _| {
            if s.steps >= max {
                Some(AgentStopReason::MaxSteps)
            } else {
                None
            }
        }))
    }
}
