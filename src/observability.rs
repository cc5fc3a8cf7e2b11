//! Observability: step tracing and per-step diagnostics.
//!
//! - `TracingLayer` wraps a step service in an `info_span!("step")` and logs
//!   token usage and invoked tools when the step completes.
//! - `StepStats` is what an optional [`StepObserver`] sees after each step.
//!   Observers are passive and never influence the loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_openai::types::CreateChatCompletionRequest;
use serde::Serialize;
use tower::{BoxError, Layer, Service};
use tracing::{info, info_span, Instrument};

use crate::core::StepOutcome;

/// Diagnostics for one completed step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStats {
    pub step: usize,
    pub invoked_tools: Vec<String>,
    pub text_len: usize,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub session_id: Option<String>,
}

impl StepStats {
    pub fn from_outcome(step: usize, outcome: &StepOutcome, session_id: Option<&str>) -> Self {
        let aux = outcome.aux();
        Self {
            step,
            invoked_tools: outcome.invoked_tools(),
            text_len: outcome.text().map(str::len).unwrap_or(0),
            prompt_tokens: aux.prompt_tokens,
            completion_tokens: aux.completion_tokens,
            session_id: session_id.map(str::to_string),
        }
    }
}

/// Callback invoked after every step.
pub type StepObserver = Arc<dyn Fn(&StepStats) + Send + Sync>;

/// Observer that logs each step at debug level.
pub fn log_observer() -> StepObserver {
    Arc::new(|stats: &StepStats| {
        tracing::debug!(
            step = stats.step,
            tools = ?stats.invoked_tools,
            text_len = stats.text_len,
            session = ?stats.session_id,
            "step finished"
        );
    })
}

/// Layer that adds tracing around step executions.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLayer;

impl TracingLayer {
    pub fn new() -> Self {
        Self
    }
}

pub struct Tracing<S> {
    inner: S,
}

impl<S> Layer<S> for TracingLayer {
    type Service = Tracing<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Tracing { inner }
    }
}

impl<S> Service<CreateChatCompletionRequest> for Tracing<S>
where
    S: Service<CreateChatCompletionRequest, Response = StepOutcome, Error = BoxError>
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = StepOutcome;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: CreateChatCompletionRequest) -> Self::Future {
        let span = info_span!("step", model = %req.model, messages = req.messages.len());
        let fut = self.inner.call(req).instrument(span);
        Box::pin(async move {
            let out = fut.await?;
            let aux = out.aux();
            match &out {
                StepOutcome::Next { .. } => info!(
                    prompt = aux.prompt_tokens,
                    completion = aux.completion_tokens,
                    tools = aux.tool_invocations,
                    tool_errors = aux.tool_errors,
                    invoked = ?out.invoked_tools(),
                    "step next"
                ),
                StepOutcome::Done { .. } => info!(
                    prompt = aux.prompt_tokens,
                    completion = aux.completion_tokens,
                    "step done"
                ),
            }
            Ok(out)
        })
    }
}
