//! Model provider abstraction
//!
//! The step loop only sees [`ModelService`]: a Tower service from a chat
//! request to a [`ProviderResponse`] holding the assistant's text and/or tool
//! calls. [`OpenAIProvider`] is the production implementation;
//! [`SequenceProvider`] replays a script for tests and demos.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionToolType, CreateChatCompletionRequest,
        FunctionCall,
    },
    Client,
};
use serde_json::Value;
use tower::{BoxError, Service};

/// What one model invocation produced.
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ChatCompletionMessageToolCall>,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl ProviderResponse {
    /// Text-only answer.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Tool calls without text. Each entry is `(call id, tool name, arguments)`.
    pub fn tool_calls<I, S>(calls: I) -> Self
    where
        I: IntoIterator<Item = (S, S, Value)>,
        S: Into<String>,
    {
        Self {
            tool_calls: calls
                .into_iter()
                .map(|(id, name, args)| tool_call(id, name, &args))
                .collect(),
            ..Default::default()
        }
    }

    /// Attach text to a response.
    pub fn with_text(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

pub fn tool_call(
    id: impl Into<String>,
    name: impl Into<String>,
    arguments: &Value,
) -> ChatCompletionMessageToolCall {
    ChatCompletionMessageToolCall {
        id: id.into(),
        r#type: ChatCompletionToolType::Function,
        function: FunctionCall {
            name: name.into(),
            arguments: arguments.to_string(),
        },
    }
}

/// Inference client seam.
pub trait ModelService:
    Service<CreateChatCompletionRequest, Response = ProviderResponse, Error = BoxError>
{
}

impl<T> ModelService for T where
    T: Service<CreateChatCompletionRequest, Response = ProviderResponse, Error = BoxError>
{
}

/// Chat completions over async-openai.
#[derive(Clone)]
pub struct OpenAIProvider {
    client: Arc<Client<OpenAIConfig>>,
}

impl OpenAIProvider {
    pub fn new(client: Arc<Client<OpenAIConfig>>) -> Self {
        Self { client }
    }
}

impl Service<CreateChatCompletionRequest> for OpenAIProvider {
    type Response = ProviderResponse;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CreateChatCompletionRequest) -> Self::Future {
        let client = self.client.clone();
        Box::pin(async move {
            let resp = client.chat().create(req).await?;
            let choice = resp
                .choices
                .into_iter()
                .next()
                .ok_or("model returned no choices")?;
            let (prompt_tokens, completion_tokens) = resp
                .usage
                .map(|u| (u.prompt_tokens as usize, u.completion_tokens as usize))
                .unwrap_or((0, 0));
            Ok(ProviderResponse {
                content: choice.message.content,
                tool_calls: choice.message.tool_calls.unwrap_or_default(),
                prompt_tokens,
                completion_tokens,
            })
        })
    }
}

/// Replays scripted responses in order; the last one repeats once the script runs out.
#[derive(Clone)]
pub struct SequenceProvider {
    script: Arc<Mutex<VecDeque<ProviderResponse>>>,
    last: Arc<Mutex<Option<ProviderResponse>>>,
    requests: Arc<Mutex<Vec<CreateChatCompletionRequest>>>,
}

impl SequenceProvider {
    pub fn new(items: Vec<ProviderResponse>) -> Self {
        Self {
            script: Arc::new(Mutex::new(items.into())),
            last: Arc::new(Mutex::new(None)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Requests seen so far.
    pub fn requests(&self) -> Vec<CreateChatCompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl Service<CreateChatCompletionRequest> for SequenceProvider {
    type Response = ProviderResponse;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CreateChatCompletionRequest) -> Self::Future {
        let next = (|| -> Result<ProviderResponse, BoxError> {
            self.requests.lock().map_err(|_| "poisoned")?.push(req);
            let mut last = self.last.lock().map_err(|_| "poisoned")?;
            match self.script.lock().map_err(|_| "poisoned")?.pop_front() {
                Some(resp) => {
                    *last = Some(resp.clone());
                    Ok(resp)
                }
                None => last.clone().ok_or_else(|| "empty script".into()),
            }
        })();
        Box::pin(async move { next })
    }
}
