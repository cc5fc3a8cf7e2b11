//! Playlist tools as Tower services.
//!
//! Every tool is a [`ToolDef`]: a function spec for the model plus a boxed
//! `Service<ToolInvocation, Response = ToolOutput>`. Tool failures travel in
//! [`ToolOutput::result`], never as the service error, so the step loop can
//! write them back into the conversation. The service error is reserved for
//! infrastructure faults.
//!
//! Tools are built per turn by [`playlist_tools`], bound to that turn's token
//! accessor.

mod get_playlist_tracks;
mod list_playlists;
mod modify_playlist;
mod search_tracks;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_openai::types::{
    ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType, FunctionObjectArgs,
};
use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tower::{util::BoxCloneService, BoxError, Service};
use tracing::{debug, warn};

use crate::auth::{self, SharedTokenProvider};
use crate::error::ToolError;
use crate::spotify::SharedPlaylistApi;

pub use get_playlist_tracks::{get_playlist_tracks, GetPlaylistTracksArgs};
pub use list_playlists::{list_playlists, ListPlaylistsArgs};
pub use modify_playlist::{modify_playlist, ModifyPlaylistArgs, ModifyPlaylistResult};
pub use search_tracks::{search_tracks, QueryResults, SearchTracksArgs};

/// Uniform tool invocation passed to routed tool services.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub id: String,   // tool_call_id
    pub name: String, // function.name
    pub arguments: Value,
}

impl ToolInvocation {
    /// Build from the raw argument string the model produced.
    ///
    /// Empty arguments mean `{}`; unparseable ones are kept as a JSON string so
    /// the tool rejects them as invalid input.
    pub fn from_raw(id: impl Into<String>, name: impl Into<String>, raw_args: &str) -> Self {
        let arguments = if raw_args.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(raw_args).unwrap_or_else(|_| Value::String(raw_args.to_string()))
        };
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Uniform tool output produced by tool services.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub id: String, // same as invocation.id
    pub name: String,
    pub result: Result<Value, ToolError>,
}

impl ToolOutput {
    pub fn is_error(&self) -> bool {
        self.result.is_err()
    }

    /// JSON written into the conversation for this call.
    pub fn to_value(&self) -> Value {
        match &self.result {
            Ok(v) => v.clone(),
            Err(e) => e.to_value(),
        }
    }
}

/// Boxed tool service type alias.
pub type ToolSvc = BoxCloneService<ToolInvocation, ToolOutput, BoxError>;

/// Input checks beyond what deserialization enforces.
pub trait ValidateArgs {
    fn validate(&self) -> Result<(), ToolError>;
}

/// Definition of a tool: function spec (for OpenAI) + service implementation.
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters_schema: Value,
    pub service: ToolSvc,
}

impl ToolDef {
    /// Convert this tool's function signature into an OpenAI ChatCompletionTool spec.
    pub fn to_openai_tool(&self) -> Result<ChatCompletionTool, BoxError> {
        let func = FunctionObjectArgs::default()
            .name(self.name)
            .description(self.description)
            .parameters(self.parameters_schema.clone())
            .build()?;
        Ok(ChatCompletionToolArgs::default()
            .r#type(ChatCompletionToolType::Function)
            .function(func)
            .build()?)
    }
}

type Handler<A, R> = Arc<dyn Fn(A, String) -> BoxFuture<'static, Result<R, ToolError>> + Send + Sync>;

/// Create a tool from a typed handler bound to a token accessor.
///
/// Runs, in order: argument decoding, [`ValidateArgs::validate`], token
/// resolution, then `handler(args, token)`. The first failure becomes the
/// tool result and nothing after it runs.
pub fn typed_tool<A, H, Fut, R>(
    name: &'static str,
    description: &'static str,
    token: SharedTokenProvider,
    handler: H,
) -> ToolDef
where
    A: DeserializeOwned + JsonSchema + ValidateArgs + Send + 'static,
    R: serde::Serialize + Send + 'static,
    H: Fn(A, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ToolError>> + Send + 'static,
{
    let schema = schemars::schema_for!(A);
    let parameters_schema = serde_json::to_value(schema.schema).unwrap_or_else(|_| json!({}));
    let handler: Handler<A, R> = Arc::new(
        move |args: A, token: String| -> BoxFuture<'static, Result<R, ToolError>> {
            Box::pin(handler(args, token))
        },
    );

    let svc = tower::service_fn(move |inv: ToolInvocation| {
        let handler = handler.clone();
        let token = token.clone();
        async move {
            let ToolInvocation {
                id,
                name: called,
                arguments,
            } = inv;
            if called != name {
                return Err::<ToolOutput, BoxError>(
                    format!("routed to wrong tool: expected={}, got={}", name, called).into(),
                );
            }
            let result = run_typed(arguments, token, handler).await;
            match &result {
                Ok(_) => debug!(tool = name, call_id = %id, "tool succeeded"),
                Err(e) => warn!(tool = name, call_id = %id, kind = e.kind(), error = %e, "tool failed"),
            }
            Ok(ToolOutput {
                id,
                name: called,
                result,
            })
        }
    });

    ToolDef {
        name,
        description,
        parameters_schema,
        service: BoxCloneService::new(svc),
    }
}

async fn run_typed<A, R>(
    arguments: Value,
    token: SharedTokenProvider,
    handler: Handler<A, R>,
) -> Result<Value, ToolError>
where
    A: DeserializeOwned + ValidateArgs,
    R: serde::Serialize,
{
    let args: A =
        serde_json::from_value(arguments).map_err(|e| ToolError::validation(e.to_string()))?;
    args.validate()?;
    let token = auth::resolve(token.as_ref())
        .await
        .ok_or(ToolError::AuthenticationRequired)?;
    let out = handler(args, token).await?;
    serde_json::to_value(out).map_err(|e| ToolError::Network(format!("unserializable output: {e}")))
}

/// The four playlist tools bound to one turn's token accessor.
pub fn playlist_tools(token: SharedTokenProvider, api: SharedPlaylistApi) -> Vec<ToolDef> {
    vec![
        list_playlists(token.clone(), api.clone()),
        search_tracks(token.clone(), api.clone()),
        get_playlist_tracks(token.clone(), api.clone()),
        modify_playlist(token, api),
    ]
}

pub(crate) fn check_range(field: &str, value: u32, min: u32, max: u32) -> Result<(), ToolError> {
    if value < min || value > max {
        return Err(ToolError::validation(format!(
            "{field} must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}

/// Simple router service over tools using a name → index table.
#[derive(Clone)]
pub struct ToolRouter {
    name_to_index: std::collections::HashMap<&'static str, usize>,
    services: Vec<ToolSvc>, // index 0 is the unknown-tool fallback
}

impl ToolRouter {
    pub fn new(tools: Vec<ToolDef>) -> Result<(Self, Vec<ChatCompletionTool>), BoxError> {
        use std::collections::HashMap;

        let unknown = BoxCloneService::new(tower::service_fn(|inv: ToolInvocation| async move {
            let err = ToolError::validation(format!("unknown tool: {}", inv.name));
            Ok::<ToolOutput, BoxError>(ToolOutput {
                id: inv.id,
                name: inv.name,
                result: Err(err),
            })
        }));

        let mut services: Vec<ToolSvc> = vec![unknown];
        let mut specs: Vec<ChatCompletionTool> = Vec::with_capacity(tools.len());
        let mut name_to_index: HashMap<&'static str, usize> = HashMap::new();

        for (i, td) in tools.into_iter().enumerate() {
            name_to_index.insert(td.name, i + 1);
            specs.push(td.to_openai_tool()?);
            services.push(td.service);
        }

        Ok((
            Self {
                name_to_index,
                services,
            },
            specs,
        ))
    }
}

impl Service<ToolInvocation> for ToolRouter {
    type Response = ToolOutput;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        // Tool services are service_fn based and always ready.
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ToolInvocation) -> Self::Future {
        let idx = self
            .name_to_index
            .get(req.name.as_str())
            .copied()
            .unwrap_or(0);

        // Safe: index 0 is always present (unknown fallback)
        let svc: &mut ToolSvc = &mut self.services[idx];
        Box::pin(svc.call(req))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording fake of the platform shared by tool tests.

    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::ToolError;
    use crate::spotify::{
        AlbumRef, ArtistRef, Page, PlaylistApi, PlaylistSummary, PlaylistTracks, SnapshotId,
        Track,
    };

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        List(Page),
        Tracks(String, Page),
        Search(String, Page, Option<String>),
        Remove(String, Vec<String>),
        Add(String, Vec<String>, Option<u32>),
    }

    #[derive(Default)]
    pub struct FakeApi {
        pub calls: Mutex<Vec<Call>>,
        pub fail_with: Option<ToolError>,
        /// Fails additions only; every other call succeeds.
        pub fail_add: Option<ToolError>,
    }

    impl FakeApi {
        pub fn failing(err: ToolError) -> Self {
            Self {
                fail_with: Some(err),
                ..Self::default()
            }
        }

        pub fn failing_add(err: ToolError) -> Self {
            Self {
                fail_add: Some(err),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) -> Result<(), ToolError> {
            self.calls.lock().unwrap().push(call);
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
    }

    pub fn track(id: &str, name: &str) -> Track {
        Track {
            id: Some(id.to_string()),
            uri: format!("spotify:track:{id}"),
            name: name.to_string(),
            artists: vec![ArtistRef {
                id: Some("a1".into()),
                name: "Artist".into(),
            }],
            album: AlbumRef {
                id: Some("al1".into()),
                name: "Album".into(),
                images: vec![],
                release_date: Some("2000-01-01".into()),
            },
            duration_ms: 180_000,
            explicit: false,
            popularity: 50,
            preview_url: None,
        }
    }

    #[async_trait]
    impl PlaylistApi for FakeApi {
        async fn current_user_playlists(
            &self,
            _token: &str,
            page: Page,
        ) -> Result<Vec<PlaylistSummary>, ToolError> {
            self.record(Call::List(page))?;
            Ok(vec![PlaylistSummary {
                id: "P1".into(),
                name: "Road trip".into(),
            }])
        }

        async fn playlist_tracks(
            &self,
            _token: &str,
            playlist_id: &str,
            page: Page,
        ) -> Result<PlaylistTracks, ToolError> {
            self.record(Call::Tracks(playlist_id.to_string(), page))?;
            Ok(PlaylistTracks {
                playlist_id: playlist_id.to_string(),
                total: 0,
                tracks: vec![],
            })
        }

        async fn search_tracks(
            &self,
            _token: &str,
            query: &str,
            page: Page,
            market: Option<&str>,
        ) -> Result<Vec<Track>, ToolError> {
            self.record(Call::Search(
                query.to_string(),
                page,
                market.map(str::to_string),
            ))?;
            Ok(vec![track(&format!("id-{query}"), query)])
        }

        async fn remove_tracks(
            &self,
            _token: &str,
            playlist_id: &str,
            uris: &[String],
        ) -> Result<SnapshotId, ToolError> {
            self.record(Call::Remove(playlist_id.to_string(), uris.to_vec()))?;
            Ok(Some("snap-remove".into()))
        }

        async fn add_tracks(
            &self,
            _token: &str,
            playlist_id: &str,
            uris: &[String],
            position: Option<u32>,
        ) -> Result<SnapshotId, ToolError> {
            self.record(Call::Add(playlist_id.to_string(), uris.to_vec(), position))?;
            if let Some(e) = &self.fail_add {
                return Err(e.clone());
            }
            Ok(Some("snap-add".into()))
        }
    }
}
