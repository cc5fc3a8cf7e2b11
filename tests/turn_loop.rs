//! End-to-end turns against a scripted model and a recording platform fake.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_openai::types::CreateChatCompletionRequest;
use async_trait::async_trait;
use futures::StreamExt;
use playlist_agent::spotify::{
    AlbumRef, ArtistRef, Page, PlaylistSummary, PlaylistTracks, SnapshotId, Track,
};
use playlist_agent::{
    collect_text, AgentConfig, AgentError, AgentStopReason, ConversationMessage, Orchestrator,
    PlaylistApi, ProviderResponse, Role, SequenceProvider, StaticToken, StepStats, ToolError,
    TurnEvent, TurnRequest,
};
use serde_json::json;
use tower::{BoxError, Service};

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
}

impl Recorder {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }
}

fn track(id: &str) -> Track {
    Track {
        id: Some(id.to_string()),
        uri: format!("spotify:track:{id}"),
        name: id.to_string(),
        artists: vec![ArtistRef {
            id: None,
            name: "Someone".into(),
        }],
        album: AlbumRef {
            id: None,
            name: "Something".into(),
            images: vec![],
            release_date: None,
        },
        duration_ms: 1000,
        explicit: false,
        popularity: 1,
        preview_url: None,
    }
}

#[async_trait]
impl PlaylistApi for Recorder {
    async fn current_user_playlists(
        &self,
        _token: &str,
        _page: Page,
    ) -> Result<Vec<PlaylistSummary>, ToolError> {
        self.log("list".into());
        Ok(vec![PlaylistSummary {
            id: "P1".into(),
            name: "Road trip".into(),
        }])
    }

    async fn playlist_tracks(
        &self,
        _token: &str,
        playlist_id: &str,
        _page: Page,
    ) -> Result<PlaylistTracks, ToolError> {
        self.log(format!("tracks {playlist_id}"));
        Ok(PlaylistTracks {
            playlist_id: playlist_id.into(),
            total: 0,
            tracks: vec![],
        })
    }

    async fn search_tracks(
        &self,
        _token: &str,
        query: &str,
        _page: Page,
        _market: Option<&str>,
    ) -> Result<Vec<Track>, ToolError> {
        self.log(format!("search {query}"));
        Ok(vec![track(&query.replace(' ', "-"))])
    }

    async fn remove_tracks(
        &self,
        _token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<SnapshotId, ToolError> {
        self.log(format!("remove {playlist_id} {}", uris.join(",")));
        Ok(Some("snap-1".into()))
    }

    async fn add_tracks(
        &self,
        _token: &str,
        playlist_id: &str,
        uris: &[String],
        _position: Option<u32>,
    ) -> Result<SnapshotId, ToolError> {
        self.log(format!("add {playlist_id} {}", uris.join(",")));
        Ok(Some("snap-2".into()))
    }
}

fn user(text: &str) -> TurnRequest {
    TurnRequest::new(vec![ConversationMessage::user(text)])
}

fn token() -> Arc<StaticToken> {
    Arc::new(StaticToken::new("tok"))
}

#[tokio::test]
async fn remove_and_add_in_one_turn() {
    let api = Arc::new(Recorder::default());
    let provider = SequenceProvider::new(vec![
        ProviderResponse::tool_calls([(
            "c1",
            "modifyPlaylist",
            json!({"playlistId": "P1", "addIds": ["T3"], "removeIds": ["T1"]}),
        )]),
        ProviderResponse::text("Swapped T1 for T3."),
    ]);
    let agent = Orchestrator::builder(provider.clone(), api.clone()).build();

    let out = agent.run_turn(user("swap them"), token()).await.unwrap();

    assert_eq!(out.text, "Swapped T1 for T3.");
    assert_eq!(out.stop, AgentStopReason::DoneNoToolCalls);
    assert_eq!(
        api.calls(),
        vec!["remove P1 spotify:track:T1", "add P1 spotify:track:T3"]
    );
    // system + user, then + assistant + tool on the second call
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].messages.len(), 2);
    assert_eq!(requests[1].messages.len(), 4);
    assert!(requests[0].tools.as_ref().map(Vec::len) == Some(4));
}

#[tokio::test]
async fn missing_token_surfaces_as_tool_error_without_remote_calls() {
    let api = Arc::new(Recorder::default());
    let provider = SequenceProvider::new(vec![
        ProviderResponse::tool_calls([
            ("c1", "listPlaylists", json!({})),
            ("c2", "modifyPlaylist", json!({"playlistId": "P1", "removeIds": ["T1"]})),
        ]),
        ProviderResponse::text("Please sign in to Spotify again."),
    ]);
    let agent = Orchestrator::builder(provider, api.clone()).build();

    let events: Vec<TurnEvent> = agent
        .stream_turn(user("clean up my playlist"), Arc::new(StaticToken::missing()))
        .collect()
        .await;

    let errors: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            TurnEvent::ToolResult {
                output, is_error, ..
            } => Some((output["error"]["kind"].clone(), *is_error)),
            _ => None,
        })
        .collect();
    assert_eq!(
        errors,
        vec![
            (json!("authentication_required"), true),
            (json!("authentication_required"), true)
        ]
    );
    assert!(api.calls().is_empty());
    assert!(matches!(events.last(), Some(TurnEvent::Finished(_))));
}

#[tokio::test]
async fn multi_query_search_keeps_input_order() {
    let api = Arc::new(Recorder::default());
    let provider = SequenceProvider::new(vec![
        ProviderResponse::tool_calls([(
            "c1",
            "searchTracks",
            json!({"queries": ["Yellow Coldplay", "Imagine Lennon"]}),
        )]),
        ProviderResponse::text("Found both."),
    ]);
    let agent = Orchestrator::builder(provider, api).build();

    let out = agent.run_turn(user("find two songs"), token()).await.unwrap();

    let tool_msg = &out.appended[1];
    assert_eq!(tool_msg.role, Role::Tool);
    let output = match &tool_msg.parts[0] {
        playlist_agent::MessagePart::ToolResult { output, .. } => output.clone(),
        other => panic!("unexpected part {other:?}"),
    };
    let groups = output["resultsByQuery"].as_array().unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0]["query"], "Yellow Coldplay");
    assert_eq!(groups[1]["query"], "Imagine Lennon");
}

#[tokio::test]
async fn endless_tool_calls_stop_at_the_budget() {
    let provider = SequenceProvider::new(vec![ProviderResponse::tool_calls([(
        "c1",
        "listPlaylists",
        json!({}),
    )])]);
    let config = AgentConfig {
        max_steps: 5,
        ..AgentConfig::default()
    };
    let agent = Orchestrator::builder(provider.clone(), Arc::new(Recorder::default()))
        .config(config)
        .build();

    let out = agent.run_turn(user("loop forever"), token()).await.unwrap();

    assert_eq!(out.steps, 5);
    assert_eq!(out.stop, AgentStopReason::MaxSteps);
    assert!(!out.text.trim().is_empty());
    assert_eq!(provider.requests().len(), 5);
}

#[tokio::test]
async fn stream_events_follow_the_loop() {
    let provider = SequenceProvider::new(vec![
        ProviderResponse::tool_calls([("c1", "listPlaylists", json!({}))])
            .with_text("Let me look."),
        ProviderResponse::text("You have Road trip."),
    ]);
    let agent = Orchestrator::builder(provider, Arc::new(Recorder::default())).build();

    let events: Vec<TurnEvent> = agent.stream_turn(user("playlists?"), token()).collect().await;

    let shape: Vec<&str> = events
        .iter()
        .map(|e| match e {
            TurnEvent::StepStarted(_) => "step",
            TurnEvent::TextDelta(_) => "text",
            TurnEvent::ToolCall { .. } => "call",
            TurnEvent::ToolResult { .. } => "result",
            TurnEvent::Finished(_) => "finished",
            TurnEvent::Failed(_) => "failed",
        })
        .collect();
    assert_eq!(
        shape,
        vec!["step", "text", "call", "result", "step", "text", "finished"]
    );
    match events.last() {
        Some(TurnEvent::Finished(outcome)) => {
            assert_eq!(outcome.text, "Let me look.\n\nYou have Road trip.");
            assert_eq!(outcome.steps, 2);
        }
        other => panic!("expected Finished, got {other:?}"),
    }
}

#[tokio::test]
async fn collected_text_matches_outcome_text() {
    let provider = SequenceProvider::new(vec![
        ProviderResponse::tool_calls([("c1", "listPlaylists", json!({}))]).with_text("One"),
        ProviderResponse::text("Two"),
    ]);
    let agent = Orchestrator::builder(provider, Arc::new(Recorder::default())).build();
    let text = collect_text(agent.stream_turn(user("hi"), token())).await;
    assert_eq!(text, "One\n\nTwo");
}

#[tokio::test]
async fn model_failure_fails_the_turn() {
    let agent =
        Orchestrator::builder(SequenceProvider::new(vec![]), Arc::new(Recorder::default()))
            .build();

    let err = agent.run_turn(user("hi"), token()).await.unwrap_err();
    assert!(matches!(err, AgentError::Model(_)));

    let events: Vec<TurnEvent> = agent.stream_turn(user("hi"), token()).collect().await;
    assert!(matches!(events.last(), Some(TurnEvent::Failed(_))));
    assert!(!events.iter().any(|e| matches!(e, TurnEvent::Finished(_))));
}

#[tokio::test]
async fn observer_sees_every_step() {
    let seen: Arc<Mutex<Vec<StepStats>>> = Arc::default();
    let sink = seen.clone();
    let provider = SequenceProvider::new(vec![
        ProviderResponse::tool_calls([
            ("c1", "searchTracks", json!({"query": "Yellow"})),
            ("c2", "listPlaylists", json!({})),
        ]),
        ProviderResponse::text("Done."),
    ]);
    let agent = Orchestrator::builder(provider, Arc::new(Recorder::default()))
        .observer(Arc::new(move |stats: &StepStats| {
            sink.lock().unwrap().push(stats.clone())
        }))
        .build();

    agent
        .run_turn(user("hi").session("session-7"), token())
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].step, 1);
    assert_eq!(seen[0].invoked_tools, vec!["searchTracks", "listPlaylists"]);
    assert_eq!(seen[1].text_len, "Done.".len());
    assert_eq!(seen[1].session_id.as_deref(), Some("session-7"));
}

/// Answers the first call at once, then hangs.
#[derive(Clone, Default)]
struct StallsAfterFirst {
    calls: Arc<AtomicUsize>,
}

impl Service<CreateChatCompletionRequest> for StallsAfterFirst {
    type Response = ProviderResponse;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<ProviderResponse, BoxError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), BoxError>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: CreateChatCompletionRequest) -> Self::Future {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if n > 0 {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(ProviderResponse::tool_calls([("c1", "listPlaylists", json!({}))])
                .with_text("Checking your playlists."))
        })
    }
}

#[tokio::test(start_paused = true)]
async fn deadline_keeps_text_produced_so_far() {
    let config = AgentConfig {
        turn_timeout: Some(Duration::from_secs(30)),
        ..AgentConfig::default()
    };
    let agent = Orchestrator::builder(StallsAfterFirst::default(), Arc::new(Recorder::default()))
        .config(config)
        .build();

    let out = agent.run_turn(user("slow"), token()).await.unwrap();

    assert_eq!(out.stop, AgentStopReason::DeadlineExceeded);
    assert_eq!(out.steps, 1);
    assert_eq!(out.text, "Checking your playlists.");
    assert_eq!(out.appended.len(), 2);
}

#[tokio::test]
async fn appended_history_replays_on_the_next_turn() {
    let api = Arc::new(Recorder::default());
    let first = Orchestrator::builder(
        SequenceProvider::new(vec![
            ProviderResponse::tool_calls([("c1", "listPlaylists", json!({}))]),
            ProviderResponse::text("You have Road trip."),
        ]),
        api.clone(),
    )
    .build();
    let mut history = vec![ConversationMessage::user("playlists?")];
    let out = first
        .run_turn(TurnRequest::new(history.clone()), token())
        .await
        .unwrap();
    history.extend(out.appended);
    history.push(ConversationMessage::user("thanks"));

    let provider = SequenceProvider::new(vec![ProviderResponse::text("Anytime.")]);
    let second = Orchestrator::builder(provider.clone(), api).build();
    let out = second
        .run_turn(TurnRequest::new(history), token())
        .await
        .unwrap();
    assert_eq!(out.text, "Anytime.");
    // system, user, assistant(tool call), tool, assistant, user
    assert_eq!(provider.requests()[0].messages.len(), 6);
}
