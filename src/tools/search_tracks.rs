use futures::future::try_join_all;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{check_range, typed_tool, ToolDef, ValidateArgs};
use crate::auth::SharedTokenProvider;
use crate::error::ToolError;
use crate::spotify::{Page, PlaylistApi, SharedPlaylistApi, Track};

const DEFAULT_LIMIT: u32 = 5;

/// Track search parameters.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct SearchTracksArgs {
    /// Single search query, e.g. "Blinding Lights" or "track:Yellow artist:Coldplay".
    #[schemars(length(min = 1))]
    pub query: Option<String>,
    /// Multiple search queries to run in parallel.
    #[schemars(length(min = 1))]
    pub queries: Option<Vec<String>>,
    /// Max number of tracks to return per query (1-50).
    #[schemars(range(min = 1, max = 50))]
    pub limit: Option<u32>,
    /// Index of the first track to return.
    pub offset: Option<u32>,
    /// Optional ISO 3166-1 alpha-2 country code (e.g., US).
    #[schemars(regex(pattern = r"^[A-Za-z]{2}$"))]
    pub market: Option<String>,
}

impl ValidateArgs for SearchTracksArgs {
    fn validate(&self) -> Result<(), ToolError> {
        match (&self.query, &self.queries) {
            (Some(_), Some(_)) => {
                return Err(ToolError::validation(
                    "provide either query or queries, not both",
                ))
            }
            (None, None) => {
                return Err(ToolError::validation(
                    "Provide either a single query or one or more queries.",
                ))
            }
            (Some(q), None) if q.trim().is_empty() => {
                return Err(ToolError::validation("query must not be empty"))
            }
            (None, Some(qs)) if qs.is_empty() => {
                return Err(ToolError::validation("queries must hold at least one query"))
            }
            (None, Some(qs)) if qs.iter().any(|q| q.trim().is_empty()) => {
                return Err(ToolError::validation("queries must not contain empty strings"))
            }
            _ => {}
        }
        check_range("limit", self.limit.unwrap_or(DEFAULT_LIMIT), 1, 50)?;
        if let Some(market) = &self.market {
            if market.len() != 2 || !market.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(ToolError::validation(format!(
                    "market must be a 2-letter country code, got {market:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Results of one query in a multi-query search.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResults {
    pub query: String,
    pub results: Vec<Track>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupedResults {
    results_by_query: Vec<QueryResults>,
}

pub fn search_tracks(token: SharedTokenProvider, api: SharedPlaylistApi) -> ToolDef {
    typed_tool(
        "searchTracks",
        "Search for Spotify tracks by one or multiple queries and return track ids plus key \
         metadata (artists, album, duration). Use this to find the track ids needed by \
         modifyPlaylist. Pass `queries` to run several searches at once; results come back \
         grouped per query in the same order. Fuzzy matching is supported.",
        token,
        move |args: SearchTracksArgs, token: String| {
            let api = api.clone();
            async move { run(api.as_ref(), &token, args).await }
        },
    )
}

async fn run(api: &dyn PlaylistApi, token: &str, args: SearchTracksArgs) -> Result<Value, ToolError> {
    let page = Page {
        limit: args.limit.unwrap_or(DEFAULT_LIMIT),
        offset: args.offset.unwrap_or(0),
    };
    let market = args.market.as_deref().map(str::to_ascii_uppercase);
    let market = market.as_deref();

    if let Some(queries) = args.queries {
        // try_join_all keeps input order regardless of completion order
        let groups = try_join_all(queries.iter().map(|q| api.search_tracks(token, q, page, market)))
            .await?;
        let results_by_query = queries
            .into_iter()
            .zip(groups)
            .map(|(query, results)| QueryResults { query, results })
            .collect();
        return to_value(GroupedResults { results_by_query });
    }

    let query = args.query.unwrap_or_default();
    to_value(api.search_tracks(token, &query, page, market).await?)
}

fn to_value<T: Serialize>(v: T) -> Result<Value, ToolError> {
    serde_json::to_value(v).map_err(|e| ToolError::Network(format!("unserializable output: {e}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tower::{Service, ServiceExt};

    use super::*;
    use crate::auth::StaticToken;
    use crate::spotify::{PlaylistSummary, PlaylistTracks, SnapshotId};
    use crate::tools::testing::{track, Call, FakeApi};
    use crate::tools::{ToolInvocation, ToolOutput};

    async fn call(api: Arc<dyn PlaylistApi>, args: Value) -> ToolOutput {
        let mut tool = search_tracks(Arc::new(StaticToken::new("t")), api);
        let inv = ToolInvocation {
            id: "s1".into(),
            name: "searchTracks".into(),
            arguments: args,
        };
        tool.service.ready().await.unwrap().call(inv).await.unwrap()
    }

    #[tokio::test]
    async fn single_query_returns_flat_list() {
        let api = Arc::new(FakeApi::default());
        let out = call(api.clone(), json!({"query": "Yellow", "market": "us"})).await;
        let v = out.result.unwrap();
        assert!(v.is_array());
        assert_eq!(v[0]["name"], "Yellow");
        assert_eq!(
            api.calls(),
            vec![Call::Search(
                "Yellow".into(),
                Page { limit: 5, offset: 0 },
                Some("US".into())
            )]
        );
    }

    #[tokio::test]
    async fn multi_query_groups_by_query() {
        let api = Arc::new(FakeApi::default());
        let out = call(
            api,
            json!({"queries": ["Yellow Coldplay", "Imagine Lennon"], "limit": 3}),
        )
        .await;
        let v = out.result.unwrap();
        let groups = v["resultsByQuery"].as_array().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0]["query"], "Yellow Coldplay");
        assert_eq!(groups[1]["query"], "Imagine Lennon");
        assert_eq!(groups[1]["results"][0]["name"], "Imagine Lennon");
    }

    /// Answers the first query last.
    struct SlowFirst;

    #[async_trait]
    impl PlaylistApi for SlowFirst {
        async fn current_user_playlists(&self, _: &str, _: Page) -> Result<Vec<PlaylistSummary>, ToolError> {
            unreachable!()
        }
        async fn playlist_tracks(&self, _: &str, _: &str, _: Page) -> Result<PlaylistTracks, ToolError> {
            unreachable!()
        }
        async fn search_tracks(
            &self,
            _: &str,
            query: &str,
            _: Page,
            _: Option<&str>,
        ) -> Result<Vec<Track>, ToolError> {
            if query == "A" {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Ok(vec![track(query, query)])
        }
        async fn remove_tracks(&self, _: &str, _: &str, _: &[String]) -> Result<SnapshotId, ToolError> {
            unreachable!()
        }
        async fn add_tracks(
            &self,
            _: &str,
            _: &str,
            _: &[String],
            _: Option<u32>,
        ) -> Result<SnapshotId, ToolError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn group_order_ignores_completion_order() {
        let out = call(Arc::new(SlowFirst), json!({"queries": ["A", "B"]})).await;
        let v = out.result.unwrap();
        assert_eq!(v["resultsByQuery"][0]["query"], "A");
        assert_eq!(v["resultsByQuery"][0]["results"][0]["id"], "A");
        assert_eq!(v["resultsByQuery"][1]["query"], "B");
    }

    #[tokio::test]
    async fn query_and_queries_are_exclusive() {
        let api = Arc::new(FakeApi::default());
        for bad in [
            json!({}),
            json!({"query": "a", "queries": ["b"]}),
            json!({"queries": []}),
            json!({"query": "  "}),
            json!({"query": "a", "market": "USA"}),
            json!({"query": "a", "limit": 51}),
        ] {
            let out = call(api.clone(), bad.clone()).await;
            assert!(matches!(out.result, Err(ToolError::Validation(_))), "{bad}");
        }
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_fails_the_call() {
        let api = Arc::new(FakeApi::failing(ToolError::upstream(401, None)));
        let out = call(api, json!({"queries": ["a", "b"]})).await;
        assert!(matches!(out.result, Err(ToolError::Upstream { status: 401, .. })));
    }
}
