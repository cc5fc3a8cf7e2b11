//! reqwest-backed [`PlaylistApi`] against the Spotify Web API.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use super::models::{
    ErrorEnvelope, Page, Paging, PlaylistItem, PlaylistSummary, PlaylistTracks, SearchResponse,
    SnapshotResponse, Track,
};
use super::{PlaylistApi, SnapshotId};
use crate::config::SpotifyConfig;
use crate::error::ToolError;

#[derive(Debug, Clone)]
pub struct SpotifyClient {
    http: Client,
    base_url: String,
}

impl SpotifyClient {
    pub fn new(config: &SpotifyConfig) -> Self {
        let http = ClientBuilder::new()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL plus path segments. Each segment is percent-encoded, so an id
    /// can never add path levels, a query or a fragment.
    fn url(&self, segments: &[&str]) -> Result<Url, ToolError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ToolError::Network(format!("invalid API base {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| ToolError::Network(format!("API base {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        op: &'static str,
        req: RequestBuilder,
    ) -> Result<T, ToolError> {
        let resp = req.send().await.map_err(|e| {
            warn!(op, error = %e, "spotify request failed");
            ToolError::Network(e.to_string())
        })?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ToolError::Network(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|env| env.error.message);
            warn!(op, status = status.as_u16(), detail = ?detail, "spotify returned an error");
            return Err(ToolError::upstream(status.as_u16(), detail.as_deref()));
        }

        debug!(op, status = status.as_u16(), bytes = body.len(), "spotify response");
        serde_json::from_str(&body)
            .map_err(|e| ToolError::Network(format!("invalid response body for {op}: {e}")))
    }
}

fn page_query(page: Page) -> [(&'static str, String); 2] {
    [
        ("limit", page.limit.to_string()),
        ("offset", page.offset.to_string()),
    ]
}

#[async_trait]
impl PlaylistApi for SpotifyClient {
    async fn current_user_playlists(
        &self,
        token: &str,
        page: Page,
    ) -> Result<Vec<PlaylistSummary>, ToolError> {
        let req = self
            .http
            .get(self.url(&["me", "playlists"])?)
            .bearer_auth(token)
            .query(&page_query(page));
        let paging: Paging<PlaylistSummary> = self.send("list_playlists", req).await?;
        Ok(paging.items.into_iter().flatten().collect())
    }

    async fn playlist_tracks(
        &self,
        token: &str,
        playlist_id: &str,
        page: Page,
    ) -> Result<PlaylistTracks, ToolError> {
        let req = self
            .http
            .get(self.url(&["playlists", playlist_id, "tracks"])?)
            .bearer_auth(token)
            .query(&page_query(page));
        let paging: Paging<PlaylistItem> = self.send("playlist_tracks", req).await?;
        Ok(PlaylistTracks {
            playlist_id: playlist_id.to_string(),
            total: paging.total,
            tracks: paging
                .items
                .into_iter()
                .flatten()
                .filter_map(PlaylistItem::into_playlist_track)
                .collect(),
        })
    }

    async fn search_tracks(
        &self,
        token: &str,
        query: &str,
        page: Page,
        market: Option<&str>,
    ) -> Result<Vec<Track>, ToolError> {
        let mut req = self
            .http
            .get(self.url(&["search"])?)
            .bearer_auth(token)
            .query(&[("q", query), ("type", "track")])
            .query(&page_query(page));
        if let Some(market) = market {
            req = req.query(&[("market", market)]);
        }
        let resp: SearchResponse = self.send("search_tracks", req).await?;
        Ok(resp
            .tracks
            .map(|p| p.items.into_iter().flatten().collect())
            .unwrap_or_default())
    }

    async fn remove_tracks(
        &self,
        token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<SnapshotId, ToolError> {
        let tracks: Vec<_> = uris.iter().map(|uri| json!({ "uri": uri })).collect();
        let req = self
            .http
            .delete(self.url(&["playlists", playlist_id, "tracks"])?)
            .bearer_auth(token)
            .json(&json!({ "tracks": tracks }));
        let resp: SnapshotResponse = self.send("remove_tracks", req).await?;
        Ok(resp.snapshot_id)
    }

    async fn add_tracks(
        &self,
        token: &str,
        playlist_id: &str,
        uris: &[String],
        position: Option<u32>,
    ) -> Result<SnapshotId, ToolError> {
        let mut body = json!({ "uris": uris });
        if let Some(position) = position {
            body["position"] = json!(position);
        }
        let req = self
            .http
            .post(self.url(&["playlists", playlist_id, "tracks"])?)
            .bearer_auth(token)
            .json(&body);
        let resp: SnapshotResponse = self.send("add_tracks", req).await?;
        Ok(resp.snapshot_id)
    }
}
