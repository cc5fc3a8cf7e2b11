use schemars::JsonSchema;
use serde::Deserialize;

use super::{check_range, typed_tool, ToolDef, ValidateArgs};
use crate::auth::SharedTokenProvider;
use crate::error::ToolError;
use crate::spotify::{Page, SharedPlaylistApi};
use crate::uri;

const DEFAULT_LIMIT: u32 = 20;

/// Playlist tracks retrieval parameters.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetPlaylistTracksArgs {
    /// The Spotify playlist ID to get tracks from.
    #[schemars(length(min = 1))]
    pub playlist_id: String,
    /// Max number of tracks to return (1-100).
    #[schemars(range(min = 1, max = 100))]
    pub limit: Option<u32>,
    /// Index of the first track to return.
    pub offset: Option<u32>,
}

impl ValidateArgs for GetPlaylistTracksArgs {
    fn validate(&self) -> Result<(), ToolError> {
        let id = uri::playlist_id(&self.playlist_id);
        if id.is_empty() {
            return Err(ToolError::validation("playlistId must not be empty"));
        }
        if !uri::is_valid_id(&id) {
            return Err(ToolError::validation(format!(
                "playlistId {id:?} is not a Spotify playlist id, URI or link"
            )));
        }
        check_range("limit", self.limit.unwrap_or(DEFAULT_LIMIT), 1, 100)
    }
}

pub fn get_playlist_tracks(token: SharedTokenProvider, api: SharedPlaylistApi) -> ToolDef {
    typed_tool(
        "getPlaylistTracks",
        "Get tracks from a specific Spotify playlist by playlist ID. Returns detailed track \
         information including artists, album, duration, and when and by whom each track was \
         added. Get playlist ids from listPlaylists first. The limit parameter controls how many \
         tracks to return (1-100, default 20). For large playlists, page with offset: increase \
         it by limit to get the next batch (first call limit=20 offset=0, second call limit=20 \
         offset=20).",
        token,
        move |args: GetPlaylistTracksArgs, token: String| {
            let api = api.clone();
            async move {
                let id = uri::playlist_id(&args.playlist_id);
                let page = Page {
                    limit: args.limit.unwrap_or(DEFAULT_LIMIT),
                    offset: args.offset.unwrap_or(0),
                };
                api.playlist_tracks(&token, &id, page).await
            }
        },
    )
}
