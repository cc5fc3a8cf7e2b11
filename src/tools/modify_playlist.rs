//! The only mutating tool.
//!
//! One call may both remove and add. Removal is submitted and awaited before
//! the addition is sent, so a track named in both lists ends up present. If
//! the addition then fails, the error still reports what the removal did.

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{typed_tool, ToolDef, ValidateArgs};
use crate::auth::SharedTokenProvider;
use crate::error::ToolError;
use crate::spotify::{PlaylistApi, SharedPlaylistApi};
use crate::uri;

/// Platform limit for a single add/remove request.
pub const MAX_BATCH: usize = 100;

/// Playlist modification parameters.
#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModifyPlaylistArgs {
    /// The Spotify playlist ID to modify.
    #[schemars(length(min = 1))]
    pub playlist_id: String,
    /// Track IDs, URIs or links to add. Batch as many tracks as possible into one call.
    #[serde(default)]
    #[schemars(length(max = 100))]
    pub add_ids: Vec<String>,
    /// Track IDs, URIs or links to remove. Batch as many tracks as possible into one call.
    #[serde(default)]
    #[schemars(length(max = 100))]
    pub remove_ids: Vec<String>,
    /// Zero-based index where added tracks are inserted; appended when omitted.
    pub position: Option<u32>,
}

impl ValidateArgs for ModifyPlaylistArgs {
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
        if self.add_ids.is_empty() && self.remove_ids.is_empty() {
            return Err(ToolError::validation(
                "Provide at least one track ID to add or remove.",
            ));
        }
        for (field, ids) in [("addIds", &self.add_ids), ("removeIds", &self.remove_ids)] {
            if ids.len() > MAX_BATCH {
                return Err(ToolError::validation(format!(
                    "{field} holds {} ids; at most {MAX_BATCH} per call",
                    ids.len()
                )));
            }
            if ids.iter().any(|id| id.trim().is_empty()) {
                return Err(ToolError::validation(format!(
                    "{field} must not contain empty ids"
                )));
            }
        }
        if self.position.is_some() && self.add_ids.is_empty() {
            return Err(ToolError::validation("position only applies when adding tracks"));
        }
        Ok(())
    }
}

/// Counts reflect what was submitted, not a re-read of the playlist.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyPlaylistResult {
    pub playlist_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
}

pub fn modify_playlist(token: SharedTokenProvider, api: SharedPlaylistApi) -> ToolDef {
    typed_tool(
        "modifyPlaylist",
        "Add and/or remove tracks from a Spotify playlist. Accepts track IDs, spotify:track \
         URIs or open.spotify.com links. This tool supports BATCH operations: put every track \
         to add or remove into a single call (up to 100 each) instead of calling it once per \
         track. Removals are applied before additions.",
        token,
        move |args: ModifyPlaylistArgs, token: String| {
            let api = api.clone();
            async move { run(api.as_ref(), &token, args).await }
        },
    )
}

/// Normalize and de-duplicate, keeping first occurrences in order.
fn canonical_uris(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| uri::normalize_track_uri(id))
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

async fn run(
    api: &dyn PlaylistApi,
    token: &str,
    args: ModifyPlaylistArgs,
) -> Result<ModifyPlaylistResult, ToolError> {
    let playlist_id = uri::playlist_id(&args.playlist_id);
    let remove = canonical_uris(&args.remove_ids);
    let add = canonical_uris(&args.add_ids);

    let mut result = ModifyPlaylistResult {
        playlist_id: playlist_id.clone(),
        removed: None,
        added: None,
        snapshot_id: None,
    };

    if !remove.is_empty() {
        let snapshot = api.remove_tracks(token, &playlist_id, &remove).await?;
        info!(playlist = %playlist_id, count = remove.len(), "removed tracks");
        result.removed = Some(remove.len());
        if snapshot.is_some() {
            result.snapshot_id = snapshot;
        }
    }

    if !add.is_empty() {
        let snapshot = match api.add_tracks(token, &playlist_id, &add, args.position).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                let Some(removed) = result.removed else {
                    return Err(err);
                };
                warn!(playlist = %playlist_id, removed, error = %err, "addition failed after removal");
                return Err(ToolError::PartiallyApplied {
                    removed,
                    snapshot_id: result.snapshot_id,
                    source: Box::new(err),
                });
            }
        };
        info!(playlist = %playlist_id, count = add.len(), position = ?args.position, "added tracks");
        result.added = Some(add.len());
        if snapshot.is_some() {
            result.snapshot_id = snapshot;
        }
    }

    Ok(result)
}
