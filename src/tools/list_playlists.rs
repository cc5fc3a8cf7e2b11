use schemars::JsonSchema;
use serde::Deserialize;

use super::{check_range, typed_tool, ToolDef, ValidateArgs};
use crate::auth::SharedTokenProvider;
use crate::error::ToolError;
use crate::spotify::{Page, SharedPlaylistApi};

const DEFAULT_LIMIT: u32 = 20;

/// Optional pagination parameters.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListPlaylistsArgs {
    /// Max number of playlists to return (1-50).
    #[schemars(range(min = 1, max = 50))]
    pub limit: Option<u32>,
    /// Index of the first playlist to return.
    pub offset: Option<u32>,
}

impl ValidateArgs for ListPlaylistsArgs {
    fn validate(&self) -> Result<(), ToolError> {
        check_range("limit", self.limit.unwrap_or(DEFAULT_LIMIT), 1, 50)
    }
}

impl ListPlaylistsArgs {
    fn page(&self) -> Page {
        Page {
            limit: self.limit.unwrap_or(DEFAULT_LIMIT),
            offset: self.offset.unwrap_or(0),
        }
    }
}

pub fn list_playlists(token: SharedTokenProvider, api: SharedPlaylistApi) -> ToolDef {
    typed_tool(
        "listPlaylists",
        "List the current user's Spotify playlists (id and name). The limit parameter \
         controls how many playlists to return (1-50, default 20). To see more, call again \
         with offset increased by limit.",
        token,
        move |args: ListPlaylistsArgs, token: String| {
            let api = api.clone();
            async move { api.current_user_playlists(&token, args.page()).await }
        },
    )
}
