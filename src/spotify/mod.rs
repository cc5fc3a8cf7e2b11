//! Remote platform seam.
//!
//! Tools talk to Spotify only through [`PlaylistApi`]. [`SpotifyClient`] is the
//! reqwest implementation; tests substitute recording fakes.

mod client;
pub mod models;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ToolError;
pub use client::SpotifyClient;
pub use models::{
    AlbumRef, ArtistRef, Image, Page, PlaylistSummary, PlaylistTrack, PlaylistTracks, Track,
};

/// Snapshot id returned by a mutation; informational only.
pub type SnapshotId = Option<String>;

/// Calls the tools make against the platform. Every call carries the bearer token.
#[async_trait]
pub trait PlaylistApi: Send + Sync {
    async fn current_user_playlists(
        &self,
        token: &str,
        page: Page,
    ) -> Result<Vec<PlaylistSummary>, ToolError>;

    async fn playlist_tracks(
        &self,
        token: &str,
        playlist_id: &str,
        page: Page,
    ) -> Result<PlaylistTracks, ToolError>;

    async fn search_tracks(
        &self,
        token: &str,
        query: &str,
        page: Page,
        market: Option<&str>,
    ) -> Result<Vec<Track>, ToolError>;

    /// Remove every occurrence of `uris`.
    async fn remove_tracks(
        &self,
        token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<SnapshotId, ToolError>;

    /// Append `uris`, or insert them at `position`.
    async fn add_tracks(
        &self,
        token: &str,
        playlist_id: &str,
        uris: &[String],
        position: Option<u32>,
    ) -> Result<SnapshotId, ToolError>;
}

pub type SharedPlaylistApi = Arc<dyn PlaylistApi>;
