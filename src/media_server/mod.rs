// Uniform interface over the two media-server backends. The orchestrator
// and resolver only ever see `MediaServerClient`; backend-specific wire
// handling stays in the adapter modules.

pub mod jellyfin;
pub mod navidrome;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::models::ServerSource;

pub use jellyfin::JellyfinClient;
pub use navidrome::NavidromeClient;

#[derive(Error, Debug)]
pub enum MediaServerError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server error: {0}")]
    Api(String),
    #[error("not connected to media server")]
    NotConnected,
    #[error("unexpected response format: {0}")]
    Parse(#[from] serde_json::Error),
}

/// An artist as exposed by a media server.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaArtist {
    pub id: String,
    pub name: String,
    pub thumb_url: Option<String>,
    pub genres: Vec<String>,
    /// Tracking markers (`last_update:<ts>`, `ignore_update`), never a
    /// biography.
    pub summary: Option<String>,
}

/// An album as exposed by a media server.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAlbum {
    pub id: String,
    pub artist_id: Option<String>,
    pub title: String,
    pub year: Option<i32>,
    pub thumb_url: Option<String>,
    pub genres: Vec<String>,
    pub track_count: Option<i64>,
    pub duration_ms: Option<i64>,
}

/// A track as exposed by a media server.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaTrack {
    pub id: String,
    pub album_id: Option<String>,
    pub artist_id: Option<String>,
    pub title: String,
    pub track_number: Option<i32>,
    pub duration_ms: Option<i64>,
    pub file_path: Option<String>,
    pub bitrate: Option<i32>,
}

/// A playlist container on a media server.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylist {
    pub id: String,
    pub title: String,
    pub track_count: i64,
}

/// A music library (view/section) available on a server.
#[derive(Debug, Clone, PartialEq)]
pub struct MusicLibrary {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LibraryStats {
    pub artists: i64,
    pub albums: i64,
    pub tracks: i64,
}

/// The uniform backend interface.
///
/// Implementations absorb transient transport errors where the contract
/// returns collections (empty on failure) and booleans for write
/// operations; `Result` is reserved for calls whose failure the caller
/// distinguishes.
#[async_trait]
pub trait MediaServerClient: Send + Sync {
    fn source(&self) -> ServerSource;

    /// Idempotent lazy connect with a single-flight guard: concurrent
    /// callers neither duplicate connection attempts nor race.
    async fn ensure_connection(&self) -> bool;

    async fn is_connected(&self) -> bool;

    async fn available_music_libraries(&self) -> Vec<MusicLibrary>;

    /// Select the active music library by name. Persisted as a preference
    /// by callers that want it sticky.
    async fn select_library_by_name(&self, library_name: &str) -> bool;

    async fn all_artists(&self) -> Result<Vec<MediaArtist>, MediaServerError>;

    async fn albums_for_artist(&self, artist_id: &str) -> Vec<MediaAlbum>;

    async fn tracks_for_album(&self, album_id: &str) -> Vec<MediaTrack>;

    async fn artist_by_id(&self, artist_id: &str) -> Option<MediaArtist>;

    async fn album_by_id(&self, album_id: &str) -> Option<MediaAlbum>;

    async fn track_by_id(&self, track_id: &str) -> Option<MediaTrack>;

    async fn recently_added_albums(&self, max_results: usize) -> Vec<MediaAlbum>;

    async fn recently_updated_albums(&self, max_results: usize) -> Vec<MediaAlbum>;

    async fn recently_added_tracks(&self, max_results: usize) -> Vec<MediaTrack>;

    async fn recently_updated_tracks(&self, max_results: usize) -> Vec<MediaTrack>;

    async fn library_stats(&self) -> LibraryStats;

    async fn playlists(&self) -> Vec<MediaPlaylist>;

    async fn playlist_by_name(&self, name: &str) -> Option<MediaPlaylist>;

    async fn playlist_tracks(&self, playlist_id: &str) -> Vec<MediaTrack>;

    /// Create a playlist with the given item ids. Invalid ids are filtered
    /// and logged; reports success when the container was created.
    async fn create_playlist(&self, name: &str, track_ids: &[String]) -> bool;

    /// Replace a playlist's contents (delete-then-recreate, with an
    /// optional transient backup).
    async fn update_playlist(&self, name: &str, track_ids: &[String]) -> bool;

    async fn copy_playlist(&self, source_name: &str, target_name: &str) -> bool;

    async fn trigger_library_scan(&self) -> bool;

    async fn is_library_scanning(&self) -> bool;

    async fn update_artist_poster(&self, artist_id: &str, image_data: &[u8]) -> bool;

    async fn update_album_poster(&self, album_id: &str, image_data: &[u8]) -> bool;

    /// Direct metadata search on the server, when the backend supports it.
    /// Tier 1 of the track resolver.
    async fn search_track_by_metadata(&self, _title: &str, _artist: &str) -> Option<MediaTrack> {
        None
    }

    /// Resolve a bare filename to a server track, when the backend can.
    /// Used by the filesystem tier to trade placeholders for real ids.
    async fn track_by_filename(&self, _filename: &str) -> Option<MediaTrack> {
        None
    }

    /// Whether `id` is a well-formed item id for this backend. Backend
    /// specific: GUID servers enforce hex shape, integer servers accept any
    /// non-empty token.
    fn is_valid_item_id(&self, id: &str) -> bool;

    /// Skip bulk cache population for metadata-only operations.
    fn set_metadata_only_mode(&self, enabled: bool);

    /// Whether an artist's tracking markers say it is due for a refresh.
    fn needs_update_by_age(&self, artist: &MediaArtist, refresh_interval_days: i64) -> bool {
        if self.is_ignored(artist) {
            return false;
        }
        match parse_update_timestamp(artist) {
            Some(last) => Utc::now() - last > Duration::days(refresh_interval_days),
            None => true,
        }
    }

    /// Whether an artist is flagged to never receive metadata updates.
    fn is_ignored(&self, artist: &MediaArtist) -> bool {
        artist
            .summary
            .as_deref()
            .map(|s| s.contains(IGNORE_MARKER))
            .unwrap_or(false)
    }
}

pub const IGNORE_MARKER: &str = "ignore_update";
pub const LAST_UPDATE_PREFIX: &str = "last_update:";

/// Read the `last_update:<rfc3339>` marker from an artist summary.
pub fn parse_update_timestamp(artist: &MediaArtist) -> Option<DateTime<Utc>> {
    let summary = artist.summary.as_deref()?;
    let start = summary.find(LAST_UPDATE_PREFIX)? + LAST_UPDATE_PREFIX.len();
    let rest = &summary[start..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == ';')
        .unwrap_or(rest.len());
    DateTime::parse_from_rfc3339(&rest[..end])
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Render the tracking-marker summary for an artist.
pub fn format_update_marker(timestamp: DateTime<Utc>, ignored: bool) -> String {
    if ignored {
        format!("{}{} {}", LAST_UPDATE_PREFIX, timestamp.to_rfc3339(), IGNORE_MARKER)
    } else {
        format!("{}{}", LAST_UPDATE_PREFIX, timestamp.to_rfc3339())
    }
}

/// A 32-hex-character GUID, hyphens permitted. The validity rule for
/// GUID-keyed backends.
pub fn is_valid_guid(id: &str) -> bool {
    let id = id.trim();
    if id.len() != 32 && id.len() != 36 {
        return false;
    }
    let no_hyphens: String = id.chars().filter(|c| *c != '-').collect();
    no_hyphens.len() == 32 && no_hyphens.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guid_validation_accepts_both_shapes() {
        assert!(is_valid_guid("a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6"));
        assert!(is_valid_guid("a1b2c3d4-e5f6-a7b8-c9d0-e1f2a3b4c5d6"));
    }

    #[test]
    fn guid_validation_rejects_malformed_ids() {
        assert!(!is_valid_guid(""));
        assert!(!is_valid_guid("12345"));
        assert!(!is_valid_guid("g1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6"));
        assert!(!is_valid_guid("fs_deadbeef"));
    }

    #[test]
    fn update_marker_roundtrip() {
        let artist = MediaArtist {
            id: "a1".to_string(),
            name: "Artist".to_string(),
            thumb_url: None,
            genres: Vec::new(),
            summary: Some(format_update_marker(Utc::now(), false)),
        };
        assert!(parse_update_timestamp(&artist).is_some());
    }

    #[test]
    fn ignore_marker_detected() {
        let artist = MediaArtist {
            id: "a1".to_string(),
            name: "Artist".to_string(),
            thumb_url: None,
            genres: Vec::new(),
            summary: Some(format_update_marker(Utc::now(), true)),
        };
        assert!(artist.summary.as_deref().unwrap().contains(IGNORE_MARKER));
    }
}
