use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which media-server backend a library record came from.
///
/// The catalog stores both servers' libraries side by side; refreshes are
/// scoped to one source and never touch the other's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerSource {
    Primary,
    Secondary,
}

impl ServerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerSource::Primary => "primary",
            ServerSource::Secondary => "secondary",
        }
    }

    pub fn parse(s: &str) -> ServerSource {
        match s {
            "secondary" => ServerSource::Secondary,
            _ => ServerSource::Primary,
        }
    }
}

impl std::fmt::Display for ServerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An artist credit on a playlist track from the remote provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderArtist {
    pub name: String,
}

/// A track as delivered by the remote playlist provider.
///
/// The provider is the source of truth for what a playlist should contain;
/// the sync pipeline decides whether the local server already has each track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderTrack {
    pub id: String,
    pub name: String,
    pub artists: Vec<ProviderArtist>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub popularity: Option<u32>,
    #[serde(default)]
    pub external_urls: Option<serde_json::Value>,
}

impl ProviderTrack {
    /// Name of the primary (first-credited) artist, if any.
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(|a| a.name.as_str())
    }
}

/// A playlist descriptor from the remote provider, tracks included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPlaylist {
    pub id: String,
    pub name: String,
    pub tracks: Vec<ProviderTrack>,
}

/// Outcome of one playlist sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub playlist_name: String,
    pub total_tracks: usize,
    pub matched_tracks: usize,
    pub synced_tracks: usize,
    pub downloaded_tracks: usize,
    pub failed_tracks: usize,
    pub wishlist_added: usize,
    pub sync_time: DateTime<Utc>,
    pub errors: Vec<String>,
}

impl SyncResult {
    pub fn success_rate(&self) -> f64 {
        if self.total_tracks == 0 {
            return 0.0;
        }
        (self.synced_tracks as f64 / self.total_tracks as f64) * 100.0
    }

    /// A zero-count result carrying only errors (rejection, cancellation).
    pub fn error(playlist_name: &str, errors: Vec<String>) -> SyncResult {
        SyncResult {
            playlist_name: playlist_name.to_string(),
            total_tracks: 0,
            matched_tracks: 0,
            synced_tracks: 0,
            downloaded_tracks: 0,
            failed_tracks: 0,
            wishlist_added: 0,
            sync_time: Utc::now(),
            errors,
        }
    }
}

/// Progress snapshot delivered to a playlist's progress callback.
#[derive(Debug, Clone, Serialize)]
pub struct SyncProgress {
    pub current_step: String,
    pub current_track: String,
    /// Percentage through the whole pipeline, 0-100.
    pub progress: f32,
    pub total_steps: u32,
    pub current_step_number: u32,
    pub total_tracks: usize,
    pub matched_tracks: usize,
    pub failed_tracks: usize,
}
