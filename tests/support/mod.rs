// Shared helpers for integration tests: a temp-file catalog database and a
// scriptable in-memory media-server backend.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use cadence::db::Database;
use cadence::media_server::{
    is_valid_guid, LibraryStats, MediaAlbum, MediaArtist, MediaPlaylist, MediaServerClient,
    MediaServerError, MediaTrack, MusicLibrary,
};
use cadence::models::ServerSource;

/// Install the test log subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// A catalog database on a temp file. Keep the `TempDir` alive for the
/// duration of the test.
pub async fn temp_database() -> (Database, TempDir) {
    init_tracing();
    let dir = TempDir::new().expect("create temp dir");
    let db = Database::new(&dir.path().join("catalog.db"))
        .await
        .expect("open catalog");
    (db, dir)
}

/// A scriptable media-server backend.
///
/// Metadata searches resolve from a (title, artist) table after an
/// optional per-call delay; playlist writes are recorded for inspection.
pub struct StubMediaServer {
    pub source: ServerSource,
    pub resolve_delay: Duration,
    /// (lowercase title, lowercase artist) -> track
    pub metadata_hits: Mutex<HashMap<(String, String), MediaTrack>>,
    /// (playlist name, written ids)
    pub playlist_writes: Mutex<Vec<(String, Vec<String>)>>,
}

impl StubMediaServer {
    pub fn new() -> Self {
        StubMediaServer {
            source: ServerSource::Primary,
            resolve_delay: Duration::ZERO,
            metadata_hits: Mutex::new(HashMap::new()),
            playlist_writes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        StubMediaServer {
            resolve_delay: delay,
            ..Self::new()
        }
    }

    pub fn add_metadata_hit(&self, title: &str, artist: &str, track_id: &str) {
        let track = MediaTrack {
            id: track_id.to_string(),
            album_id: None,
            artist_id: None,
            title: title.to_string(),
            track_number: None,
            duration_ms: None,
            file_path: None,
            bitrate: None,
        };
        self.metadata_hits
            .lock()
            .unwrap()
            .insert((title.to_lowercase(), artist.to_lowercase()), track);
    }

    pub fn written_playlists(&self) -> Vec<(String, Vec<String>)> {
        self.playlist_writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaServerClient for StubMediaServer {
    fn source(&self) -> ServerSource {
        self.source
    }

    async fn ensure_connection(&self) -> bool {
        true
    }

    async fn is_connected(&self) -> bool {
        true
    }

    async fn available_music_libraries(&self) -> Vec<MusicLibrary> {
        vec![MusicLibrary {
            id: "lib-1".to_string(),
            title: "Music".to_string(),
        }]
    }

    async fn select_library_by_name(&self, _library_name: &str) -> bool {
        true
    }

    async fn all_artists(&self) -> Result<Vec<MediaArtist>, MediaServerError> {
        Ok(Vec::new())
    }

    async fn albums_for_artist(&self, _artist_id: &str) -> Vec<MediaAlbum> {
        Vec::new()
    }

    async fn tracks_for_album(&self, _album_id: &str) -> Vec<MediaTrack> {
        Vec::new()
    }

    async fn artist_by_id(&self, _artist_id: &str) -> Option<MediaArtist> {
        None
    }

    async fn album_by_id(&self, _album_id: &str) -> Option<MediaAlbum> {
        None
    }

    async fn track_by_id(&self, _track_id: &str) -> Option<MediaTrack> {
        None
    }

    async fn recently_added_albums(&self, _max_results: usize) -> Vec<MediaAlbum> {
        Vec::new()
    }

    async fn recently_updated_albums(&self, _max_results: usize) -> Vec<MediaAlbum> {
        Vec::new()
    }

    async fn recently_added_tracks(&self, _max_results: usize) -> Vec<MediaTrack> {
        Vec::new()
    }

    async fn recently_updated_tracks(&self, _max_results: usize) -> Vec<MediaTrack> {
        Vec::new()
    }

    async fn library_stats(&self) -> LibraryStats {
        LibraryStats::default()
    }

    async fn playlists(&self) -> Vec<MediaPlaylist> {
        Vec::new()
    }

    async fn playlist_by_name(&self, _name: &str) -> Option<MediaPlaylist> {
        None
    }

    async fn playlist_tracks(&self, _playlist_id: &str) -> Vec<MediaTrack> {
        Vec::new()
    }

    async fn create_playlist(&self, name: &str, track_ids: &[String]) -> bool {
        self.playlist_writes
            .lock()
            .unwrap()
            .push((name.to_string(), track_ids.to_vec()));
        true
    }

    async fn update_playlist(&self, name: &str, track_ids: &[String]) -> bool {
        self.create_playlist(name, track_ids).await
    }

    async fn copy_playlist(&self, _source_name: &str, _target_name: &str) -> bool {
        true
    }

    async fn trigger_library_scan(&self) -> bool {
        true
    }

    async fn is_library_scanning(&self) -> bool {
        false
    }

    async fn update_artist_poster(&self, _artist_id: &str, _image_data: &[u8]) -> bool {
        true
    }

    async fn update_album_poster(&self, _album_id: &str, _image_data: &[u8]) -> bool {
        true
    }

    async fn search_track_by_metadata(&self, title: &str, artist: &str) -> Option<MediaTrack> {
        if !self.resolve_delay.is_zero() {
            tokio::time::sleep(self.resolve_delay).await;
        }
        self.metadata_hits
            .lock()
            .unwrap()
            .get(&(title.to_lowercase(), artist.to_lowercase()))
            .cloned()
    }

    fn is_valid_item_id(&self, id: &str) -> bool {
        is_valid_guid(id)
    }

    fn set_metadata_only_mode(&self, _enabled: bool) {}
}
