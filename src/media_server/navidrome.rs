use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::{
    LibraryStats, MediaAlbum, MediaArtist, MediaPlaylist, MediaServerClient, MediaTrack,
    MusicLibrary,
};
use crate::config::BackendSettings;
use crate::matching::normalize;
use crate::models::ServerSource;

const API_VERSION: &str = "1.16.1";
const CLIENT_NAME: &str = "cadence";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const PLAYLIST_BATCH_SIZE: usize = 100;
const ALBUM_PAGE_SIZE: usize = 500;

#[derive(Default)]
struct ConnectionState {
    attempted: bool,
    connected: bool,
    music_folder_id: Option<String>,
}

/// Adapter for a Navidrome server, speaking the Subsonic-compatible API.
pub struct NavidromeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    source: ServerSource,
    create_backup: bool,
    connection: AsyncMutex<ConnectionState>,
    metadata_only: Mutex<bool>,
}

// -- Response envelope types --

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(rename = "subsonic-response")]
    subsonic_response: ResponseInner,
}

#[derive(Debug, Deserialize)]
struct ResponseInner {
    status: String,
    #[serde(default)]
    error: Option<ApiError>,
    #[serde(flatten)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SubsonicArtist {
    id: String,
    name: String,
    #[serde(rename = "artistImageUrl", default)]
    artist_image_url: Option<String>,
    #[serde(default)]
    album: Vec<SubsonicAlbum>,
}

#[derive(Debug, Clone, Deserialize)]
struct SubsonicAlbum {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "artistId", default)]
    artist_id: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(rename = "coverArt", default)]
    cover_art: Option<String>,
    #[serde(default)]
    genre: Option<String>,
    #[serde(rename = "songCount", default)]
    song_count: Option<i64>,
    /// Seconds.
    #[serde(default)]
    duration: Option<i64>,
    #[serde(default)]
    song: Vec<SubsonicSong>,
}

#[derive(Debug, Clone, Deserialize)]
struct SubsonicSong {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "albumId", default)]
    album_id: Option<String>,
    #[serde(rename = "artistId", default)]
    artist_id: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    track: Option<i32>,
    /// Seconds.
    #[serde(default)]
    duration: Option<i64>,
    #[serde(rename = "bitRate", default)]
    bit_rate: Option<i32>,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubsonicPlaylist {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "songCount", default)]
    song_count: i64,
    #[serde(default)]
    entry: Vec<SubsonicSong>,
}

impl SubsonicAlbum {
    fn into_album(self, base_url: &str) -> MediaAlbum {
        let thumb_url = self
            .cover_art
            .as_ref()
            .map(|art| format!("{}/rest/getCoverArt?id={}", base_url, art));
        MediaAlbum {
            id: self.id,
            artist_id: self.artist_id,
            title: self.name,
            year: self.year,
            thumb_url,
            genres: self.genre.into_iter().collect(),
            track_count: self.song_count,
            duration_ms: self.duration.map(|secs| secs * 1000),
        }
    }
}

impl SubsonicSong {
    fn into_track(self) -> MediaTrack {
        MediaTrack {
            id: self.id,
            album_id: self.album_id,
            artist_id: self.artist_id,
            title: self.title,
            track_number: self.track,
            duration_ms: self.duration.map(|secs| secs * 1000),
            file_path: self.path,
            bitrate: self.bit_rate,
        }
    }
}

impl NavidromeClient {
    pub fn new(settings: &BackendSettings, source: ServerSource, create_backup: bool) -> Self {
        NavidromeClient {
            http: reqwest::Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            source,
            create_backup,
            connection: AsyncMutex::new(ConnectionState::default()),
            metadata_only: Mutex::new(false),
        }
    }

    fn configured(&self) -> bool {
        !self.base_url.is_empty() && !self.api_key.is_empty()
    }

    fn base_params(&self) -> Vec<(String, String)> {
        vec![
            ("f".to_string(), "json".to_string()),
            ("v".to_string(), API_VERSION.to_string()),
            ("c".to_string(), CLIENT_NAME.to_string()),
            ("apiKey".to_string(), self.api_key.clone()),
        ]
    }

    /// Issue a Subsonic request; `Ok` payload is the envelope's flattened
    /// data. API-level errors and transport failures both come back as
    /// `None` -- callers treat them as empty results.
    async fn request(&self, endpoint: &str, extra: &[(String, String)]) -> Option<serde_json::Value> {
        if !self.configured() {
            return None;
        }

        let mut params = self.base_params();
        params.extend(extra.iter().cloned());

        let url = format!("{}/rest/{}", self.base_url, endpoint);
        let response = self
            .http
            .get(&url)
            .query(&params)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await;

        let envelope: ResponseEnvelope = match response {
            Ok(response) if response.status().is_success() => match response.json().await {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("Failed to parse {} response: {}", endpoint, e);
                    return None;
                }
            },
            Ok(response) => {
                warn!("GET /rest/{} failed: HTTP {}", endpoint, response.status());
                return None;
            }
            Err(e) => {
                warn!("GET /rest/{} failed: {}", endpoint, e);
                return None;
            }
        };

        let inner = envelope.subsonic_response;
        if inner.status != "ok" {
            if let Some(error) = inner.error {
                warn!(
                    "Server error on {} (code {}): {}",
                    endpoint, error.code, error.message
                );
            } else {
                warn!("Server returned failed status on {}", endpoint);
            }
            return None;
        }
        Some(inner.data)
    }

    fn parse_field<T: serde::de::DeserializeOwned>(
        data: &serde_json::Value,
        pointer: &str,
    ) -> Option<T> {
        data.pointer(pointer)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    async fn music_folder_param(&self) -> Vec<(String, String)> {
        let state = self.connection.lock().await;
        match &state.music_folder_id {
            Some(id) => vec![("musicFolderId".to_string(), id.clone())],
            None => Vec::new(),
        }
    }

    async fn album_list(&self, list_type: &str, max_results: usize) -> Vec<MediaAlbum> {
        if !self.ensure_connection().await {
            return Vec::new();
        }

        let mut albums = Vec::new();
        let mut offset = 0usize;
        while albums.len() < max_results {
            let size = ALBUM_PAGE_SIZE.min(max_results - albums.len());
            let mut extra = vec![
                ("type".to_string(), list_type.to_string()),
                ("size".to_string(), size.to_string()),
                ("offset".to_string(), offset.to_string()),
            ];
            extra.extend(self.music_folder_param().await);

            let Some(data) = self.request("getAlbumList2", &extra).await else {
                break;
            };
            let page: Vec<SubsonicAlbum> =
                Self::parse_field(&data, "/albumList2/album").unwrap_or_default();
            if page.is_empty() {
                break;
            }
            let page_len = page.len();
            albums.extend(page.into_iter().map(|a| a.into_album(&self.base_url)));
            if page_len < size {
                break;
            }
            offset += page_len;
        }
        albums
    }

    async fn find_playlist(&self, name: &str) -> Option<MediaPlaylist> {
        self.playlists()
            .await
            .into_iter()
            .find(|p| p.title.eq_ignore_ascii_case(name))
    }

    async fn delete_playlist(&self, playlist_id: &str) -> bool {
        self.request(
            "deletePlaylist",
            &[("id".to_string(), playlist_id.to_string())],
        )
        .await
        .is_some()
    }
}

#[async_trait]
impl MediaServerClient for NavidromeClient {
    fn source(&self) -> ServerSource {
        self.source
    }

    async fn ensure_connection(&self) -> bool {
        let mut state = self.connection.lock().await;
        if state.attempted {
            return state.connected;
        }
        state.attempted = true;

        if !self.configured() {
            warn!("Media server URL or API key not configured");
            return false;
        }

        let probe = crate::retry::retry_with_backoff(
            3,
            Duration::from_millis(500),
            "server ping",
            || async move { self.request("ping", &[]).await.ok_or("no response") },
        )
        .await;
        if probe.is_ok() {
            info!("Connected to server at {}", self.base_url);
            state.connected = true;
        } else {
            warn!("Failed to reach server at {}", self.base_url);
        }
        state.connected
    }

    async fn is_connected(&self) -> bool {
        let state = self.connection.lock().await;
        state.attempted && state.connected
    }

    async fn available_music_libraries(&self) -> Vec<MusicLibrary> {
        if !self.ensure_connection().await {
            return Vec::new();
        }
        let Some(data) = self.request("getMusicFolders", &[]).await else {
            return Vec::new();
        };

        #[derive(Deserialize)]
        struct Folder {
            id: serde_json::Value,
            #[serde(default)]
            name: String,
        }
        let folders: Vec<Folder> =
            Self::parse_field(&data, "/musicFolders/musicFolder").unwrap_or_default();
        folders
            .into_iter()
            .map(|f| MusicLibrary {
                id: match f.id {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                },
                title: f.name,
            })
            .collect()
    }

    async fn select_library_by_name(&self, library_name: &str) -> bool {
        let libraries = self.available_music_libraries().await;
        let Some(library) = libraries.into_iter().find(|l| l.title == library_name) else {
            warn!("Music folder '{}' not found", library_name);
            return false;
        };

        let mut state = self.connection.lock().await;
        state.music_folder_id = Some(library.id);
        info!("Set music folder to: {}", library_name);
        true
    }

    async fn all_artists(&self) -> Result<Vec<MediaArtist>, super::MediaServerError> {
        if !self.ensure_connection().await {
            return Err(super::MediaServerError::NotConnected);
        }

        let extra = self.music_folder_param().await;
        let Some(data) = self.request("getArtists", &extra).await else {
            return Ok(Vec::new());
        };

        #[derive(Deserialize)]
        struct Index {
            #[serde(default)]
            artist: Vec<SubsonicArtist>,
        }
        let indexes: Vec<Index> = Self::parse_field(&data, "/artists/index").unwrap_or_default();

        Ok(indexes
            .into_iter()
            .flat_map(|index| index.artist)
            .map(|artist| MediaArtist {
                id: artist.id,
                name: artist.name,
                thumb_url: artist.artist_image_url,
                genres: Vec::new(),
                summary: None,
            })
            .collect())
    }

    async fn albums_for_artist(&self, artist_id: &str) -> Vec<MediaAlbum> {
        if !self.ensure_connection().await {
            return Vec::new();
        }
        let Some(data) = self
            .request("getArtist", &[("id".to_string(), artist_id.to_string())])
            .await
        else {
            return Vec::new();
        };

        let artist: Option<SubsonicArtist> = Self::parse_field(&data, "/artist");
        artist
            .map(|a| {
                a.album
                    .into_iter()
                    .map(|album| album.into_album(&self.base_url))
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn tracks_for_album(&self, album_id: &str) -> Vec<MediaTrack> {
        if !self.ensure_connection().await {
            return Vec::new();
        }
        let Some(data) = self
            .request("getAlbum", &[("id".to_string(), album_id.to_string())])
            .await
        else {
            return Vec::new();
        };

        let album: Option<SubsonicAlbum> = Self::parse_field(&data, "/album");
        album
            .map(|a| a.song.into_iter().map(SubsonicSong::into_track).collect())
            .unwrap_or_default()
    }

    async fn artist_by_id(&self, artist_id: &str) -> Option<MediaArtist> {
        if !self.ensure_connection().await {
            return None;
        }
        let data = self
            .request("getArtist", &[("id".to_string(), artist_id.to_string())])
            .await?;
        let artist: SubsonicArtist = Self::parse_field(&data, "/artist")?;
        Some(MediaArtist {
            id: artist.id,
            name: artist.name,
            thumb_url: artist.artist_image_url,
            genres: Vec::new(),
            summary: None,
        })
    }

    async fn album_by_id(&self, album_id: &str) -> Option<MediaAlbum> {
        if !self.ensure_connection().await {
            return None;
        }
        let data = self
            .request("getAlbum", &[("id".to_string(), album_id.to_string())])
            .await?;
        let album: SubsonicAlbum = Self::parse_field(&data, "/album")?;
        Some(album.into_album(&self.base_url))
    }

    async fn track_by_id(&self, track_id: &str) -> Option<MediaTrack> {
        if !self.ensure_connection().await {
            return None;
        }
        let data = self
            .request("getSong", &[("id".to_string(), track_id.to_string())])
            .await?;
        let song: SubsonicSong = Self::parse_field(&data, "/song")?;
        Some(song.into_track())
    }

    async fn recently_added_albums(&self, max_results: usize) -> Vec<MediaAlbum> {
        self.album_list("newest", max_results).await
    }

    async fn recently_updated_albums(&self, max_results: usize) -> Vec<MediaAlbum> {
        self.album_list("recent", max_results).await
    }

    async fn recently_added_tracks(&self, max_results: usize) -> Vec<MediaTrack> {
        // No direct endpoint; newest albums expanded into their songs.
        let albums = self.album_list("newest", max_results.div_ceil(10)).await;
        let mut tracks = Vec::new();
        for album in albums {
            if tracks.len() >= max_results {
                break;
            }
            tracks.extend(self.tracks_for_album(&album.id).await);
        }
        tracks.truncate(max_results);
        tracks
    }

    async fn recently_updated_tracks(&self, max_results: usize) -> Vec<MediaTrack> {
        let albums = self.album_list("recent", max_results.div_ceil(10)).await;
        let mut tracks = Vec::new();
        for album in albums {
            if tracks.len() >= max_results {
                break;
            }
            tracks.extend(self.tracks_for_album(&album.id).await);
        }
        tracks.truncate(max_results);
        tracks
    }

    async fn library_stats(&self) -> LibraryStats {
        let Ok(artists) = self.all_artists().await else {
            return LibraryStats::default();
        };

        let mut stats = LibraryStats {
            artists: artists.len() as i64,
            ..Default::default()
        };

        // Page the album list once; songCount comes along for free.
        let mut offset = 0usize;
        loop {
            let extra = vec![
                ("type".to_string(), "alphabeticalByName".to_string()),
                ("size".to_string(), ALBUM_PAGE_SIZE.to_string()),
                ("offset".to_string(), offset.to_string()),
            ];
            let Some(data) = self.request("getAlbumList2", &extra).await else {
                break;
            };
            let page: Vec<SubsonicAlbum> =
                Self::parse_field(&data, "/albumList2/album").unwrap_or_default();
            if page.is_empty() {
                break;
            }
            stats.albums += page.len() as i64;
            stats.tracks += page.iter().filter_map(|a| a.song_count).sum::<i64>();
            if page.len() < ALBUM_PAGE_SIZE {
                break;
            }
            offset += page.len();
        }

        stats
    }

    async fn playlists(&self) -> Vec<MediaPlaylist> {
        if !self.ensure_connection().await {
            return Vec::new();
        }
        let Some(data) = self.request("getPlaylists", &[]).await else {
            return Vec::new();
        };

        let playlists: Vec<SubsonicPlaylist> =
            Self::parse_field(&data, "/playlists/playlist").unwrap_or_default();
        playlists
            .into_iter()
            .map(|p| MediaPlaylist {
                id: p.id,
                title: p.name,
                track_count: p.song_count,
            })
            .collect()
    }

    async fn playlist_by_name(&self, name: &str) -> Option<MediaPlaylist> {
        self.find_playlist(name).await
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Vec<MediaTrack> {
        if !self.ensure_connection().await {
            return Vec::new();
        }
        let Some(data) = self
            .request("getPlaylist", &[("id".to_string(), playlist_id.to_string())])
            .await
        else {
            return Vec::new();
        };

        let playlist: Option<SubsonicPlaylist> = Self::parse_field(&data, "/playlist");
        playlist
            .map(|p| p.entry.into_iter().map(SubsonicSong::into_track).collect())
            .unwrap_or_default()
    }

    async fn create_playlist(&self, name: &str, track_ids: &[String]) -> bool {
        if !self.ensure_connection().await {
            return false;
        }

        let valid: Vec<&String> = track_ids
            .iter()
            .filter(|id| self.is_valid_item_id(id))
            .collect();
        if valid.len() < track_ids.len() {
            warn!(
                "Found {} tracks with invalid ids for playlist '{}', skipping them",
                track_ids.len() - valid.len(),
                name
            );
        }
        if valid.is_empty() {
            warn!("No valid tracks provided for playlist '{}'", name);
            return false;
        }

        // Create with the first batch, append the rest.
        let mut batches = valid.chunks(PLAYLIST_BATCH_SIZE);
        let first: Vec<(String, String)> = batches
            .next()
            .unwrap_or_default()
            .iter()
            .map(|id| ("songId".to_string(), (*id).clone()))
            .collect();

        let mut extra = vec![("name".to_string(), name.to_string())];
        extra.extend(first);
        let Some(data) = self.request("createPlaylist", &extra).await else {
            warn!("Failed to create playlist '{}'", name);
            return false;
        };

        let playlist_id = data
            .pointer("/playlist/id")
            .and_then(|v| v.as_str().map(|s| s.to_string()).or(Some(v.to_string())));
        let Some(playlist_id) = playlist_id else {
            // Older servers return an empty body; look the playlist up.
            return match self.find_playlist(name).await {
                Some(_) => true,
                None => false,
            };
        };

        for batch in batches {
            let mut extra = vec![("playlistId".to_string(), playlist_id.clone())];
            extra.extend(
                batch
                    .iter()
                    .map(|id| ("songIdToAdd".to_string(), (*id).clone())),
            );
            if self.request("updatePlaylist", &extra).await.is_none() {
                warn!("Failed to append a batch to playlist '{}'", name);
            }
        }

        info!("Created playlist '{}' with {} tracks", name, valid.len());
        true
    }

    async fn update_playlist(&self, name: &str, track_ids: &[String]) -> bool {
        if !self.ensure_connection().await {
            return false;
        }

        let existing = self.find_playlist(name).await;

        let mut backup_name = None;
        if existing.is_some() && self.create_backup {
            let candidate = format!("{} Backup", name);
            info!("Creating backup playlist '{}' before sync", candidate);
            if self.copy_playlist(name, &candidate).await {
                backup_name = Some(candidate);
            } else {
                warn!("Failed to create backup playlist, continuing with sync");
            }
        }

        if let Some(existing) = existing {
            if !self.delete_playlist(&existing.id).await {
                warn!("Could not delete existing playlist '{}', creating anyway", name);
            }
        }

        let success = self.create_playlist(name, track_ids).await;

        if success {
            if let Some(backup_name) = backup_name {
                if let Some(backup) = self.find_playlist(&backup_name).await {
                    self.delete_playlist(&backup.id).await;
                }
            }
        }

        success
    }

    async fn copy_playlist(&self, source_name: &str, target_name: &str) -> bool {
        let Some(source) = self.find_playlist(source_name).await else {
            warn!("Source playlist '{}' not found", source_name);
            return false;
        };

        let tracks = self.playlist_tracks(&source.id).await;
        if tracks.is_empty() {
            warn!("Source playlist '{}' has no tracks to copy", source_name);
            return false;
        }

        if let Some(target) = self.find_playlist(target_name).await {
            self.delete_playlist(&target.id).await;
        }

        let ids: Vec<String> = tracks.into_iter().map(|t| t.id).collect();
        self.create_playlist(target_name, &ids).await
    }

    async fn trigger_library_scan(&self) -> bool {
        if !self.ensure_connection().await {
            return false;
        }
        let triggered = self.request("startScan", &[]).await.is_some();
        if triggered {
            info!("Triggered library scan");
        }
        triggered
    }

    async fn is_library_scanning(&self) -> bool {
        if !self.ensure_connection().await {
            return false;
        }
        let Some(data) = self.request("getScanStatus", &[]).await else {
            return false;
        };
        data.pointer("/scanStatus/scanning")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    async fn update_artist_poster(&self, artist_id: &str, _image_data: &[u8]) -> bool {
        // The Subsonic surface has no image upload endpoint.
        debug!("Poster upload not supported for artist {}", artist_id);
        false
    }

    async fn update_album_poster(&self, album_id: &str, _image_data: &[u8]) -> bool {
        debug!("Poster upload not supported for album {}", album_id);
        false
    }

    async fn search_track_by_metadata(&self, title: &str, artist: &str) -> Option<MediaTrack> {
        if !self.ensure_connection().await {
            return None;
        }
        let extra = vec![
            ("query".to_string(), title.to_string()),
            ("songCount".to_string(), "25".to_string()),
            ("artistCount".to_string(), "0".to_string()),
            ("albumCount".to_string(), "0".to_string()),
        ];
        let data = self.request("search3", &extra).await?;
        let songs: Vec<SubsonicSong> =
            Self::parse_field(&data, "/searchResult3/song").unwrap_or_default();

        let title_norm = normalize(title);
        let artist_norm = normalize(artist);
        songs
            .into_iter()
            .find(|song| {
                if normalize(&song.title) != title_norm {
                    return false;
                }
                song.artist
                    .as_deref()
                    .map(|a| {
                        let name = normalize(a);
                        name == artist_norm
                            || name.contains(&artist_norm)
                            || artist_norm.contains(&name)
                    })
                    .unwrap_or(false)
            })
            .map(SubsonicSong::into_track)
    }

    async fn track_by_filename(&self, filename: &str) -> Option<MediaTrack> {
        if !self.ensure_connection().await {
            return None;
        }
        let stem = filename.rsplit_once('.').map(|(s, _)| s).unwrap_or(filename);
        let extra = vec![
            ("query".to_string(), stem.to_string()),
            ("songCount".to_string(), "10".to_string()),
            ("artistCount".to_string(), "0".to_string()),
            ("albumCount".to_string(), "0".to_string()),
        ];
        let data = self.request("search3", &extra).await?;
        let songs: Vec<SubsonicSong> =
            Self::parse_field(&data, "/searchResult3/song").unwrap_or_default();

        songs
            .into_iter()
            .find(|song| {
                song.path
                    .as_deref()
                    .map(|p| p.ends_with(filename))
                    .unwrap_or(false)
            })
            .map(SubsonicSong::into_track)
    }

    fn is_valid_item_id(&self, id: &str) -> bool {
        // Navidrome ids are opaque tokens; any non-empty id that is not a
        // filesystem placeholder is acceptable.
        let id = id.trim();
        !id.is_empty() && !id.starts_with("fs_")
    }

    fn set_metadata_only_mode(&self, enabled: bool) {
        *self.metadata_only.lock().unwrap() = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap_ok(extra: serde_json::Value) -> serde_json::Value {
        let mut inner = serde_json::json!({
            "status": "ok",
            "version": API_VERSION,
        });
        if let (Some(inner_map), Some(extra_map)) = (inner.as_object_mut(), extra.as_object()) {
            for (k, v) in extra_map {
                inner_map.insert(k.clone(), v.clone());
            }
        }
        serde_json::json!({ "subsonic-response": inner })
    }

    #[test]
    fn parses_ok_envelope() {
        let envelope: ResponseEnvelope =
            serde_json::from_value(wrap_ok(serde_json::json!({}))).unwrap();
        assert_eq!(envelope.subsonic_response.status, "ok");
        assert!(envelope.subsonic_response.error.is_none());
    }

    #[test]
    fn parses_error_envelope() {
        let envelope: ResponseEnvelope = serde_json::from_value(serde_json::json!({
            "subsonic-response": {
                "status": "failed",
                "error": { "code": 40, "message": "Wrong credentials" }
            }
        }))
        .unwrap();
        let inner = envelope.subsonic_response;
        assert_eq!(inner.status, "failed");
        assert_eq!(inner.error.unwrap().code, 40);
    }

    #[test]
    fn parses_album_with_songs() {
        let envelope: ResponseEnvelope = serde_json::from_value(wrap_ok(serde_json::json!({
            "album": {
                "id": "al-1",
                "name": "Animals",
                "artistId": "ar-1",
                "year": 1977,
                "songCount": 5,
                "duration": 2514,
                "song": [{
                    "id": "tr-1",
                    "title": "Dogs",
                    "albumId": "al-1",
                    "artistId": "ar-1",
                    "artist": "Pink Floyd",
                    "track": 2,
                    "duration": 1025,
                    "bitRate": 1024,
                    "path": "Pink Floyd/Animals/02 - Dogs.flac"
                }]
            }
        })))
        .unwrap();

        let album: SubsonicAlbum =
            serde_json::from_value(envelope.subsonic_response.data["album"].clone()).unwrap();
        assert_eq!(album.song.len(), 1);
        let track = album.song[0].clone().into_track();
        assert_eq!(track.duration_ms, Some(1_025_000));
        assert_eq!(track.track_number, Some(2));
        assert_eq!(track.bitrate, Some(1024));
    }

    #[test]
    fn placeholder_ids_are_rejected() {
        let client = NavidromeClient::new(
            &BackendSettings::default(),
            ServerSource::Secondary,
            false,
        );
        assert!(client.is_valid_item_id("12ab"));
        assert!(!client.is_valid_item_id(""));
        assert!(!client.is_valid_item_id("fs_8a2b"));
    }
}
