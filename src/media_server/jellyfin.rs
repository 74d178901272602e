use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::{
    is_valid_guid, LibraryStats, MediaAlbum, MediaArtist, MediaPlaylist, MediaServerClient,
    MediaTrack, MusicLibrary,
};
use crate::config::BackendSettings;
use crate::matching::normalize;
use crate::models::ServerSource;

const BULK_PAGE_SIZE: i64 = 10000;
const PLAYLIST_BATCH_SIZE: usize = 100;
const BULK_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Callback invoked with a human-readable message after each cache page.
pub type CacheProgress = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct ConnectionState {
    attempted: bool,
    user_id: Option<String>,
    library_id: Option<String>,
}

/// Adapter for a Jellyfin/Emby-style server.
///
/// Connects lazily, discovers the first user with access to a music
/// library, and populates an aggressive item cache so per-artist and
/// per-album lookups never fan out into individual API calls.
pub struct JellyfinClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    source: ServerSource,
    create_backup: bool,
    connection: AsyncMutex<ConnectionState>,
    /// artist id -> albums
    album_cache: Mutex<HashMap<String, Vec<MediaAlbum>>>,
    /// album id -> tracks
    track_cache: Mutex<HashMap<String, Vec<MediaTrack>>>,
    cache_populated: AtomicBool,
    metadata_only: AtomicBool,
    progress_callback: Mutex<Option<CacheProgress>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemsPage {
    #[serde(default)]
    items: Vec<Item>,
    #[serde(default)]
    total_record_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Item {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    album_id: Option<String>,
    #[serde(default)]
    artist_items: Vec<ItemRef>,
    #[serde(default)]
    album_artists: Vec<ItemRef>,
    #[serde(default)]
    run_time_ticks: Option<i64>,
    #[serde(default)]
    index_number: Option<i32>,
    #[serde(default)]
    production_year: Option<i32>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    child_count: Option<i64>,
    #[serde(default)]
    collection_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemRef {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ScheduledTask {
    #[serde(default)]
    name: String,
    #[serde(default)]
    state: String,
}

impl Item {
    fn duration_ms(&self) -> Option<i64> {
        // Jellyfin reports runtime in 100ns ticks.
        self.run_time_ticks.map(|ticks| ticks / 10_000)
    }

    fn into_track(self) -> MediaTrack {
        let duration_ms = self.duration_ms();
        MediaTrack {
            artist_id: self.artist_items.first().map(|a| a.id.clone()),
            album_id: self.album_id,
            id: self.id,
            title: self.name,
            track_number: self.index_number,
            duration_ms,
            file_path: self.path,
            bitrate: None,
        }
    }

    fn into_album(self) -> MediaAlbum {
        let duration_ms = self.duration_ms();
        MediaAlbum {
            artist_id: self.album_artists.first().map(|a| a.id.clone()),
            id: self.id,
            title: self.name,
            year: self.production_year,
            thumb_url: None,
            genres: self.genres,
            track_count: self.child_count,
            duration_ms,
        }
    }

    fn into_artist(self, base_url: &str) -> MediaArtist {
        let thumb_url = Some(format!("{}/Items/{}/Images/Primary", base_url, self.id));
        MediaArtist {
            id: self.id,
            name: self.name,
            thumb_url,
            genres: self.genres,
            summary: self.overview,
        }
    }
}

impl JellyfinClient {
    pub fn new(settings: &BackendSettings, source: ServerSource, create_backup: bool) -> Self {
        JellyfinClient {
            http: reqwest::Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            source,
            create_backup,
            connection: AsyncMutex::new(ConnectionState::default()),
            album_cache: Mutex::new(HashMap::new()),
            track_cache: Mutex::new(HashMap::new()),
            cache_populated: AtomicBool::new(false),
            metadata_only: AtomicBool::new(false),
            progress_callback: Mutex::new(None),
        }
    }

    /// Register a callback for cache-population progress messages.
    pub fn set_progress_callback(&self, callback: Option<CacheProgress>) {
        *self.progress_callback.lock().unwrap() = callback;
    }

    fn report_progress(&self, message: &str) {
        if let Some(cb) = self.progress_callback.lock().unwrap().as_ref() {
            cb(message);
        }
    }

    fn configured(&self) -> bool {
        !self.base_url.is_empty() && !self.api_key.is_empty()
    }

    /// GET returning parsed JSON, absorbing transport errors into `None`.
    /// Bulk pages (Limit > 1000) get the long timeout.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Option<T> {
        if !self.configured() {
            return None;
        }

        let is_bulk = params
            .iter()
            .any(|(k, v)| *k == "Limit" && v.parse::<i64>().map(|n| n > 1000).unwrap_or(false));
        let timeout = if is_bulk { BULK_TIMEOUT } else { REQUEST_TIMEOUT };

        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .http
            .get(&url)
            .header("X-Emby-Token", &self.api_key)
            .query(params)
            .timeout(timeout)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => match response.json::<T>().await {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!("Failed to parse response from {}: {}", endpoint, e);
                    None
                }
            },
            Ok(response) => {
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    debug!("GET {} returned 404", endpoint);
                } else {
                    warn!("GET {} failed: HTTP {}", endpoint, response.status());
                }
                None
            }
            Err(e) => {
                warn!("GET {} failed: {}", endpoint, e);
                None
            }
        }
    }

    /// (user id, music library id) once connected.
    async fn connection_ids(&self) -> Option<(String, String)> {
        if !self.ensure_connection().await {
            return None;
        }
        let state = self.connection.lock().await;
        Some((state.user_id.clone()?, state.library_id.clone()?))
    }

    async fn items_page(&self, user_id: &str, params: &[(&str, String)]) -> Option<ItemsPage> {
        self.get_json(&format!("/Users/{}/Items", user_id), params)
            .await
    }

    /// Page every item of one type in the music library.
    async fn page_all_items(
        &self,
        user_id: &str,
        library_id: &str,
        item_type: &str,
        fields: &str,
        sort_by: &str,
        label: &str,
    ) -> Vec<Item> {
        let mut all_items = Vec::new();
        let mut start_index: i64 = 0;
        let mut limit = BULK_PAGE_SIZE;
        let mut consecutive_failures = 0;

        loop {
            let params = [
                ("ParentId", library_id.to_string()),
                ("IncludeItemTypes", item_type.to_string()),
                ("Recursive", "true".to_string()),
                ("Fields", fields.to_string()),
                ("SortBy", sort_by.to_string()),
                ("SortOrder", "Ascending".to_string()),
                ("StartIndex", start_index.to_string()),
                ("Limit", limit.to_string()),
            ];

            let Some(page) = self.items_page(user_id, &params).await else {
                consecutive_failures += 1;
                if consecutive_failures >= 3 {
                    warn!("Multiple {} fetch failures, stopping with partial cache", label);
                    break;
                }
                if limit > 1000 {
                    limit /= 2;
                    warn!("{} fetch failed, reducing batch size to {}", label, limit);
                    continue;
                }
                break;
            };

            consecutive_failures = 0;
            if page.items.is_empty() {
                break;
            }

            let batch_len = page.items.len() as i64;
            all_items.extend(page.items);

            if batch_len < limit {
                break;
            }
            start_index += limit;

            let message = format!("Fetched {} {} so far...", all_items.len(), label);
            debug!("{} (batch size {})", message, limit);
            self.report_progress(&message);
        }

        all_items
    }

    /// Pre-populate the album and track caches in two bulk sweeps so that
    /// subsequent per-artist and per-album lookups are cache hits.
    async fn populate_aggressive_cache(&self, user_id: &str, library_id: &str) {
        if self.cache_populated.load(Ordering::Acquire) {
            return;
        }
        if self.metadata_only.load(Ordering::Acquire) {
            debug!("Skipping cache population for metadata-only operation");
            self.cache_populated.store(true, Ordering::Release);
            return;
        }

        info!("Starting aggressive cache population...");
        self.report_progress("Fetching all tracks in bulk...");

        let tracks = self
            .page_all_items(
                user_id,
                library_id,
                "Audio",
                "AlbumId,ArtistItems,Path",
                "AlbumId,IndexNumber",
                "tracks",
            )
            .await;

        let mut by_album: HashMap<String, Vec<MediaTrack>> = HashMap::new();
        let track_total = tracks.len();
        for item in tracks {
            if let Some(album_id) = item.album_id.clone() {
                by_album.entry(album_id).or_default().push(item.into_track());
            }
        }
        let album_key_count = by_album.len();
        *self.track_cache.lock().unwrap() = by_album;
        info!("Cached {} tracks for {} albums", track_total, album_key_count);
        self.report_progress(&format!(
            "Cached {} tracks. Now fetching albums...",
            track_total
        ));

        let albums = self
            .page_all_items(
                user_id,
                library_id,
                "MusicAlbum",
                "AlbumArtists,Artists,Genres,ChildCount",
                "SortName",
                "albums",
            )
            .await;

        let mut by_artist: HashMap<String, Vec<MediaAlbum>> = HashMap::new();
        let album_total = albums.len();
        for item in albums {
            let artist_ids: Vec<String> =
                item.album_artists.iter().map(|a| a.id.clone()).collect();
            let album = item.into_album();
            for artist_id in artist_ids {
                by_artist.entry(artist_id).or_default().push(album.clone());
            }
        }
        let artist_key_count = by_artist.len();
        *self.album_cache.lock().unwrap() = by_artist;
        info!("Cached {} albums for {} artists", album_total, artist_key_count);

        self.cache_populated.store(true, Ordering::Release);
        self.report_progress("Cache complete! Now processing artists...");
    }

    /// Fill the track cache for a specific set of albums, for incremental
    /// refreshes that must not pay the full-library sweep.
    pub async fn populate_targeted_cache(&self, album_ids: &[String]) {
        let Some((user_id, _)) = self.connection_ids().await else {
            return;
        };

        info!("Targeted cache fill for {} albums...", album_ids.len());
        let mut cached_tracks = 0usize;

        for (index, album_id) in album_ids.iter().enumerate() {
            let params = [
                ("ParentId", album_id.clone()),
                ("IncludeItemTypes", "Audio".to_string()),
                ("Recursive", "true".to_string()),
                ("Fields", "AlbumId,ArtistItems,Path".to_string()),
                ("SortBy", "IndexNumber".to_string()),
                ("SortOrder", "Ascending".to_string()),
                ("Limit", "200".to_string()),
            ];
            if let Some(page) = self.items_page(&user_id, &params).await {
                let tracks: Vec<MediaTrack> =
                    page.items.into_iter().map(Item::into_track).collect();
                cached_tracks += tracks.len();
                self.track_cache
                    .lock()
                    .unwrap()
                    .insert(album_id.clone(), tracks);
            }

            if (index + 1) % 50 == 0 || index + 1 == album_ids.len() {
                self.report_progress(&format!(
                    "Cached {} tracks from {} albums...",
                    cached_tracks,
                    index + 1
                ));
            }
        }

        info!("Targeted cache complete: {} tracks", cached_tracks);
    }

    /// Clear all caches; the next bulk call repopulates.
    pub fn clear_cache(&self) {
        self.album_cache.lock().unwrap().clear();
        self.track_cache.lock().unwrap().clear();
        self.cache_populated.store(false, Ordering::Release);
    }

    async fn find_playlist(&self, name: &str) -> Option<MediaPlaylist> {
        self.playlists()
            .await
            .into_iter()
            .find(|p| p.title.eq_ignore_ascii_case(name))
    }

    async fn delete_item(&self, item_id: &str) -> bool {
        let url = format!("{}/Items/{}", self.base_url, item_id);
        match self
            .http
            .delete(&url)
            .header("X-Emby-Token", &self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("DELETE /Items/{} failed: {}", item_id, e);
                false
            }
        }
    }

    /// Create an empty playlist, then append ids in batches. An append
    /// failure skips that batch but the rest continue; success means the
    /// container exists.
    async fn create_playlist_batched(
        &self,
        user_id: &str,
        name: &str,
        track_ids: &[String],
    ) -> bool {
        let url = format!("{}/Playlists", self.base_url);
        let body = serde_json::json!({
            "Name": name,
            "UserId": user_id,
            "MediaType": "Audio",
        });

        let response = match self
            .http
            .post(&url)
            .header("X-Emby-Token", &self.api_key)
            .json(&body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!("Failed to create playlist '{}': HTTP {}", name, response.status());
                return false;
            }
            Err(e) => {
                warn!("Failed to create playlist '{}': {}", name, e);
                return false;
            }
        };

        let playlist_id = match response.json::<serde_json::Value>().await {
            Ok(value) => match value.get("Id").and_then(|v| v.as_str()) {
                Some(id) => id.to_string(),
                None => {
                    warn!("Playlist creation for '{}' returned no id", name);
                    return false;
                }
            },
            Err(e) => {
                warn!("Failed to parse playlist creation response: {}", e);
                return false;
            }
        };
        info!("Created empty playlist '{}' (id {})", name, playlist_id);

        let total_batches = track_ids.len().div_ceil(PLAYLIST_BATCH_SIZE);
        for (batch_number, batch) in track_ids.chunks(PLAYLIST_BATCH_SIZE).enumerate() {
            let valid: Vec<&String> = batch.iter().filter(|id| is_valid_guid(id)).collect();
            if valid.is_empty() {
                warn!("Batch {}/{} has no valid ids, skipping", batch_number + 1, total_batches);
                continue;
            }

            debug!(
                "Adding batch {}/{} ({} tracks) to playlist '{}'",
                batch_number + 1,
                total_batches,
                valid.len(),
                name
            );

            let add_url = format!("{}/Playlists/{}/Items", self.base_url, playlist_id);
            let ids: Vec<&str> = valid.iter().map(|s| s.as_str()).collect();
            let params = [
                ("Ids", ids.join(",")),
                ("UserId", user_id.to_string()),
            ];
            let result = self
                .http
                .post(&add_url)
                .header("X-Emby-Token", &self.api_key)
                .query(&params)
                .timeout(BULK_TIMEOUT)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => warn!(
                    "Failed to add batch {}/{} to '{}': HTTP {}",
                    batch_number + 1,
                    total_batches,
                    name,
                    response.status()
                ),
                Err(e) => warn!(
                    "Failed to add batch {}/{} to '{}': {}",
                    batch_number + 1,
                    total_batches,
                    name,
                    e
                ),
            }
        }

        info!(
            "Created playlist '{}' with {} tracks in {} batches",
            name,
            track_ids.len(),
            total_batches
        );
        true
    }

    async fn upload_image(&self, item_id: &str, image_data: &[u8]) -> bool {
        let url = format!("{}/Items/{}/Images/Primary", self.base_url, item_id);
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_data);
        match self
            .http
            .post(&url)
            .header("X-Emby-Token", &self.api_key)
            .header("Content-Type", "image/jpeg")
            .body(encoded)
            .timeout(BULK_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Image upload for {} failed: {}", item_id, e);
                false
            }
        }
    }
}

#[async_trait]
impl MediaServerClient for JellyfinClient {
    fn source(&self) -> ServerSource {
        self.source
    }

    async fn ensure_connection(&self) -> bool {
        let mut state = self.connection.lock().await;
        if state.attempted {
            return state.user_id.is_some() && state.library_id.is_some();
        }
        state.attempted = true;

        if !self.configured() {
            warn!("Media server URL or API key not configured");
            return false;
        }

        // The probe is the one call worth retrying: a server mid-restart
        // should not poison the whole session.
        let probe = crate::retry::retry_with_backoff(
            3,
            Duration::from_millis(500),
            "media server probe",
            || async move {
                self.get_json::<serde_json::Value>("/System/Info", &[])
                    .await
                    .ok_or("no response")
            },
        )
        .await;
        let Ok(info) = probe else {
            warn!("Failed to reach media server at {}", self.base_url);
            return false;
        };
        let server_name = info
            .get("ServerName")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown");
        info!("Connected to media server: {}", server_name);

        let Some(users) = self.get_json::<Vec<serde_json::Value>>("/Users", &[]).await else {
            warn!("No users found on media server");
            return false;
        };

        // Walk users until one has a music library we can read. A user
        // failing (permissions, broken views) just moves us to the next.
        for user in &users {
            let Some(candidate_id) = user.get("Id").and_then(|v| v.as_str()) else {
                continue;
            };
            let candidate_name = user.get("Name").and_then(|v| v.as_str()).unwrap_or("Unknown");

            let Some(views) = self
                .get_json::<ItemsPage>(&format!("/Users/{}/Views", candidate_id), &[])
                .await
            else {
                debug!("Skipping user {}: views unavailable", candidate_name);
                continue;
            };

            for view in views.items {
                let collection_type = view.collection_type.as_deref().unwrap_or("");
                if collection_type.eq_ignore_ascii_case("music") {
                    info!(
                        "Using user: {} (music library: {})",
                        candidate_name, view.name
                    );
                    state.user_id = Some(candidate_id.to_string());
                    state.library_id = Some(view.id);
                    return true;
                }
            }
        }

        warn!("Connected to media server, but no user has access to a music library");
        false
    }

    async fn is_connected(&self) -> bool {
        let state = self.connection.lock().await;
        state.attempted && state.user_id.is_some() && state.library_id.is_some()
    }

    async fn available_music_libraries(&self) -> Vec<MusicLibrary> {
        let Some((user_id, _)) = self.connection_ids().await else {
            return Vec::new();
        };
        let Some(views) = self
            .get_json::<ItemsPage>(&format!("/Users/{}/Views", user_id), &[])
            .await
        else {
            return Vec::new();
        };

        views
            .items
            .into_iter()
            .filter(|v| {
                v.collection_type
                    .as_deref()
                    .map(|t| t.eq_ignore_ascii_case("music"))
                    .unwrap_or(false)
            })
            .map(|v| MusicLibrary {
                id: v.id,
                title: v.name,
            })
            .collect()
    }

    async fn select_library_by_name(&self, library_name: &str) -> bool {
        let libraries = self.available_music_libraries().await;
        let Some(library) = libraries.into_iter().find(|l| l.title == library_name) else {
            warn!("Music library '{}' not found", library_name);
            return false;
        };

        let mut state = self.connection.lock().await;
        state.library_id = Some(library.id);
        info!("Set music library to: {}", library_name);
        self.clear_cache();
        true
    }

    async fn all_artists(&self) -> Result<Vec<MediaArtist>, super::MediaServerError> {
        let Some((user_id, library_id)) = self.connection_ids().await else {
            return Err(super::MediaServerError::NotConnected);
        };

        self.populate_aggressive_cache(&user_id, &library_id).await;

        let items = self
            .page_all_items(
                &user_id,
                &library_id,
                "MusicArtist",
                "Genres,Overview",
                "SortName",
                "artists",
            )
            .await;
        Ok(items
            .into_iter()
            .map(|item| item.into_artist(&self.base_url))
            .collect())
    }

    async fn albums_for_artist(&self, artist_id: &str) -> Vec<MediaAlbum> {
        if let Some(albums) = self.album_cache.lock().unwrap().get(artist_id) {
            return albums.clone();
        }

        let Some((user_id, library_id)) = self.connection_ids().await else {
            return Vec::new();
        };
        let params = [
            ("ParentId", library_id),
            ("IncludeItemTypes", "MusicAlbum".to_string()),
            ("Recursive", "true".to_string()),
            ("Fields", "AlbumArtists,Artists,Genres,ChildCount".to_string()),
            ("ArtistIds", artist_id.to_string()),
            ("Limit", "500".to_string()),
        ];
        let Some(page) = self.items_page(&user_id, &params).await else {
            return Vec::new();
        };

        let albums: Vec<MediaAlbum> = page.items.into_iter().map(Item::into_album).collect();
        self.album_cache
            .lock()
            .unwrap()
            .insert(artist_id.to_string(), albums.clone());
        albums
    }

    async fn tracks_for_album(&self, album_id: &str) -> Vec<MediaTrack> {
        if let Some(tracks) = self.track_cache.lock().unwrap().get(album_id) {
            return tracks.clone();
        }

        let Some((user_id, _)) = self.connection_ids().await else {
            return Vec::new();
        };
        let params = [
            ("ParentId", album_id.to_string()),
            ("IncludeItemTypes", "Audio".to_string()),
            ("Recursive", "true".to_string()),
            ("Fields", "AlbumId,ArtistItems,Path".to_string()),
            ("SortBy", "IndexNumber".to_string()),
            ("SortOrder", "Ascending".to_string()),
            ("Limit", "200".to_string()),
        ];
        let Some(page) = self.items_page(&user_id, &params).await else {
            return Vec::new();
        };

        let tracks: Vec<MediaTrack> = page.items.into_iter().map(Item::into_track).collect();
        self.track_cache
            .lock()
            .unwrap()
            .insert(album_id.to_string(), tracks.clone());
        tracks
    }

    async fn artist_by_id(&self, artist_id: &str) -> Option<MediaArtist> {
        let (user_id, _) = self.connection_ids().await?;
        let item: Item = self
            .get_json(&format!("/Users/{}/Items/{}", user_id, artist_id), &[])
            .await?;
        Some(item.into_artist(&self.base_url))
    }

    async fn album_by_id(&self, album_id: &str) -> Option<MediaAlbum> {
        let (user_id, _) = self.connection_ids().await?;
        let item: Item = self
            .get_json(&format!("/Users/{}/Items/{}", user_id, album_id), &[])
            .await?;
        Some(item.into_album())
    }

    async fn track_by_id(&self, track_id: &str) -> Option<MediaTrack> {
        // Cache first: the bulk sweep usually has it.
        {
            let cache = self.track_cache.lock().unwrap();
            for tracks in cache.values() {
                if let Some(track) = tracks.iter().find(|t| t.id == track_id) {
                    return Some(track.clone());
                }
            }
        }

        let (user_id, _) = self.connection_ids().await?;
        let item: Item = self
            .get_json(&format!("/Users/{}/Items/{}", user_id, track_id), &[])
            .await?;
        Some(item.into_track())
    }

    async fn recently_added_albums(&self, max_results: usize) -> Vec<MediaAlbum> {
        let Some((user_id, library_id)) = self.connection_ids().await else {
            return Vec::new();
        };
        let params = [
            ("ParentId", library_id),
            ("IncludeItemTypes", "MusicAlbum".to_string()),
            ("Recursive", "true".to_string()),
            ("Fields", "AlbumArtists,Artists,Genres,ChildCount".to_string()),
            ("SortBy", "DateCreated".to_string()),
            ("SortOrder", "Descending".to_string()),
            ("Limit", max_results.to_string()),
        ];
        self.items_page(&user_id, &params)
            .await
            .map(|page| page.items.into_iter().map(Item::into_album).collect())
            .unwrap_or_default()
    }

    async fn recently_updated_albums(&self, max_results: usize) -> Vec<MediaAlbum> {
        let Some((user_id, library_id)) = self.connection_ids().await else {
            return Vec::new();
        };
        let params = [
            ("ParentId", library_id),
            ("IncludeItemTypes", "MusicAlbum".to_string()),
            ("Recursive", "true".to_string()),
            ("Fields", "AlbumArtists,Artists,Genres,ChildCount".to_string()),
            ("SortBy", "DateLastSaved".to_string()),
            ("SortOrder", "Descending".to_string()),
            ("Limit", max_results.to_string()),
        ];
        self.items_page(&user_id, &params)
            .await
            .map(|page| page.items.into_iter().map(Item::into_album).collect())
            .unwrap_or_default()
    }

    async fn recently_added_tracks(&self, max_results: usize) -> Vec<MediaTrack> {
        let Some((user_id, library_id)) = self.connection_ids().await else {
            return Vec::new();
        };
        let params = [
            ("ParentId", library_id),
            ("IncludeItemTypes", "Audio".to_string()),
            ("Recursive", "true".to_string()),
            ("Fields", "AlbumId,ArtistItems,Path".to_string()),
            ("SortBy", "DateCreated".to_string()),
            ("SortOrder", "Descending".to_string()),
            ("Limit", max_results.to_string()),
        ];
        self.items_page(&user_id, &params)
            .await
            .map(|page| page.items.into_iter().map(Item::into_track).collect())
            .unwrap_or_default()
    }

    async fn recently_updated_tracks(&self, max_results: usize) -> Vec<MediaTrack> {
        let Some((user_id, library_id)) = self.connection_ids().await else {
            return Vec::new();
        };
        let params = [
            ("ParentId", library_id),
            ("IncludeItemTypes", "Audio".to_string()),
            ("Recursive", "true".to_string()),
            ("Fields", "AlbumId,ArtistItems,Path".to_string()),
            ("SortBy", "DateLastSaved".to_string()),
            ("SortOrder", "Descending".to_string()),
            ("Limit", max_results.to_string()),
        ];
        self.items_page(&user_id, &params)
            .await
            .map(|page| page.items.into_iter().map(Item::into_track).collect())
            .unwrap_or_default()
    }

    async fn library_stats(&self) -> LibraryStats {
        let Some((user_id, library_id)) = self.connection_ids().await else {
            return LibraryStats::default();
        };

        let mut stats = LibraryStats::default();
        for (item_type, slot) in [
            ("MusicArtist", 0usize),
            ("MusicAlbum", 1),
            ("Audio", 2),
        ] {
            let params = [
                ("ParentId", library_id.clone()),
                ("IncludeItemTypes", item_type.to_string()),
                ("Recursive", "true".to_string()),
                ("Limit", "1".to_string()),
            ];
            let count = self
                .items_page(&user_id, &params)
                .await
                .map(|page| page.total_record_count)
                .unwrap_or(0);
            match slot {
                0 => stats.artists = count,
                1 => stats.albums = count,
                _ => stats.tracks = count,
            }
        }
        stats
    }

    async fn playlists(&self) -> Vec<MediaPlaylist> {
        let Some((user_id, _)) = self.connection_ids().await else {
            return Vec::new();
        };
        let params = [
            ("IncludeItemTypes", "Playlist".to_string()),
            ("Recursive", "true".to_string()),
        ];
        let Some(page) = self.items_page(&user_id, &params).await else {
            return Vec::new();
        };

        page.items
            .into_iter()
            .map(|item| MediaPlaylist {
                track_count: item.child_count.unwrap_or(0),
                id: item.id,
                title: item.name,
            })
            .collect()
    }

    async fn playlist_by_name(&self, name: &str) -> Option<MediaPlaylist> {
        self.find_playlist(name).await
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Vec<MediaTrack> {
        let Some((user_id, _)) = self.connection_ids().await else {
            return Vec::new();
        };
        let params = [
            ("ParentId", playlist_id.to_string()),
            ("IncludeItemTypes", "Audio".to_string()),
            ("Recursive", "true".to_string()),
            ("Fields", "AlbumId,ArtistItems,Path".to_string()),
        ];
        self.items_page(&user_id, &params)
            .await
            .map(|page| page.items.into_iter().map(Item::into_track).collect())
            .unwrap_or_default()
    }

    async fn create_playlist(&self, name: &str, track_ids: &[String]) -> bool {
        let Some((user_id, _)) = self.connection_ids().await else {
            return false;
        };

        let (valid, invalid): (Vec<String>, Vec<String>) = track_ids
            .iter()
            .cloned()
            .partition(|id| is_valid_guid(id));

        if !invalid.is_empty() {
            warn!(
                "Found {} tracks with invalid ids for playlist '{}', skipping them",
                invalid.len(),
                name
            );
            for id in &invalid {
                debug!("Rejected invalid id: '{}'", id);
            }
        }
        if valid.is_empty() {
            warn!("No valid tracks provided for playlist '{}'", name);
            return false;
        }

        info!(
            "Creating playlist '{}' with {} valid track ids ({} filtered)",
            name,
            valid.len(),
            invalid.len()
        );
        self.create_playlist_batched(&user_id, name, &valid).await
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
            if self.delete_item(&existing.id).await {
                info!("Deleted existing playlist '{}'", name);
            } else {
                warn!("Could not delete existing playlist '{}', creating anyway", name);
            }
        }

        let success = self.create_playlist(name, track_ids).await;

        // The backup was only a safety net; drop it once the rewrite stuck.
        if success {
            if let Some(backup_name) = backup_name {
                if let Some(backup) = self.find_playlist(&backup_name).await {
                    if self.delete_item(&backup.id).await {
                        info!("Deleted backup playlist '{}'", backup_name);
                    } else {
                        warn!("Could not delete backup playlist '{}'", backup_name);
                    }
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
            self.delete_item(&target.id).await;
        }

        let ids: Vec<String> = tracks.into_iter().map(|t| t.id).collect();
        self.create_playlist(target_name, &ids).await
    }

    async fn trigger_library_scan(&self) -> bool {
        let Some((_, library_id)) = self.connection_ids().await else {
            return false;
        };

        let url = format!("{}/Items/{}/Refresh", self.base_url, library_id);
        let params = [
            ("Recursive", "true".to_string()),
            ("ImageRefreshMode", "ValidationOnly".to_string()),
            ("MetadataRefreshMode", "ValidationOnly".to_string()),
        ];
        match self
            .http
            .post(&url)
            .header("X-Emby-Token", &self.api_key)
            .query(&params)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!("Triggered library scan");
                true
            }
            Ok(response) => {
                warn!("Failed to trigger library scan: HTTP {}", response.status());
                false
            }
            Err(e) => {
                warn!("Failed to trigger library scan: {}", e);
                false
            }
        }
    }

    async fn is_library_scanning(&self) -> bool {
        if !self.ensure_connection().await {
            return false;
        }
        let Some(tasks) = self.get_json::<Vec<ScheduledTask>>("/ScheduledTasks", &[]).await
        else {
            return false;
        };

        tasks.iter().any(|task| {
            let name = task.name.to_lowercase();
            (name.contains("scan") || name.contains("refresh") || name.contains("library"))
                && matches!(task.state.as_str(), "Running" | "Cancelling")
        })
    }

    async fn update_artist_poster(&self, artist_id: &str, image_data: &[u8]) -> bool {
        if !self.ensure_connection().await {
            return false;
        }
        self.upload_image(artist_id, image_data).await
    }

    async fn update_album_poster(&self, album_id: &str, image_data: &[u8]) -> bool {
        if !self.ensure_connection().await {
            return false;
        }
        self.upload_image(album_id, image_data).await
    }

    async fn search_track_by_metadata(&self, title: &str, artist: &str) -> Option<MediaTrack> {
        let (user_id, library_id) = self.connection_ids().await?;
        let params = [
            ("ParentId", library_id),
            ("IncludeItemTypes", "Audio".to_string()),
            ("Recursive", "true".to_string()),
            ("Fields", "AlbumId,ArtistItems,Path".to_string()),
            ("SearchTerm", title.to_string()),
            ("Limit", "25".to_string()),
        ];
        let page = self.items_page(&user_id, &params).await?;

        let title_norm = normalize(title);
        let artist_norm = normalize(artist);

        for item in page.items {
            if normalize(&item.name) != title_norm {
                continue;
            }
            let artist_matches = item.artist_items.iter().any(|a| {
                let name = normalize(&a.name);
                name == artist_norm || name.contains(&artist_norm) || artist_norm.contains(&name)
            });
            if artist_matches {
                return Some(item.into_track());
            }
        }
        None
    }

    async fn track_by_filename(&self, filename: &str) -> Option<MediaTrack> {
        let (user_id, library_id) = self.connection_ids().await?;
        let stem = filename.rsplit_once('.').map(|(s, _)| s).unwrap_or(filename);
        let params = [
            ("ParentId", library_id),
            ("IncludeItemTypes", "Audio".to_string()),
            ("Recursive", "true".to_string()),
            ("Fields", "AlbumId,ArtistItems,Path".to_string()),
            ("SearchTerm", stem.to_string()),
            ("Limit", "10".to_string()),
        ];
        let page = self.items_page(&user_id, &params).await?;

        page.items
            .into_iter()
            .find(|item| {
                item.path
                    .as_deref()
                    .map(|p| p.ends_with(filename))
                    .unwrap_or(false)
            })
            .map(Item::into_track)
    }

    fn is_valid_item_id(&self, id: &str) -> bool {
        is_valid_guid(id)
    }

    fn set_metadata_only_mode(&self, enabled: bool) {
        self.metadata_only.store(enabled, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_duration_converts_ticks_to_ms() {
        let item: Item = serde_json::from_value(serde_json::json!({
            "Id": "abc",
            "Name": "Track",
            "RunTimeTicks": 2_400_000_000i64,
        }))
        .unwrap();
        assert_eq!(item.duration_ms(), Some(240_000));
    }

    #[test]
    fn items_page_parses_pascal_case() {
        let page: ItemsPage = serde_json::from_value(serde_json::json!({
            "Items": [{
                "Id": "t1",
                "Name": "Time",
                "AlbumId": "a1",
                "ArtistItems": [{"Id": "ar1", "Name": "Pink Floyd"}],
                "IndexNumber": 4,
                "Path": "/music/time.flac",
            }],
            "TotalRecordCount": 1,
        }))
        .unwrap();
        assert_eq!(page.total_record_count, 1);
        let track = page.items[0].clone().into_track();
        assert_eq!(track.id, "t1");
        assert_eq!(track.album_id.as_deref(), Some("a1"));
        assert_eq!(track.artist_id.as_deref(), Some("ar1"));
        assert_eq!(track.track_number, Some(4));
        assert_eq!(track.file_path.as_deref(), Some("/music/time.flac"));
    }
}
