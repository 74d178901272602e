use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use super::resolver::{resolve_track, ResolvedTrack};
use crate::db::{Database, SourceType};
use crate::matching::generate_download_query;
use crate::media_server::MediaServerClient;
use crate::models::{ProviderPlaylist, ProviderTrack, SyncProgress, SyncResult};
use crate::soulseek::SoulseekClient;
use crate::wishlist::WishlistService;

const TOTAL_STEPS: u32 = 5;
const INTER_ENQUEUE_PAUSE: Duration = Duration::from_secs(1);

pub type ProgressCallback = Arc<dyn Fn(SyncProgress) + Send + Sync>;

/// The playlist sync orchestrator.
///
/// Multiple playlists may sync concurrently on independent tasks; syncing
/// the same playlist twice at once is rejected immediately. Each running
/// sync owns a cancellation flag checked at every coarse step and every
/// per-track boundary.
pub struct SyncService {
    db: Database,
    server: Arc<dyn MediaServerClient>,
    soulseek: Arc<SoulseekClient>,
    wishlist: WishlistService,
    transfer_path: PathBuf,
    /// Playlists currently syncing, each with its cancellation flag.
    syncing: Mutex<HashMap<String, Arc<AtomicBool>>>,
    progress_callbacks: Mutex<HashMap<String, ProgressCallback>>,
}

impl SyncService {
    pub fn new(
        db: Database,
        server: Arc<dyn MediaServerClient>,
        soulseek: Arc<SoulseekClient>,
        transfer_path: PathBuf,
    ) -> Self {
        let wishlist = WishlistService::new(db.clone());
        SyncService {
            db,
            server,
            soulseek,
            wishlist,
            transfer_path,
            syncing: Mutex::new(HashMap::new()),
            progress_callbacks: Mutex::new(HashMap::new()),
        }
    }

    /// Whether any playlist is currently syncing.
    pub fn is_syncing(&self) -> bool {
        !self.syncing.lock().unwrap().is_empty()
    }

    pub fn is_playlist_syncing(&self, playlist_name: &str) -> bool {
        self.syncing.lock().unwrap().contains_key(playlist_name)
    }

    /// Register a progress callback scoped to one playlist.
    pub fn set_progress_callback(&self, playlist_name: &str, callback: ProgressCallback) {
        self.progress_callbacks
            .lock()
            .unwrap()
            .insert(playlist_name.to_string(), callback);
    }

    pub fn clear_progress_callback(&self, playlist_name: &str) {
        self.progress_callbacks.lock().unwrap().remove(playlist_name);
    }

    /// Request cancellation of a running sync. The sync observes the flag
    /// at its next step or per-track boundary and returns a cancelled
    /// result; any search it is polling stops within one poll tick.
    pub fn cancel_sync(&self, playlist_name: &str) {
        if let Some(flag) = self.syncing.lock().unwrap().get(playlist_name) {
            info!("Cancellation requested for playlist sync: {}", playlist_name);
            flag.store(true, Ordering::Relaxed);
        }
    }

    /// Sync one playlist: match every track, optionally download the
    /// misses, mirror the matches to the server, and wishlist the rest.
    pub async fn sync_playlist(
        &self,
        playlist: &ProviderPlaylist,
        download_missing: bool,
    ) -> SyncResult {
        let cancel_flag = {
            let mut syncing = self.syncing.lock().unwrap();
            if syncing.contains_key(&playlist.name) {
                warn!("Sync already in progress for playlist: {}", playlist.name);
                return SyncResult::error(
                    &playlist.name,
                    vec![format!(
                        "Sync already in progress for playlist: {}",
                        playlist.name
                    )],
                );
            }
            let flag = Arc::new(AtomicBool::new(false));
            syncing.insert(playlist.name.clone(), flag.clone());
            flag
        };

        let result = self.run_sync(playlist, download_missing, &cancel_flag).await;

        self.syncing.lock().unwrap().remove(&playlist.name);
        self.clear_progress_callback(&playlist.name);
        result
    }

    /// Sync several playlists sequentially, pausing briefly between them.
    pub async fn sync_multiple_playlists(
        &self,
        playlists: &[ProviderPlaylist],
        download_missing: bool,
    ) -> Vec<SyncResult> {
        let mut results = Vec::with_capacity(playlists.len());
        for (index, playlist) in playlists.iter().enumerate() {
            info!(
                "Syncing playlist {}/{}: {}",
                index + 1,
                playlists.len(),
                playlist.name
            );
            results.push(self.sync_playlist(playlist, download_missing).await);
            if index + 1 < playlists.len() {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
        results
    }

    async fn run_sync(
        &self,
        playlist: &ProviderPlaylist,
        download_missing: bool,
        cancelled: &AtomicBool,
    ) -> SyncResult {
        info!("Starting sync for playlist: {}", playlist.name);
        let errors: Vec<String> = Vec::new();

        if cancelled.load(Ordering::Relaxed) {
            return cancelled_result(&playlist.name);
        }

        self.update_progress(&playlist.name, "Preparing playlist sync", "", 10.0, 1, 0, 0, 0);

        if playlist.tracks.is_empty() {
            return SyncResult::error(
                &playlist.name,
                vec![format!("Playlist '{}' has no tracks", playlist.name)],
            );
        }

        if cancelled.load(Ordering::Relaxed) {
            return cancelled_result(&playlist.name);
        }

        let total_tracks = playlist.tracks.len();
        self.update_progress(
            &playlist.name,
            "Matching tracks against library",
            "",
            20.0,
            2,
            total_tracks,
            0,
            0,
        );

        // Step 2: resolve every track, in playlist order.
        let mut resolutions: Vec<(usize, Option<ResolvedTrack>)> =
            Vec::with_capacity(total_tracks);
        for (index, track) in playlist.tracks.iter().enumerate() {
            if cancelled.load(Ordering::Relaxed) {
                return cancelled_result(&playlist.name);
            }

            let matched_so_far = resolutions.iter().filter(|(_, r)| r.is_some()).count();
            let failed_so_far = resolutions.len() - matched_so_far;
            let progress_percent = 20.0 + 40.0 * (index + 1) as f32 / total_tracks as f32;
            let current_track_name = match track.primary_artist() {
                Some(artist) => format!("{} - {}", artist, track.name),
                None => track.name.clone(),
            };
            self.update_progress(
                &playlist.name,
                "Matching tracks",
                &current_track_name,
                progress_percent,
                2,
                total_tracks,
                matched_so_far,
                failed_so_far,
            );

            let (resolved, _confidence) = resolve_track(
                track,
                &self.server,
                &self.db,
                &self.transfer_path,
                cancelled,
            )
            .await;
            resolutions.push((index, resolved));
        }

        let matched: Vec<&ResolvedTrack> = resolutions
            .iter()
            .filter_map(|(_, r)| r.as_ref())
            .collect();
        let unmatched: Vec<&ProviderTrack> = resolutions
            .iter()
            .filter(|(_, r)| r.is_none())
            .map(|(index, _)| &playlist.tracks[*index])
            .collect();

        info!(
            "Found {} matches out of {} tracks",
            matched.len(),
            total_tracks
        );

        if cancelled.load(Ordering::Relaxed) {
            return cancelled_result(&playlist.name);
        }

        self.update_progress(
            &playlist.name,
            "Matching completed",
            "",
            60.0,
            3,
            total_tracks,
            matched.len(),
            unmatched.len(),
        );

        // Step 3: queue downloads for the misses, serialized with a pause
        // so the daemon is never hammered.
        let mut downloaded_tracks = 0usize;
        if download_missing && !unmatched.is_empty() {
            if cancelled.load(Ordering::Relaxed) {
                return cancelled_result(&playlist.name);
            }
            self.update_progress(
                &playlist.name,
                "Downloading missing tracks",
                "",
                70.0,
                4,
                total_tracks,
                matched.len(),
                unmatched.len(),
            );

            let profile = self.db.get_quality_profile().await;
            for track in &unmatched {
                if cancelled.load(Ordering::Relaxed) {
                    return cancelled_result(&playlist.name);
                }

                let query = generate_download_query(track);
                info!("Attempting to download: {}", query);
                match self
                    .soulseek
                    .search_and_download_best(&query, &profile, Some(cancelled))
                    .await
                {
                    Some(_download_id) => {
                        downloaded_tracks += 1;
                        info!("Download started for: {}", track.name);
                    }
                    None => {
                        warn!("No download sources found for: {}", track.name);
                    }
                }

                tokio::time::sleep(INTER_ENQUEUE_PAUSE).await;
            }
        }

        if cancelled.load(Ordering::Relaxed) {
            return cancelled_result(&playlist.name);
        }

        // Step 4: mirror the matches. Filesystem placeholders and ids the
        // backend rejects stay out of the write.
        self.update_progress(
            &playlist.name,
            "Creating/updating playlist",
            "",
            80.0,
            4,
            total_tracks,
            matched.len(),
            unmatched.len(),
        );

        let valid_ids: Vec<String> = matched
            .iter()
            .filter(|r| !r.is_file_match && self.server.is_valid_item_id(&r.id))
            .map(|r| r.id.clone())
            .collect();
        info!(
            "Playlist validation: {}/{} matched tracks are valid server items",
            valid_ids.len(),
            matched.len()
        );

        let sync_success = if valid_ids.is_empty() {
            warn!("No valid tracks to write for playlist '{}'", playlist.name);
            false
        } else {
            self.server.update_playlist(&playlist.name, &valid_ids).await
        };

        let synced_tracks = if sync_success { valid_ids.len() } else { 0 };
        let failed_tracks = total_tracks
            .saturating_sub(synced_tracks)
            .saturating_sub(downloaded_tracks);

        self.update_progress(
            &playlist.name,
            "Sync completed",
            "",
            100.0,
            5,
            total_tracks,
            matched.len(),
            failed_tracks,
        );

        // Step 5: everything still missing goes to the wishlist for later
        // retry.
        let mut wishlist_added = 0usize;
        if !unmatched.is_empty() {
            info!(
                "Auto-adding {} unmatched tracks to wishlist",
                unmatched.len()
            );
            let source_info = serde_json::json!({
                "playlist_name": playlist.name,
                "playlist_id": playlist.id,
                "sync_type": "automatic_sync",
                "timestamp": Utc::now().to_rfc3339(),
            });

            for track in &unmatched {
                if self
                    .wishlist
                    .add_provider_track(
                        track,
                        "Missing from media server after sync",
                        SourceType::Playlist,
                        &source_info,
                    )
                    .await
                {
                    wishlist_added += 1;
                }
            }
            info!(
                "Added {}/{} tracks to wishlist",
                wishlist_added,
                unmatched.len()
            );
        }

        let result = SyncResult {
            playlist_name: playlist.name.clone(),
            total_tracks,
            matched_tracks: matched.len(),
            synced_tracks,
            downloaded_tracks,
            failed_tracks,
            wishlist_added,
            sync_time: Utc::now(),
            errors,
        };
        info!("Sync completed: {:.1}% success rate", result.success_rate());
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn update_progress(
        &self,
        playlist_name: &str,
        step: &str,
        track: &str,
        progress: f32,
        step_number: u32,
        total_tracks: usize,
        matched_tracks: usize,
        failed_tracks: usize,
    ) {
        let callback = self
            .progress_callbacks
            .lock()
            .unwrap()
            .get(playlist_name)
            .cloned();
        if let Some(callback) = callback {
            callback(SyncProgress {
                current_step: step.to_string(),
                current_track: track.to_string(),
                progress,
                total_steps: TOTAL_STEPS,
                current_step_number: step_number,
                total_tracks,
                matched_tracks,
                failed_tracks,
            });
        }
    }
}

fn cancelled_result(playlist_name: &str) -> SyncResult {
    SyncResult::error(playlist_name, vec!["Sync cancelled".to_string()])
}
