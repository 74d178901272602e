use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::db::Database;
use crate::matching::normalize::sanitize_for_filename;
use crate::media_server::{MediaServerClient, MediaTrack};
use crate::models::ProviderTrack;

/// Extensions the filesystem tier accepts as audio.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "wav", "opus", "ogg"];
const CATALOG_CONFIDENCE_THRESHOLD: f64 = 0.7;
const FILE_MATCH_CONFIDENCE: f64 = 0.95;

/// Outcome of resolving one provider track against the local system.
///
/// Filesystem hits are placeholders: they carry a synthetic id and the
/// found path, suppress re-downloads, and are filtered out of playlist
/// writes until the server scans them in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
    pub id: String,
    pub title: String,
    pub confidence: f64,
    pub is_file_match: bool,
    pub file_path: Option<String>,
}

impl ResolvedTrack {
    fn from_media_track(track: MediaTrack, confidence: f64) -> ResolvedTrack {
        ResolvedTrack {
            id: track.id,
            title: track.title,
            confidence,
            is_file_match: false,
            file_path: track.file_path,
        }
    }
}

/// The three-tier track existence resolver.
///
/// 1. Direct metadata search on the media server, when supported.
/// 2. Filesystem probe of the transfer directory, for files downloaded but
///    not yet scanned in.
/// 3. Fuzzy catalog lookup at a 0.7 confidence threshold.
///
/// Returns the resolution and its confidence, or `(None, 0.0)` when every
/// tier misses.
pub async fn resolve_track(
    track: &ProviderTrack,
    server: &Arc<dyn MediaServerClient>,
    db: &Database,
    transfer_path: &Path,
    cancelled: &AtomicBool,
) -> (Option<ResolvedTrack>, f64) {
    // Tier 1: the server itself. Catches tracks the catalog has not
    // mirrored yet.
    for artist in &track.artists {
        if cancelled.load(Ordering::Relaxed) {
            return (None, 0.0);
        }
        if let Some(found) = server
            .search_track_by_metadata(&track.name, &artist.name)
            .await
        {
            info!("Found track on server: {} by {}", track.name, artist.name);
            return (Some(ResolvedTrack::from_media_track(found, 1.0)), 1.0);
        }
    }

    // Tier 2: the transfer directory. Downloaded but not yet scanned.
    if let Some(path) = check_filesystem(track, transfer_path).await {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if let Some(found) = server.track_by_filename(&filename).await {
            info!("Resolved file '{}' to server id {}", filename, found.id);
            return (
                Some(ResolvedTrack::from_media_track(found, FILE_MATCH_CONFIDENCE)),
                FILE_MATCH_CONFIDENCE,
            );
        }

        info!("Found track on filesystem: {} (no server id yet)", filename);
        let placeholder = ResolvedTrack {
            id: synthetic_file_id(&path),
            title: track.name.clone(),
            confidence: FILE_MATCH_CONFIDENCE,
            is_file_match: true,
            file_path: Some(path.to_string_lossy().to_string()),
        };
        return (Some(placeholder), FILE_MATCH_CONFIDENCE);
    }

    // Tier 3: the catalog.
    for artist in &track.artists {
        if cancelled.load(Ordering::Relaxed) {
            return (None, 0.0);
        }

        match db
            .check_track_exists(
                &track.name,
                &artist.name,
                CATALOG_CONFIDENCE_THRESHOLD,
                Some(server.source()),
            )
            .await
        {
            Ok((Some(found), confidence)) => {
                debug!(
                    "Catalog match for '{}' by '{}': '{}' (confidence {:.2})",
                    track.name, artist.name, found.track.title, confidence
                );
                let resolved = ResolvedTrack {
                    id: found.track.id,
                    title: found.track.title,
                    confidence,
                    is_file_match: false,
                    file_path: found.track.file_path,
                };
                return (Some(resolved), confidence);
            }
            Ok((None, _)) => {}
            Err(e) => {
                error!(
                    "Error checking catalog for '{}' by '{}': {}",
                    track.name, artist.name, e
                );
            }
        }
    }

    debug!("No match found (server, file or catalog) for '{}'", track.name);
    (None, 0.0)
}

/// Walk the transfer directory for a file whose name contains the track
/// title. Per-artist subfolders are probed first to keep the walk short.
async fn check_filesystem(track: &ProviderTrack, transfer_path: &Path) -> Option<PathBuf> {
    let safe_title = sanitize_for_filename(&track.name);
    // Too-short needles make fuzzy filename matching dangerous.
    if safe_title.trim().len() < 3 {
        return None;
    }

    let transfer_path = transfer_path.to_path_buf();
    let artist_names: Vec<String> = track
        .artists
        .iter()
        .map(|a| sanitize_for_filename(&a.name).trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();

    tokio::task::spawn_blocking(move || find_in_transfer_dir(&transfer_path, &safe_title, &artist_names))
        .await
        .ok()
        .flatten()
}

fn find_in_transfer_dir(
    transfer_path: &Path,
    safe_title: &str,
    artist_names: &[String],
) -> Option<PathBuf> {
    if !transfer_path.exists() {
        return None;
    }

    let mut search_roots: Vec<PathBuf> = Vec::new();
    if let Ok(entries) = std::fs::read_dir(transfer_path) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let dir_name = sanitize_for_filename(&entry.file_name().to_string_lossy());
            if artist_names.iter().any(|artist| dir_name.contains(artist.as_str())) {
                search_roots.push(path);
            }
        }
    }
    if search_roots.is_empty() {
        search_roots.push(transfer_path.to_path_buf());
    }

    for root in &search_roots {
        if let Some(found) = walk_for_title(root, safe_title) {
            return Some(found);
        }
    }
    None
}

fn walk_for_title(dir: &Path, safe_title: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = walk_for_title(&path, safe_title) {
                return Some(found);
            }
            continue;
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !AUDIO_EXTENSIONS.contains(&extension.as_str()) {
            continue;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if file_name.contains(safe_title) {
            return Some(path);
        }
    }
    None
}

/// Synthetic id for a filesystem placeholder. Never a valid server item
/// id, so playlist writes drop it.
fn synthetic_file_id(path: &Path) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    format!("fs_{:x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_ids_are_stable_and_marked() {
        let path = Path::new("/transfer/Artist/track.flac");
        let id = synthetic_file_id(path);
        assert!(id.starts_with("fs_"));
        assert_eq!(id, synthetic_file_id(path));
    }

    #[test]
    fn walk_finds_title_in_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("Pink Floyd").join("Animals");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("03 - dogs.flac"), b"x").unwrap();
        std::fs::write(nested.join("cover.jpg"), b"x").unwrap();

        let found = find_in_transfer_dir(dir.path(), "dogs", &["pink floyd".to_string()]);
        assert!(found.is_some());
        assert!(found.unwrap().ends_with("03 - dogs.flac"));
    }

    #[test]
    fn walk_ignores_non_audio_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dogs.txt"), b"x").unwrap();
        assert!(find_in_transfer_dir(dir.path(), "dogs", &[]).is_none());
    }
}
