use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

/// File extensions treated as audio when processing search responses.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "aac", "wma", "wav", "m4a"];

/// Audio format of a search result, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioQuality {
    Flac,
    Mp3,
    Ogg,
    Aac,
    Wma,
    Unknown,
}

impl AudioQuality {
    pub fn from_extension(ext: &str) -> AudioQuality {
        match ext.to_lowercase().as_str() {
            "flac" => AudioQuality::Flac,
            "mp3" => AudioQuality::Mp3,
            "ogg" => AudioQuality::Ogg,
            "aac" => AudioQuality::Aac,
            "wma" => AudioQuality::Wma,
            _ => AudioQuality::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioQuality::Flac => "flac",
            AudioQuality::Mp3 => "mp3",
            AudioQuality::Ogg => "ogg",
            AudioQuality::Aac => "aac",
            AudioQuality::Wma => "wma",
            AudioQuality::Unknown => "unknown",
        }
    }

    fn base_weight(&self) -> f64 {
        match self {
            AudioQuality::Flac => 1.0,
            AudioQuality::Mp3 => 0.8,
            AudioQuality::Ogg => 0.7,
            AudioQuality::Aac => 0.6,
            AudioQuality::Wma => 0.5,
            AudioQuality::Unknown => 0.3,
        }
    }
}

/// One peer's response to a search, as returned by the daemon.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub files: Vec<SearchFile>,
    #[serde(default)]
    pub free_upload_slots: u32,
    #[serde(default)]
    pub upload_speed: u64,
    #[serde(default)]
    pub queue_length: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFile {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub bit_rate: Option<u32>,
    /// Duration in seconds; converted to milliseconds on our side.
    #[serde(default)]
    pub length: Option<u64>,
}

/// An individual track offered by a peer.
#[derive(Debug, Clone)]
pub struct TrackResult {
    pub username: String,
    pub filename: String,
    pub size: u64,
    pub bitrate: Option<u32>,
    pub duration_ms: Option<u64>,
    pub quality: AudioQuality,
    pub free_upload_slots: u32,
    pub upload_speed: u64,
    pub queue_length: u32,
    /// Metadata extracted from the filename; peers rarely send tags.
    pub artist: Option<String>,
    pub title: String,
    pub album: Option<String>,
    pub track_number: Option<u32>,
}

impl TrackResult {
    /// Composite desirability score in `[0, 1]`: format weight adjusted by
    /// bitrate and peer statistics.
    pub fn quality_score(&self) -> f64 {
        let mut score = self.quality.base_weight();

        if let Some(bitrate) = self.bitrate {
            if bitrate >= 320 {
                score += 0.2;
            } else if bitrate >= 256 {
                score += 0.1;
            } else if bitrate < 128 {
                score -= 0.2;
            }
        }

        score += peer_adjustment(self.free_upload_slots, self.upload_speed, self.queue_length);
        score.min(1.0)
    }

    pub fn size_mb(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0)
    }
}

/// A directory of tracks from one peer, grouped into an album offer.
/// Constructed only when at least two tracks share a directory.
#[derive(Debug, Clone)]
pub struct AlbumResult {
    pub username: String,
    pub album_path: String,
    pub album_title: String,
    pub artist: Option<String>,
    pub track_count: usize,
    pub total_size: u64,
    pub tracks: Vec<TrackResult>,
    pub dominant_quality: AudioQuality,
    pub year: Option<String>,
    pub free_upload_slots: u32,
    pub upload_speed: u64,
    pub queue_length: u32,
}

impl AlbumResult {
    pub fn quality_score(&self) -> f64 {
        let mut score = self.dominant_quality.base_weight();

        // Complete albums usually run 8-20 tracks.
        if (8..=20).contains(&self.track_count) {
            score += 0.1;
        } else if self.track_count > 20 {
            score += 0.05;
        }

        score += peer_adjustment(self.free_upload_slots, self.upload_speed, self.queue_length);
        score.min(1.0)
    }

    pub fn size_mb(&self) -> u64 {
        self.total_size / (1024 * 1024)
    }

    pub fn average_track_size_mb(&self) -> f64 {
        if self.track_count == 0 {
            return 0.0;
        }
        self.size_mb() as f64 / self.track_count as f64
    }
}

fn peer_adjustment(free_upload_slots: u32, upload_speed: u64, queue_length: u32) -> f64 {
    let mut adjustment = 0.0;
    if free_upload_slots > 0 {
        adjustment += 0.1;
    }
    if upload_speed > 100 {
        adjustment += 0.05;
    }
    if queue_length > 10 {
        adjustment -= 0.1;
    }
    adjustment
}

/// State of one download as mirrored from the daemon.
#[derive(Debug, Clone)]
pub struct DownloadStatus {
    pub id: String,
    pub filename: String,
    pub username: String,
    pub state: String,
    pub progress: f64,
    pub size: u64,
    pub transferred: u64,
    pub speed: u64,
    pub time_remaining: Option<i64>,
}

// "01 - Artist - Title", "Artist - Title", "01 - Title"
static TRACK_NUM_ARTIST_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s*[-.]\s*(.+?)\s*[-–]\s*(.+)$").unwrap());
static ARTIST_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+?)\s*[-–]\s*(.+)$").unwrap());
static TRACK_NUM_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\s*[-.]\s*(.+)$").unwrap());

static LEADING_TRACK_NUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\s*[-.\s]+").unwrap());
static TRAILING_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[-(\[]?\d{4}[-)\]]?\s*$").unwrap());

/// Extract artist, title, album and track number from a shared file path.
///
/// Peers name files in a handful of conventions; the album is guessed from
/// the containing directory with leading track-number noise removed.
pub fn parse_filename_metadata(
    filename: &str,
) -> (Option<String>, String, Option<String>, Option<u32>) {
    let normalized = filename.replace('\\', "/");
    let base = normalized.rsplit('/').next().unwrap_or(&normalized);
    let stem = base.rsplit_once('.').map(|(s, _)| s).unwrap_or(base);

    let mut artist = None;
    let mut title = None;
    let mut track_number = None;

    if let Some(caps) = TRACK_NUM_ARTIST_TITLE.captures(stem) {
        track_number = caps[1].parse().ok();
        artist = Some(caps[2].trim().to_string());
        title = Some(caps[3].trim().to_string());
    } else if let Some(caps) = ARTIST_TITLE.captures(stem) {
        let head = caps[1].trim().to_string();
        let tail = caps[2].trim().to_string();
        if head.chars().all(|c| c.is_ascii_digit()) {
            track_number = head.parse().ok();
            title = Some(tail);
        } else {
            artist = Some(head);
            title = Some(tail);
        }
    } else if let Some(caps) = TRACK_NUM_TITLE.captures(stem) {
        track_number = caps[1].parse().ok();
        title = Some(caps[2].trim().to_string());
    }

    let title = title.unwrap_or_else(|| stem.to_string());

    // Album from the containing directory, skipping share-system folders.
    let mut album = None;
    let parts: Vec<&str> = normalized.split('/').collect();
    if parts.len() >= 2 {
        for part in parts[..parts.len() - 1].iter().rev() {
            if part.is_empty() || part.starts_with('@') {
                continue;
            }
            let cleaned = LEADING_TRACK_NUM.replace(part, "").trim().to_string();
            if cleaned.len() > 3 {
                album = Some(cleaned);
                break;
            }
        }
    }

    (artist, title, album, track_number)
}

/// Directory path a shared file lives in, or `None` for bare filenames and
/// share-system directories.
pub fn extract_album_path(filename: &str) -> Option<String> {
    if !filename.contains('/') && !filename.contains('\\') {
        return None;
    }

    let normalized = filename.replace('\\', "/");
    let parts: Vec<&str> = normalized.split('/').collect();
    if parts.len() < 2 {
        return None;
    }

    let album_dir = parts[parts.len() - 2];
    if album_dir.starts_with('@') || album_dir.len() < 2 {
        return None;
    }

    Some(parts[..parts.len() - 1].join("/"))
}

/// Album title from a directory path: last component minus leading track
/// numbers and trailing year decorations.
fn extract_album_title(album_path: &str) -> String {
    let album_dir = album_path.rsplit('/').next().unwrap_or(album_path);
    let cleaned = LEADING_TRACK_NUM.replace(album_dir, "");
    let cleaned = TRAILING_YEAR.replace(&cleaned, "");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        album_dir.to_string()
    } else {
        cleaned
    }
}

/// Album artist: the most common per-track artist, falling back to an
/// "Artist - Album" directory name.
fn determine_album_artist(tracks: &[TrackResult], album_path: &str) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for track in tracks {
        if let Some(artist) = &track.artist {
            *counts.entry(artist.as_str()).or_insert(0) += 1;
        }
    }
    if let Some((artist, _)) = counts.into_iter().max_by_key(|(_, n)| *n) {
        return Some(artist.to_string());
    }

    let album_dir = album_path.rsplit('/').next().unwrap_or(album_path);
    if let Some(caps) = ARTIST_TITLE.captures(album_dir) {
        let artist = caps[1].trim();
        if artist.len() > 1 {
            return Some(artist.to_string());
        }
    }
    None
}

/// Four-digit year in the path or title, validated to a plausible range.
fn extract_year(album_path: &str, album_title: &str) -> Option<String> {
    static YEAR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
        [
            r"\((\d{4})\)",
            r"\[(\d{4})\]",
            r"\s-(\d{4})$",
            r"\s(\d{4})\s",
            r"\s(\d{4})$",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    });

    let haystack = format!("{} {}", album_path, album_title);
    for pattern in YEAR_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(&haystack) {
            let year = &caps[1];
            if let Ok(y) = year.parse::<u32>() {
                if (1900..=2030).contains(&y) {
                    return Some(year.to_string());
                }
            }
        }
    }
    None
}

/// Process raw search responses into track and album results.
///
/// Non-audio files are dropped, durations converted to milliseconds, tracks
/// grouped by (peer, directory). Directories with two or more tracks become
/// album results and their tracks leave the flat track list.
pub fn process_search_responses(
    responses: &[SearchResponse],
) -> (Vec<TrackResult>, Vec<AlbumResult>) {
    let mut all_tracks: Vec<TrackResult> = Vec::new();
    let mut albums_by_path: HashMap<(String, String), Vec<usize>> = HashMap::new();

    for response in responses {
        for file in &response.files {
            let ext = file
                .filename
                .rsplit_once('.')
                .map(|(_, e)| e.to_lowercase())
                .unwrap_or_default();
            if !AUDIO_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }

            let (artist, title, album, track_number) = parse_filename_metadata(&file.filename);

            let track = TrackResult {
                username: response.username.clone(),
                filename: file.filename.clone(),
                size: file.size,
                bitrate: file.bit_rate,
                duration_ms: file.length.map(|secs| secs * 1000),
                quality: AudioQuality::from_extension(&ext),
                free_upload_slots: response.free_upload_slots,
                upload_speed: response.upload_speed,
                queue_length: response.queue_length,
                artist,
                title,
                album,
                track_number,
            };

            let index = all_tracks.len();
            all_tracks.push(track);

            if let Some(path) = extract_album_path(&file.filename) {
                albums_by_path
                    .entry((response.username.clone(), path))
                    .or_default()
                    .push(index);
            }
        }
    }

    let mut albums = Vec::new();
    let mut grouped: Vec<bool> = vec![false; all_tracks.len()];

    for ((username, album_path), indices) in albums_by_path {
        if indices.len() < 2 {
            continue;
        }

        let mut tracks: Vec<TrackResult> =
            indices.iter().map(|&i| all_tracks[i].clone()).collect();
        for &i in &indices {
            grouped[i] = true;
        }

        let total_size: u64 = tracks.iter().map(|t| t.size).sum();
        let mut quality_counts: HashMap<AudioQuality, usize> = HashMap::new();
        for track in &tracks {
            *quality_counts.entry(track.quality).or_insert(0) += 1;
        }
        let dominant_quality = quality_counts
            .into_iter()
            .max_by_key(|(_, n)| *n)
            .map(|(q, _)| q)
            .unwrap_or(AudioQuality::Unknown);

        let album_title = extract_album_title(&album_path);
        let artist = determine_album_artist(&tracks, &album_path);
        let year = extract_year(&album_path, &album_title);

        tracks.sort_by_key(|t| t.track_number.unwrap_or(0));
        // Peer metrics are identical across one user's tracks.
        let (free_upload_slots, upload_speed, queue_length) = (
            tracks[0].free_upload_slots,
            tracks[0].upload_speed,
            tracks[0].queue_length,
        );

        albums.push(AlbumResult {
            username,
            free_upload_slots,
            upload_speed,
            queue_length,
            track_count: tracks.len(),
            total_size,
            dominant_quality,
            album_path,
            album_title,
            artist,
            year,
            tracks,
        });
    }

    let individual_tracks = all_tracks
        .into_iter()
        .zip(grouped)
        .filter(|(_, g)| !g)
        .map(|(t, _)| t)
        .collect();

    (individual_tracks, albums)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(username: &str, files: Vec<SearchFile>) -> SearchResponse {
        SearchResponse {
            username: username.to_string(),
            files,
            free_upload_slots: 1,
            upload_speed: 500,
            queue_length: 0,
        }
    }

    fn file(name: &str, size: u64) -> SearchFile {
        SearchFile {
            filename: name.to_string(),
            size,
            bit_rate: None,
            length: Some(240),
        }
    }

    #[test]
    fn parses_num_artist_title_pattern() {
        let (artist, title, album, num) =
            parse_filename_metadata("music/Pink Floyd/Animals/03 - Pink Floyd - Dogs.flac");
        assert_eq!(artist.as_deref(), Some("Pink Floyd"));
        assert_eq!(title, "Dogs");
        assert_eq!(album.as_deref(), Some("Animals"));
        assert_eq!(num, Some(3));
    }

    #[test]
    fn parses_artist_title_pattern() {
        let (artist, title, _, num) = parse_filename_metadata("Queen - Bohemian Rhapsody.mp3");
        assert_eq!(artist.as_deref(), Some("Queen"));
        assert_eq!(title, "Bohemian Rhapsody");
        assert_eq!(num, None);
    }

    #[test]
    fn parses_num_title_pattern() {
        let (artist, title, _, num) = parse_filename_metadata("01 - Speak to Me.flac");
        assert_eq!(artist, None);
        assert_eq!(title, "Speak to Me");
        assert_eq!(num, Some(1));
    }

    #[test]
    fn falls_back_to_stem_as_title() {
        let (artist, title, _, num) = parse_filename_metadata("weirdname.ogg");
        assert_eq!(artist, None);
        assert_eq!(title, "weirdname");
        assert_eq!(num, None);
    }

    #[test]
    fn album_path_skips_share_system_dirs() {
        assert_eq!(
            extract_album_path("music/Artist/Album/01.mp3"),
            Some("music/Artist/Album".to_string())
        );
        assert_eq!(extract_album_path("@@shared/01.mp3"), None);
        assert_eq!(extract_album_path("bare.mp3"), None);
    }

    #[test]
    fn windows_separators_are_normalized() {
        assert_eq!(
            extract_album_path(r"music\ArtistA\Album1\01.flac"),
            Some("music/ArtistA/Album1".to_string())
        );
    }

    #[test]
    fn groups_directory_into_album_and_removes_loose_tracks() {
        let files: Vec<SearchFile> = (1..=8)
            .map(|i| file(&format!("music/ArtistA/Album1/0{i} - Song{i}.flac"), 30_000_000))
            .collect();
        let (tracks, albums) = process_search_responses(&[response("peer", files)]);

        assert_eq!(albums.len(), 1);
        let album = &albums[0];
        assert_eq!(album.track_count, 8);
        assert_eq!(album.dominant_quality, AudioQuality::Flac);
        assert_eq!(album.album_title, "Album1");
        assert!(tracks.is_empty(), "grouped tracks must leave the flat list");
    }

    #[test]
    fn single_file_directories_stay_individual() {
        let (tracks, albums) = process_search_responses(&[response(
            "peer",
            vec![file("music/ArtistA/Album1/01 - Only.flac", 30_000_000)],
        )]);
        assert!(albums.is_empty());
        assert_eq!(tracks.len(), 1);
    }

    #[test]
    fn non_audio_files_are_dropped() {
        let (tracks, albums) = process_search_responses(&[response(
            "peer",
            vec![
                file("music/Album/cover.jpg", 100_000),
                file("music/Album/notes.txt", 2_000),
            ],
        )]);
        assert!(tracks.is_empty());
        assert!(albums.is_empty());
    }

    #[test]
    fn duration_converts_seconds_to_ms() {
        let (tracks, _) = process_search_responses(&[response(
            "peer",
            vec![file("song.mp3", 5_000_000)],
        )]);
        assert_eq!(tracks[0].duration_ms, Some(240_000));
    }

    #[test]
    fn quality_score_rewards_flac_and_bitrate() {
        let mut track = TrackResult {
            username: "p".to_string(),
            filename: "a.flac".to_string(),
            size: 1,
            bitrate: None,
            duration_ms: None,
            quality: AudioQuality::Flac,
            free_upload_slots: 0,
            upload_speed: 0,
            queue_length: 0,
            artist: None,
            title: "a".to_string(),
            album: None,
            track_number: None,
        };
        assert!((track.quality_score() - 1.0).abs() < 1e-9);

        track.quality = AudioQuality::Mp3;
        track.bitrate = Some(320);
        assert!((track.quality_score() - 1.0).abs() < 1e-9);

        track.bitrate = Some(96);
        assert!((track.quality_score() - 0.6).abs() < 1e-9);

        track.queue_length = 11;
        assert!((track.quality_score() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn album_year_extracted_from_path() {
        let files: Vec<SearchFile> = (1..=2)
            .map(|i| file(&format!("music/Artist/Album (1977)/0{i} - S{i}.mp3"), 1))
            .collect();
        let (_, albums) = process_search_responses(&[response("peer", files)]);
        assert_eq!(albums[0].year.as_deref(), Some("1977"));
        assert_eq!(albums[0].album_title, "Album");
    }
}
