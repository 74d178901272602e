use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::results::{
    process_search_responses, AlbumResult, DownloadStatus, SearchResponse, TrackResult,
};
use crate::config::SoulseekSettings;
use crate::quality::{filter_by_quality, QualityProfile};

const RATE_LIMIT_MAX_SEARCHES: usize = 35;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(220);
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const EARLY_EXIT_RESPONSES: usize = 30;
const REQUEST_RETRY_ATTEMPTS: u32 = 3;
const REQUEST_RETRY_BASE: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const HISTORY_KEEP: usize = 50;
const HISTORY_TRIGGER: usize = 200;

/// The daemon tolerates exactly one in-flight request; every outbound call
/// in the process serializes through this lock, held across retries.
static API_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Callback receiving (cumulative tracks, cumulative albums, response
/// count) after each poll tick that produced new responses.
pub type SearchProgress = dyn Fn(&[TrackResult], &[AlbumResult], usize) + Send + Sync;

/// Sliding-window rate limiter over search start timestamps. A search
/// acquires a slot, waiting for the oldest timestamp to age out of the
/// window when the budget is spent.
pub struct SearchRateLimiter {
    timestamps: Mutex<Vec<Instant>>,
    max_searches: usize,
    window: Duration,
}

impl SearchRateLimiter {
    pub fn new(max_searches: usize, window: Duration) -> Self {
        SearchRateLimiter {
            timestamps: Mutex::new(Vec::new()),
            max_searches,
            window,
        }
    }

    /// Wait until a search may start, then record its start timestamp.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock().unwrap();
                let now = Instant::now();
                timestamps.retain(|t| now.duration_since(*t) < self.window);

                if timestamps.len() < self.max_searches {
                    timestamps.push(now);
                    None
                } else {
                    Some(self.window - now.duration_since(timestamps[0]))
                }
            };

            match wait {
                None => return,
                Some(wait) => {
                    info!(
                        "Search rate limit reached ({} per {:?}), waiting {:?}",
                        self.max_searches, self.window, wait
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// (searches in window, searches remaining).
    pub fn status(&self) -> (usize, usize) {
        let mut timestamps = self.timestamps.lock().unwrap();
        let now = Instant::now();
        timestamps.retain(|t| now.duration_since(*t) < self.window);
        let used = timestamps.len();
        (used, self.max_searches.saturating_sub(used))
    }
}

/// Adapter for the slskd transfer daemon.
pub struct SoulseekClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    download_path: PathBuf,
    search_timeout_secs: u64,
    search_timeout_buffer_secs: u64,
    rate_limiter: SearchRateLimiter,
    active_searches: Mutex<HashSet<String>>,
}

impl SoulseekClient {
    pub fn new(settings: &SoulseekSettings) -> Self {
        if settings.base_url.is_empty() {
            warn!("Transfer daemon URL not configured");
        } else {
            info!("Transfer daemon client configured at {}", settings.base_url);
        }

        SoulseekClient {
            http: reqwest::Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            download_path: settings.download_path.clone(),
            search_timeout_secs: settings.search_timeout_secs,
            search_timeout_buffer_secs: settings.search_timeout_buffer_secs,
            rate_limiter: SearchRateLimiter::new(RATE_LIMIT_MAX_SEARCHES, RATE_LIMIT_WINDOW),
            active_searches: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
    }

    /// (searches in window, searches remaining) for diagnostics.
    pub fn rate_limit_status(&self) -> (usize, usize) {
        self.rate_limiter.status()
    }

    /// Issue one request to the daemon under the process-wide lock.
    ///
    /// 429s retry with exponential backoff while the lock stays held.
    /// Expected 404s are debug-logged. Returns the parsed body, `Null` for
    /// success without content, `None` for any failure.
    async fn request(&self, method: Method, endpoint: &str, body: Option<&Value>) -> Option<Value> {
        if !self.is_configured() {
            error!("Transfer daemon client not configured");
            return None;
        }

        let url = format!("{}/api/v0/{}", self.base_url, endpoint);
        let _guard = API_LOCK.lock().await;

        for attempt in 1..=REQUEST_RETRY_ATTEMPTS {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .timeout(REQUEST_TIMEOUT);
            if !self.api_key.is_empty() {
                request = request.header("X-API-Key", &self.api_key);
            }
            if let Some(body) = body {
                debug!("JSON payload: {}", body);
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    error!("Error making daemon request to {}: {}", endpoint, e);
                    return None;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 {
                if attempt < REQUEST_RETRY_ATTEMPTS {
                    let delay = REQUEST_RETRY_BASE * 2u32.pow(attempt - 1);
                    warn!(
                        "HTTP 429 received, waiting {:?} before retry (attempt {}/{})",
                        delay, attempt, REQUEST_RETRY_ATTEMPTS
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                error!(
                    "HTTP 429 after {} retries for {} {}",
                    REQUEST_RETRY_ATTEMPTS, method, endpoint
                );
                return None;
            }

            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                if text.trim().is_empty() {
                    return Some(Value::Null);
                }
                return match serde_json::from_str(&text) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!("Malformed daemon response from {}: {}", endpoint, e);
                        Some(Value::Null)
                    }
                };
            }

            if status.as_u16() == 404 {
                debug!("Daemon request returned 404 (not found) for {}", url);
            } else {
                let detail = if text.trim().is_empty() {
                    "no error details provided"
                } else {
                    text.trim()
                };
                error!("Daemon request failed: HTTP {} - {}", status, detail);
            }
            return None;
        }

        None
    }

    /// Remove a search id from the active set; its poll loop terminates on
    /// the next tick and deletes the daemon-side search.
    pub fn cancel_search(&self, search_id: &str) {
        self.active_searches.lock().unwrap().remove(search_id);
    }

    /// Cancel every active search.
    pub fn cancel_all_searches(&self) {
        let mut active = self.active_searches.lock().unwrap();
        if !active.is_empty() {
            info!("Cancelling {} active searches", active.len());
            active.clear();
        }
    }

    /// Whether a search id is still being polled.
    pub fn is_search_active(&self, search_id: &str) -> bool {
        self.active_searches.lock().unwrap().contains(search_id)
    }

    /// Run a search and stream results as they arrive.
    ///
    /// Submits the search, then polls the responses endpoint every second
    /// for up to `timeout + buffer` seconds, processing only responses not
    /// seen before. `progress` observes the cumulative results after every
    /// productive tick. Stops early after 30 responses. A set cancellation
    /// flag (or a `cancel_search` call) stops polling within one tick and
    /// best-effort deletes the daemon-side search.
    pub async fn search(
        &self,
        query: &str,
        progress: Option<&SearchProgress>,
        cancelled: Option<&AtomicBool>,
    ) -> (Vec<TrackResult>, Vec<AlbumResult>) {
        if !self.is_configured() {
            error!("Transfer daemon client not configured");
            return (Vec::new(), Vec::new());
        }

        self.rate_limiter.acquire().await;

        let timeout = self.search_timeout_secs;
        info!("Starting search for: '{}' (daemon timeout: {}s)", query, timeout);

        let body = serde_json::json!({
            "searchText": query,
            "timeout": timeout * 1000,
            "filterResponses": true,
            "minimumResponseFileCount": 1,
            "minimumPeerUploadSpeed": 0,
        });

        let Some(response) = self.request(Method::POST, "searches", Some(&body)).await else {
            error!("No response from search submission");
            return (Vec::new(), Vec::new());
        };

        let search_id = match &response {
            Value::Object(map) => map.get("id").and_then(|v| v.as_str()).map(String::from),
            Value::Array(items) => items
                .first()
                .and_then(|v| v.get("id"))
                .and_then(|v| v.as_str())
                .map(String::from),
            _ => None,
        };
        let Some(search_id) = search_id else {
            error!("No search id returned from search submission");
            return (Vec::new(), Vec::new());
        };

        info!("Search initiated with id: {}", search_id);
        self.active_searches
            .lock()
            .unwrap()
            .insert(search_id.clone());

        let polling_timeout = timeout + self.search_timeout_buffer_secs;
        let max_polls = polling_timeout.max(1) as usize;
        debug!(
            "Polling for up to {}s (daemon timeout {}s + buffer {}s)",
            polling_timeout, timeout, self.search_timeout_buffer_secs
        );

        let mut seen_responses = 0usize;
        let mut all_tracks: Vec<TrackResult> = Vec::new();
        let mut all_albums: Vec<AlbumResult> = Vec::new();
        let mut was_cancelled = false;

        for poll in 0..max_polls {
            if cancelled.map(|flag| flag.load(Ordering::Relaxed)).unwrap_or(false) {
                info!("Search {} cancelled, stopping", search_id);
                was_cancelled = true;
                break;
            }
            if !self.is_search_active(&search_id) {
                info!("Search {} was cancelled externally, stopping", search_id);
                was_cancelled = true;
                break;
            }

            let responses_value = self
                .request(Method::GET, &format!("searches/{}/responses", search_id), None)
                .await;

            if let Some(Value::Array(items)) = responses_value {
                let total = items.len();
                if total > seen_responses {
                    let new_items = &items[seen_responses..];
                    let new_responses: Vec<SearchResponse> = new_items
                        .iter()
                        .filter_map(|v| serde_json::from_value(v.clone()).ok())
                        .collect();
                    seen_responses = total;

                    info!(
                        "Found {} new responses ({} total) at {}s",
                        new_items.len(),
                        total,
                        poll
                    );

                    let (new_tracks, new_albums) = process_search_responses(&new_responses);
                    all_tracks.extend(new_tracks);
                    all_albums.extend(new_albums);

                    // Best sources first for incremental consumers.
                    all_tracks.sort_by(|a, b| {
                        b.quality_score()
                            .partial_cmp(&a.quality_score())
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                    all_albums.sort_by(|a, b| {
                        b.quality_score()
                            .partial_cmp(&a.quality_score())
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });

                    if let Some(progress) = progress {
                        progress(&all_tracks, &all_albums, total);
                    }

                    debug!(
                        "Processed results: {} tracks, {} albums",
                        all_tracks.len(),
                        all_albums.len()
                    );

                    if total >= EARLY_EXIT_RESPONSES {
                        info!("Early termination: {} responses collected", total);
                        break;
                    }
                }
            }

            if poll + 1 < max_polls {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }

        self.cancel_search(&search_id);
        if was_cancelled {
            // Best-effort cleanup; the daemon may already have dropped it.
            self.request(Method::DELETE, &format!("searches/{}", search_id), None)
                .await;
            return (Vec::new(), Vec::new());
        }

        info!(
            "Search completed: {} tracks, {} albums for query '{}'",
            all_tracks.len(),
            all_albums.len(),
            query
        );
        (all_tracks, all_albums)
    }

    /// Enqueue a download with the daemon.
    ///
    /// The primary endpoint is tried first; on failure an ordered list of
    /// fallback endpoints is walked with both array and object payload
    /// shapes. Returns the daemon-assigned id, the filename as a fallback
    /// identifier, or `None` when everything failed.
    pub async fn download(
        &self,
        username: &str,
        filename: &str,
        file_size: u64,
    ) -> Option<String> {
        if !self.is_configured() {
            error!("Transfer daemon client not configured");
            return None;
        }

        debug!("Attempting to download {} from {} ({} bytes)", filename, username, file_size);

        let array_payload = serde_json::json!([{
            "filename": filename,
            "size": file_size,
            "path": self.download_path.to_string_lossy(),
        }]);
        let object_payload = serde_json::json!({
            "files": [{
                "filename": filename,
                "size": file_size,
            }]
        });

        let primary = format!("transfers/downloads/{}", username);
        let fallbacks = [
            format!("transfers/{}/enqueue", username),
            format!("users/{}/downloads", username),
            format!("users/{}/enqueue", username),
        ];

        if let Some(response) = self.request(Method::POST, &primary, Some(&array_payload)).await {
            info!("Started download: {} from {}", filename, username);
            return Some(extract_download_id(&response, filename));
        }

        debug!("Primary download endpoint failed, trying alternatives...");
        for endpoint in &fallbacks {
            if let Some(response) = self.request(Method::POST, endpoint, Some(&array_payload)).await {
                info!("Started download via {}: {} from {}", endpoint, filename, username);
                return Some(extract_download_id(&response, filename));
            }
        }

        debug!("Array payload failed everywhere, trying object payload");
        for endpoint in &fallbacks {
            if let Some(response) = self.request(Method::POST, endpoint, Some(&object_payload)).await {
                info!("Started download via {}: {} from {}", endpoint, filename, username);
                return Some(extract_download_id(&response, filename));
            }
        }

        error!("All download endpoints failed for {} from {}", filename, username);
        None
    }

    /// Search, filter through the quality profile, and enqueue the best
    /// candidate.
    pub async fn search_and_download_best(
        &self,
        query: &str,
        profile: &QualityProfile,
        cancelled: Option<&AtomicBool>,
    ) -> Option<String> {
        let (tracks, _albums) = self.search(query, None, cancelled).await;
        if tracks.is_empty() {
            warn!("No results found for: {}", query);
            return None;
        }

        let filtered = filter_by_quality(&tracks, profile);
        let Some(best) = filtered.first() else {
            warn!("No suitable quality results found for: {}", query);
            return None;
        };

        let mut quality_info = best.quality.as_str().to_uppercase();
        if let Some(bitrate) = best.bitrate {
            quality_info = format!("{} {}kbps", quality_info, bitrate);
        }
        info!(
            "Downloading: {} ({}) from {}",
            best.filename, quality_info, best.username
        );
        self.download(&best.username, &best.filename, best.size).await
    }

    pub async fn get_download_status(&self, download_id: &str) -> Option<DownloadStatus> {
        let response = self
            .request(Method::GET, &format!("transfers/downloads/{}", download_id), None)
            .await?;

        let data = match &response {
            Value::Object(_) => Some(&response),
            Value::Array(items) => items.first(),
            _ => None,
        }?;
        download_status_from_value(data, None)
    }

    /// All downloads, flattened from the daemon's user -> directories ->
    /// files nesting.
    pub async fn get_all_downloads(&self) -> Vec<DownloadStatus> {
        let Some(Value::Array(users)) =
            self.request(Method::GET, "transfers/downloads", None).await
        else {
            return Vec::new();
        };

        let mut downloads = Vec::new();
        for user in &users {
            let username = user.get("username").and_then(|v| v.as_str()).unwrap_or("");
            let Some(directories) = user.get("directories").and_then(|v| v.as_array()) else {
                continue;
            };
            for directory in directories {
                let Some(files) = directory.get("files").and_then(|v| v.as_array()) else {
                    continue;
                };
                for file in files {
                    if let Some(status) = download_status_from_value(file, Some(username)) {
                        downloads.push(status);
                    }
                }
            }
        }

        debug!("Parsed {} downloads from daemon response", downloads.len());
        downloads
    }

    /// Cancel (or remove) a download, finding the owning user when the
    /// caller does not know it. Endpoint shape varies between daemon
    /// versions, so known variants are tried in order.
    pub async fn cancel_download(
        &self,
        download_id: &str,
        username: Option<&str>,
        remove: bool,
    ) -> bool {
        let username = match username {
            Some(username) => Some(username.to_string()),
            None => {
                debug!("No username for download {}, looking it up", download_id);
                self.get_all_downloads()
                    .await
                    .into_iter()
                    .find(|d| d.id == download_id)
                    .map(|d| d.username)
            }
        };
        let Some(username) = username else {
            error!("Could not find username for download {}", download_id);
            return false;
        };

        let endpoints = [
            format!(
                "transfers/downloads/{}/{}?remove={}",
                username, download_id, remove
            ),
            format!("transfers/downloads/{}", download_id),
            format!("transfers/downloads/{}/{}", username, download_id),
        ];

        for (index, endpoint) in endpoints.iter().enumerate() {
            if self.request(Method::DELETE, endpoint, None).await.is_some() {
                info!("Cancelled download using endpoint format {}", index + 1);
                return true;
            }
        }

        error!("All cancel endpoint formats failed for download {}", download_id);
        false
    }

    /// Tell the daemon a download is finished (or abandoned) so it leaves
    /// the transfer list.
    pub async fn signal_download_completion(
        &self,
        download_id: &str,
        username: &str,
        remove: bool,
    ) -> bool {
        let endpoint = format!(
            "transfers/downloads/{}/{}?remove={}",
            username, download_id, remove
        );
        let success = self.request(Method::DELETE, &endpoint, None).await.is_some();
        if success {
            debug!("Signalled download completion: {}", download_id);
        } else {
            warn!("Failed to signal download completion: {}", download_id);
        }
        success
    }

    /// Drop every completed/cancelled/failed download from the daemon.
    pub async fn clear_all_completed_downloads(&self) -> bool {
        let success = self
            .request(Method::DELETE, "transfers/downloads/all/completed", None)
            .await
            .is_some();
        if success {
            info!("Cleared all completed downloads from daemon");
        }
        success
    }

    /// Full daemon-side search history, oldest first.
    pub async fn get_all_searches(&self) -> Vec<Value> {
        match self.request(Method::GET, "searches", None).await {
            Some(Value::Array(searches)) => searches,
            _ => Vec::new(),
        }
    }

    /// Delete one search from the daemon history. Failures are usually
    /// 404s for already-removed searches.
    pub async fn delete_search(&self, search_id: &str) -> bool {
        self.request(Method::DELETE, &format!("searches/{}", search_id), None)
            .await
            .is_some()
    }

    /// Keep a rolling search-history window: once the daemon holds more
    /// than the trigger count, delete oldest until only the keep count
    /// remains.
    pub async fn maintain_search_history(&self) -> bool {
        let searches = self.get_all_searches().await;
        if searches.len() <= HISTORY_TRIGGER {
            debug!(
                "Search count ({}) below trigger ({}), no maintenance needed",
                searches.len(),
                HISTORY_TRIGGER
            );
            return true;
        }

        let excess = searches.len() - HISTORY_KEEP;
        info!(
            "Search history exceeded: {} > {}. Deleting {} oldest (keeping {})",
            searches.len(),
            HISTORY_TRIGGER,
            excess,
            HISTORY_KEEP
        );

        let mut failed = 0usize;
        for search in searches.iter().take(excess) {
            match search.get("id").and_then(|v| v.as_str()) {
                Some(id) => {
                    if !self.delete_search(id).await {
                        failed += 1;
                    }
                }
                None => {
                    warn!("Search without id during maintenance, skipping");
                    failed += 1;
                }
            }
        }

        info!(
            "Search maintenance complete: {} deleted, {} failed",
            excess - failed,
            failed
        );
        failed == 0
    }

    /// Probe the daemon session endpoint.
    pub async fn check_connection(&self) -> bool {
        if !self.is_configured() {
            return false;
        }
        self.request(Method::GET, "session", None).await.is_some()
    }
}

fn extract_download_id(response: &Value, filename: &str) -> String {
    let id = match response {
        Value::Object(map) => map.get("id").and_then(|v| v.as_str()),
        Value::Array(items) => items
            .first()
            .and_then(|v| v.get("id"))
            .and_then(|v| v.as_str()),
        _ => None,
    };
    match id {
        Some(id) => id.to_string(),
        None => {
            debug!("No id in enqueue response, using filename as identifier");
            filename.to_string()
        }
    }
}

fn download_status_from_value(value: &Value, username: Option<&str>) -> Option<DownloadStatus> {
    let state = value
        .get("state")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let progress = if state.to_lowercase().starts_with("completed") {
        100.0
    } else {
        value
            .get("percentComplete")
            .or_else(|| value.get("progress"))
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    };

    Some(DownloadStatus {
        id: value.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        filename: value
            .get("filename")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        username: username
            .map(String::from)
            .or_else(|| {
                value
                    .get("username")
                    .and_then(|v| v.as_str())
                    .map(String::from)
            })
            .unwrap_or_default(),
        state,
        progress,
        size: value.get("size").and_then(|v| v.as_u64()).unwrap_or(0),
        transferred: value
            .get("bytesTransferred")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
        speed: value
            .get("averageSpeed")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
        time_remaining: value.get("timeRemaining").and_then(|v| v.as_i64()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_allows_burst_up_to_budget() {
        let limiter = SearchRateLimiter::new(35, Duration::from_secs(220));
        let start = Instant::now();
        for _ in 0..35 {
            limiter.acquire().await;
        }
        // With a paused clock, any sleep would have advanced virtual time.
        assert_eq!(Instant::now(), start);
        assert_eq!(limiter.status().1, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn thirty_sixth_search_waits_for_window() {
        let limiter = SearchRateLimiter::new(35, Duration::from_secs(220));
        for _ in 0..35 {
            limiter.acquire().await;
        }

        let start = Instant::now();
        limiter.acquire().await;
        let waited = Instant::now().duration_since(start);
        assert!(
            waited >= Duration::from_secs(1),
            "36th search should wait, waited {:?}",
            waited
        );
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_rather_than_resets() {
        let limiter = SearchRateLimiter::new(2, Duration::from_secs(10));
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(6)).await;
        limiter.acquire().await;

        // First slot ages out after 4 more seconds; the third acquire
        // should wait roughly that long, not a full window.
        let start = Instant::now();
        limiter.acquire().await;
        let waited = Instant::now().duration_since(start);
        assert!(waited >= Duration::from_secs(3), "waited {:?}", waited);
        assert!(waited <= Duration::from_secs(5), "waited {:?}", waited);
    }

    #[test]
    fn extract_download_id_prefers_daemon_id() {
        let response = serde_json::json!({"id": "dl-1"});
        assert_eq!(extract_download_id(&response, "file.flac"), "dl-1");

        let response = serde_json::json!([{"id": "dl-2"}]);
        assert_eq!(extract_download_id(&response, "file.flac"), "dl-2");

        let response = Value::Null;
        assert_eq!(extract_download_id(&response, "file.flac"), "file.flac");
    }

    #[test]
    fn download_status_flattening_marks_completed() {
        let file = serde_json::json!({
            "id": "dl-1",
            "filename": "music/track.flac",
            "state": "Completed, Succeeded",
            "size": 1000,
        });
        let status = download_status_from_value(&file, Some("peer")).unwrap();
        assert_eq!(status.username, "peer");
        assert!((status.progress - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cancel_search_empties_active_set() {
        let client = SoulseekClient::new(&SoulseekSettings::default());
        client.active_searches.lock().unwrap().insert("s1".to_string());
        assert!(client.is_search_active("s1"));
        client.cancel_search("s1");
        assert!(!client.is_search_active("s1"));
    }
}
