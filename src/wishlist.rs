// Wishlist service: the durable record of tracks a sync could not fulfill,
// deduplicated by business key so the same song never queues twice.

use tracing::warn;

use crate::db::{Database, SourceType, WishlistEntry};
use crate::models::ProviderTrack;

#[derive(Clone)]
pub struct WishlistService {
    db: Database,
}

impl WishlistService {
    pub fn new(db: Database) -> Self {
        WishlistService { db }
    }

    /// Record a provider track that could not be fulfilled. Returns false
    /// when an entry with the same (name, primary artist) already exists or
    /// the insert failed; the caller never treats that as fatal.
    pub async fn add_provider_track(
        &self,
        track: &ProviderTrack,
        failure_reason: &str,
        source_type: SourceType,
        source_info: &serde_json::Value,
    ) -> bool {
        let payload = match serde_json::to_value(track) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize track '{}' for wishlist: {}", track.name, e);
                return false;
            }
        };

        match self
            .db
            .add_to_wishlist(&payload, failure_reason, source_type, source_info)
            .await
        {
            Ok(added) => added,
            Err(e) => {
                warn!("Failed to add '{}' to wishlist: {}", track.name, e);
                false
            }
        }
    }

    /// Remove an entry after a successful re-download.
    pub async fn mark_fulfilled(&self, external_track_id: &str) -> bool {
        self.db
            .remove_from_wishlist(external_track_id)
            .await
            .unwrap_or(false)
    }

    /// Record the outcome of a retry attempt.
    pub async fn record_retry(
        &self,
        external_track_id: &str,
        success: bool,
        error_message: Option<&str>,
    ) -> bool {
        self.db
            .update_wishlist_retry(external_track_id, success, error_message)
            .await
            .unwrap_or(false)
    }

    /// Entries oldest-first, optionally limited.
    pub async fn tracks(&self, limit: Option<i64>) -> Vec<WishlistEntry> {
        self.db.get_wishlist_tracks(limit).await.unwrap_or_default()
    }

    pub async fn count(&self) -> i64 {
        self.db.wishlist_count().await.unwrap_or(0)
    }

    /// Sweep duplicates, keeping the oldest entry per (name, artist).
    pub async fn dedupe(&self) -> usize {
        self.db.remove_wishlist_duplicates().await.unwrap_or(0)
    }
}
