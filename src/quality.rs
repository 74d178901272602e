// Waterfall quality filter: bucket download candidates into quality tiers,
// enforce per-tier size bounds, walk enabled tiers by priority and return
// the first non-empty one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::soulseek::results::{AudioQuality, TrackResult};

pub const TIER_FLAC: &str = "flac";
pub const TIER_MP3_320: &str = "mp3_320";
pub const TIER_MP3_256: &str = "mp3_256";
pub const TIER_MP3_192: &str = "mp3_192";
pub const TIER_OTHER: &str = "other";

/// Per-tier settings inside a quality profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSettings {
    pub enabled: bool,
    #[serde(default)]
    pub min_mb: f64,
    #[serde(default = "default_max_mb")]
    pub max_mb: f64,
    pub priority: u32,
}

fn default_max_mb() -> f64 {
    999.0
}

/// The process-wide download quality preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityProfile {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub preset: String,
    pub qualities: HashMap<String, TierSettings>,
    #[serde(default = "default_fallback")]
    pub fallback_enabled: bool,
}

fn default_version() -> u32 {
    1
}

fn default_fallback() -> bool {
    true
}

impl QualityProfile {
    /// Lossless-only: FLAC or nothing.
    pub fn audiophile() -> QualityProfile {
        QualityProfile {
            version: 1,
            preset: "audiophile".to_string(),
            qualities: HashMap::from([
                (TIER_FLAC.to_string(), tier(true, 0.0, 200.0, 1)),
                (TIER_MP3_320.to_string(), tier(false, 0.0, 20.0, 2)),
                (TIER_MP3_256.to_string(), tier(false, 0.0, 15.0, 3)),
                (TIER_MP3_192.to_string(), tier(false, 0.0, 12.0, 4)),
            ]),
            fallback_enabled: false,
        }
    }

    /// FLAC preferred, high-bitrate MP3 accepted. The default.
    pub fn balanced() -> QualityProfile {
        QualityProfile {
            version: 1,
            preset: "balanced".to_string(),
            qualities: HashMap::from([
                (TIER_FLAC.to_string(), tier(true, 0.0, 150.0, 1)),
                (TIER_MP3_320.to_string(), tier(true, 0.0, 20.0, 2)),
                (TIER_MP3_256.to_string(), tier(true, 0.0, 15.0, 3)),
                (TIER_MP3_192.to_string(), tier(false, 0.0, 12.0, 4)),
            ]),
            fallback_enabled: true,
        }
    }

    /// Compact MP3 first.
    pub fn space_saver() -> QualityProfile {
        QualityProfile {
            version: 1,
            preset: "space_saver".to_string(),
            qualities: HashMap::from([
                (TIER_FLAC.to_string(), tier(false, 0.0, 150.0, 4)),
                (TIER_MP3_320.to_string(), tier(true, 0.0, 15.0, 1)),
                (TIER_MP3_256.to_string(), tier(true, 0.0, 12.0, 2)),
                (TIER_MP3_192.to_string(), tier(true, 0.0, 10.0, 3)),
            ]),
            fallback_enabled: true,
        }
    }

    pub fn preset(name: &str) -> QualityProfile {
        match name {
            "audiophile" => Self::audiophile(),
            "space_saver" => Self::space_saver(),
            _ => Self::balanced(),
        }
    }
}

fn tier(enabled: bool, min_mb: f64, max_mb: f64, priority: u32) -> TierSettings {
    TierSettings {
        enabled,
        min_mb,
        max_mb,
        priority,
    }
}

/// Quality tier a candidate belongs to. Low-bitrate MP3 and non-FLAC
/// lossy formats land in the catch-all tier, which only participates when
/// the profile configures it.
fn tier_for(candidate: &TrackResult) -> &'static str {
    match candidate.quality {
        AudioQuality::Flac => TIER_FLAC,
        AudioQuality::Mp3 => match candidate.bitrate.unwrap_or(0) {
            b if b >= 320 => TIER_MP3_320,
            b if b >= 256 => TIER_MP3_256,
            b if b >= 192 => TIER_MP3_192,
            _ => TIER_OTHER,
        },
        _ => TIER_OTHER,
    }
}

/// Filter candidates through the profile's priority waterfall.
///
/// Each candidate is bucketed into its tier only when its size satisfies
/// that tier's bounds. Enabled tiers are walked in ascending priority and
/// the first non-empty bucket is returned, sorted by quality score then
/// size. When every enabled tier is empty and fallback is on, all
/// candidates that passed any tier's size check are returned instead; with
/// fallback off the result is empty. Size bounds are never violated.
pub fn filter_by_quality(candidates: &[TrackResult], profile: &QualityProfile) -> Vec<TrackResult> {
    if candidates.is_empty() {
        return Vec::new();
    }

    debug!(
        "quality filter: profile '{}', {} candidates",
        if profile.preset.is_empty() { "custom" } else { &profile.preset },
        candidates.len()
    );

    let mut buckets: HashMap<&str, Vec<TrackResult>> = HashMap::new();
    let mut size_filtered_all: Vec<TrackResult> = Vec::new();

    for candidate in candidates {
        let tier_name = tier_for(candidate);
        let Some(settings) = profile.qualities.get(tier_name) else {
            continue;
        };

        let size_mb = candidate.size_mb();
        if size_mb < settings.min_mb || size_mb > settings.max_mb {
            debug!(
                "quality filter: {} candidate rejected, {:.1}MB outside {}-{}MB",
                tier_name, size_mb, settings.min_mb, settings.max_mb
            );
            continue;
        }

        if settings.enabled {
            buckets.entry(tier_name).or_default().push(candidate.clone());
        }
        size_filtered_all.push(candidate.clone());
    }

    for bucket in buckets.values_mut() {
        sort_candidates(bucket);
    }

    let mut priorities: Vec<(u32, &str)> = profile
        .qualities
        .iter()
        .filter(|(_, settings)| settings.enabled)
        .map(|(name, settings)| (settings.priority, name.as_str()))
        .collect();
    priorities.sort();

    for (priority, tier_name) in priorities {
        if let Some(bucket) = buckets.remove(tier_name) {
            if !bucket.is_empty() {
                info!(
                    "quality filter: returning {} '{}' candidates (priority {})",
                    bucket.len(),
                    tier_name,
                    priority
                );
                return bucket;
            }
        }
    }

    if profile.fallback_enabled {
        if size_filtered_all.is_empty() {
            warn!("quality filter: all candidates failed size checks, returning empty");
            return Vec::new();
        }
        sort_candidates(&mut size_filtered_all);
        info!(
            "quality filter: no enabled tier matched, returning {} size-filtered fallback candidates",
            size_filtered_all.len()
        );
        size_filtered_all
    } else {
        warn!("quality filter: no enabled tier matched and fallback is disabled");
        Vec::new()
    }
}

fn sort_candidates(candidates: &mut [TrackResult]) {
    candidates.sort_by(|a, b| {
        b.quality_score()
            .partial_cmp(&a.quality_score())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.size.cmp(&a.size))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(quality: AudioQuality, bitrate: Option<u32>, size_mb: u64) -> TrackResult {
        TrackResult {
            username: "peer".to_string(),
            filename: format!("track.{}", quality.as_str()),
            size: size_mb * 1024 * 1024,
            bitrate,
            duration_ms: None,
            quality,
            free_upload_slots: 1,
            upload_speed: 0,
            queue_length: 0,
            artist: None,
            title: "track".to_string(),
            album: None,
            track_number: None,
        }
    }

    #[test]
    fn waterfall_returns_highest_priority_tier() {
        let candidates = vec![
            candidate(AudioQuality::Mp3, Some(320), 10),
            candidate(AudioQuality::Flac, None, 40),
        ];
        let result = filter_by_quality(&candidates, &QualityProfile::balanced());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].quality, AudioQuality::Flac);
    }

    #[test]
    fn lower_tier_fills_in_when_higher_is_empty() {
        let candidates = vec![candidate(AudioQuality::Mp3, Some(320), 10)];
        let result = filter_by_quality(&candidates, &QualityProfile::balanced());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].quality, AudioQuality::Mp3);
    }

    #[test]
    fn size_bounds_respected_without_fallback() {
        // 500 MB FLAC exceeds every tier's bound; with fallback disabled the
        // result must be empty.
        let candidates = vec![candidate(AudioQuality::Flac, None, 500)];
        let result = filter_by_quality(&candidates, &QualityProfile::audiophile());
        assert!(result.is_empty());
    }

    #[test]
    fn fallback_returns_size_checked_candidates_only() {
        // FLAC disabled in space_saver but still size-checked; an oversized
        // file must not come back even through fallback.
        let ok = candidate(AudioQuality::Flac, None, 40);
        let oversized = candidate(AudioQuality::Flac, None, 500);
        let result = filter_by_quality(&[ok, oversized], &QualityProfile::space_saver());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].size, 40 * 1024 * 1024);
    }

    #[test]
    fn disabled_tier_never_wins_directly() {
        // mp3_192 is disabled in balanced; a 192kbps file only surfaces via
        // fallback, after enabled tiers come up empty.
        let candidates = vec![candidate(AudioQuality::Mp3, Some(192), 8)];
        let result = filter_by_quality(&candidates, &QualityProfile::balanced());
        assert_eq!(result.len(), 1, "fallback should surface it");

        let mut no_fallback = QualityProfile::balanced();
        no_fallback.fallback_enabled = false;
        let result = filter_by_quality(&candidates, &no_fallback);
        assert!(result.is_empty());
    }

    #[test]
    fn buckets_sort_by_score_then_size() {
        let big = candidate(AudioQuality::Flac, None, 100);
        let small = candidate(AudioQuality::Flac, None, 50);
        let result = filter_by_quality(&[small, big], &QualityProfile::balanced());
        assert_eq!(result[0].size, 100 * 1024 * 1024);
    }

    #[test]
    fn malformed_profile_json_falls_back_to_balanced() {
        let parsed: Result<QualityProfile, _> = serde_json::from_str("{not json");
        let profile = parsed.unwrap_or_else(|_| QualityProfile::balanced());
        assert_eq!(profile.preset, "balanced");
    }
}
