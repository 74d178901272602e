// Text matching engine: normalization, similarity scoring, title variation
// generation and confidence calculation. Everything here is pure string
// work; the catalog store and resolver drive it.

pub mod confidence;
pub mod normalize;
pub mod similarity;
pub mod variations;

pub use confidence::{album_confidence, track_confidence};
pub use normalize::{fold_diacritics, normalize};
pub use similarity::string_similarity;
pub use variations::{
    album_title_variations, artist_variations, clean_album_title, clean_track_title,
    track_title_variations,
};

use crate::models::ProviderTrack;

/// Build the query string sent to the transfer daemon for a track.
///
/// Featured-artist parentheticals and content markers are noise on the peer
/// network, so they are stripped before the artist name is prepended.
pub fn generate_download_query(track: &ProviderTrack) -> String {
    let title = variations::strip_title_noise(&track.name);
    let query = match track.primary_artist() {
        Some(artist) => format!("{} {}", artist, title),
        None => title,
    };

    // Quotes and bracket remnants confuse peer-side tokenization.
    let cleaned: String = query
        .chars()
        .map(|c| match c {
            '"' | '\'' | '(' | ')' | '[' | ']' => ' ',
            _ => c,
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderArtist;

    fn track(name: &str, artist: &str) -> ProviderTrack {
        ProviderTrack {
            id: "t1".to_string(),
            name: name.to_string(),
            artists: vec![ProviderArtist {
                name: artist.to_string(),
            }],
            album: None,
            duration_ms: None,
            popularity: None,
            external_urls: None,
        }
    }

    #[test]
    fn download_query_prepends_artist_and_strips_noise() {
        let t = track("Hey Jude (feat. Someone) [Explicit]", "The Beatles");
        assert_eq!(generate_download_query(&t), "The Beatles Hey Jude");
    }

    #[test]
    fn download_query_without_artist_uses_title_only() {
        let mut t = track("Intro", "x");
        t.artists.clear();
        assert_eq!(generate_download_query(&t), "Intro");
    }
}
