use once_cell::sync::Lazy;
use regex::Regex;

use super::normalize::{normalize, title_case};

/// Edition suffix patterns stripped from album titles. Parenthesized,
/// trailing and dash-separated spellings are all recognized.
static ALBUM_EDITION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\s*\(deluxe(\s*edition)?\)",
        r"(?i)\s*\(expanded(\s*edition)?\)",
        r"(?i)\s*\(platinum(\s*edition)?\)",
        r"(?i)\s*\(special(\s*edition)?\)",
        r"(?i)\s*\(remaster(ed)?\)",
        r"(?i)\s*\(anniversary(\s*edition)?\)",
        r"(?i)\s*\(.*version\)",
        r"(?i)\s+deluxe(\s*edition)?$",
        r"(?i)\s+platinum(\s*edition)?$",
        r"(?i)\s+special\s*edition$",
        r"(?i)\s*-\s*deluxe(\s*edition)?$",
        r"(?i)\s*-\s*platinum(\s*edition)?$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Edition markers re-applied to a stripped base title when the search title
/// carried an edition of its own.
const REDECORATE_EDITIONS: &[&str] = &[
    "deluxe edition",
    "deluxe",
    "platinum edition",
    "platinum",
    "special edition",
    "expanded edition",
    "remastered",
    "anniversary edition",
];

/// Edition markers applied to a base-form title to find upgraded editions.
const BASE_FORM_EDITIONS: &[&str] = &["Deluxe Edition", "Deluxe", "Platinum Edition", "Special Edition"];

/// Noise removed from track titles: markers that describe the same
/// recording, never ones that denote a different one (live, remix, ...).
static TRACK_NOISE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\s*\(explicit\)",
        r"(?i)\s*\(clean\)",
        r"(?i)\s*\[explicit\]",
        r"(?i)\s*\[clean\]",
        r"(?i)\s*\(feat\..*?\)",
        r"(?i)\s*\(featuring.*?\)",
        r"(?i)\s*\(ft\..*?\)",
        r"(?i)\s*\(with\s+.*?\)",
        r"(?i)\s*\(radio\s*edit\)",
        r"(?i)\s*\(tv\s*edit\)",
        r"(?i)\s*\[radio\s*edit\]",
        r"(?i)\s*\[tv\s*edit\]",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static PAREN_TO_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(([^)]+)\)\s*").unwrap());

/// Strip a recognized edition suffix from an album title, returning the base
/// form. Returns the input unchanged when no edition marker is present.
pub fn strip_edition(title: &str) -> String {
    for pattern in ALBUM_EDITION_PATTERNS.iter() {
        if pattern.is_match(title) {
            return pattern.replace(title, "").trim().to_string();
        }
    }
    title.trim().to_string()
}

/// Generate album-title variations for edition-aware catalog searches.
///
/// Always contains the original title and, when an edition suffix was
/// present, the base form plus re-decorated edition variants. Base-form
/// inputs get common upgraded-edition spellings instead. Deduplicated
/// case-insensitively, insertion order preserved.
pub fn album_title_variations(title: &str) -> Vec<String> {
    let mut variations = vec![title.to_string()];

    let base = strip_edition(title);
    let had_edition = !base.eq_ignore_ascii_case(title.trim());

    if had_edition {
        variations.push(base.clone());
        for edition in REDECORATE_EDITIONS {
            variations.push(format!("{} ({})", base, title_case(edition)));
            variations.push(format!("{} ({})", base, edition));
            variations.push(format!("{} - {}", base, title_case(edition)));
            variations.push(format!("{} {}", base, title_case(edition)));
        }
    } else {
        for edition in BASE_FORM_EDITIONS {
            variations.push(format!("{} ({})", title, edition));
            variations.push(format!("{} - {}", title, edition));
            variations.push(format!("{} {}", title, edition));
        }
    }

    dedup_case_insensitive(variations)
}

/// Generate track-title variations: bracket<->dash transforms plus noise
/// removal. Remix/version/live markers are preserved since they denote
/// different recordings.
pub fn track_title_variations(title: &str) -> Vec<String> {
    let mut variations = vec![title.to_string()];

    // "A - B" <-> "A (B)"
    if let Some((head, tail)) = title.split_once(" - ") {
        variations.push(format!("{} ({})", head, tail));
    }
    if title.contains('(') && title.contains(')') {
        let dashed = PAREN_TO_DASH.replace_all(title, " - $1").trim().to_string();
        if dashed != title {
            variations.push(dashed);
        }
    }

    for pattern in TRACK_NOISE_PATTERNS.iter() {
        let cleaned = pattern.replace_all(title, "").trim().to_string();
        if !cleaned.is_empty() && !cleaned.eq_ignore_ascii_case(title) {
            variations.push(cleaned);
        }
    }

    dedup_case_insensitive(variations)
}

/// Strip all recognized noise markers from a track title in one pass,
/// keeping the original casing. Used when building download queries.
pub fn strip_title_noise(title: &str) -> String {
    let mut cleaned = title.to_string();
    for pattern in TRACK_NOISE_PATTERNS.iter() {
        cleaned = pattern.replace_all(&cleaned, "").to_string();
    }
    cleaned.trim().to_string()
}

/// Known spelling variants for an artist name, including the
/// diacritic-folded form. SQL LIKE is accent-sensitive, so the folded
/// variant is what lets "Subcarpaţi" find rows stored as "Subcarpati".
pub fn artist_variations(name: &str) -> Vec<String> {
    let mut variations = vec![name.to_string()];

    let folded = normalize(name);
    if folded != name.to_lowercase() {
        variations.push(title_case(&folded));
        variations.push(folded);
    }

    // Stylized names whose canonical spelling differs from what users type.
    if name.to_lowercase().contains("korn") {
        variations.push("KoЯn".to_string());
        variations.push("Korn".to_string());
    }

    dedup_case_sensitive(variations)
}

/// Clean a track title for confidence comparison: brackets and dashes become
/// spaces, same-recording metadata markers are removed, whitespace collapsed.
pub fn clean_track_title(title: &str) -> String {
    static BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[\[\]()]\s*").unwrap());
    static DASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*-\s*").unwrap());
    static NOISE: Lazy<Vec<Regex>> = Lazy::new(|| {
        [
            r"(?i)\bexplicit\b",
            r"(?i)\bclean\b",
            r"(?i)\bfeat\..*$",
            r"(?i)\bfeaturing\b.*$",
            r"(?i)\bft\..*$",
            r"(?i)\bwith\s+.*$",
            r"(?i)\bradio\s+edit\b.*$",
            r"(?i)\bsingle\s+edit\b.*$",
            r"(?i)\balbum\s+edit\b.*$",
            r"(?i)\bedit\s*$",
            r"(?i)\b\d{4}\s*remaster(ed)?\b.*$",
            r"(?i)\bremaster(ed)?\b.*$",
            r"(?i)\boriginal\s+version\b.*$",
            r"(?i)\balbum\s+version\b.*$",
            r"(?i)\bsingle\s+version\b.*$",
            r"(?i)\bversion\s*$",
            r#"(?i)\bfrom\s+.*soundtrack\b.*$"#,
            r"(?i)\bsoundtrack\b.*$",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    });
    static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

    let mut cleaned = title.to_lowercase();
    cleaned = BRACKETS.replace_all(&cleaned, " ").to_string();
    cleaned = DASHES.replace_all(&cleaned, " ").to_string();
    for pattern in NOISE.iter() {
        cleaned = pattern.replace_all(&cleaned, "").to_string();
    }
    SPACES.replace_all(&cleaned, " ").trim().to_string()
}

/// Clean an album title for confidence comparison by removing edition
/// markers.
pub fn clean_album_title(title: &str) -> String {
    let mut cleaned = title.to_lowercase();
    for pattern in ALBUM_EDITION_PATTERNS.iter() {
        cleaned = pattern.replace_all(&cleaned, "").to_string();
    }
    cleaned.trim().to_string()
}

fn dedup_case_insensitive(variations: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::new();
    for var in variations {
        let trimmed = var.trim().to_string();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            unique.push(trimmed);
        }
    }
    unique
}

fn dedup_case_sensitive(variations: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::new();
    for var in variations {
        if seen.insert(var.clone()) {
            unique.push(var);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn album_variations_contain_original_and_base() {
        let vars = album_title_variations("The Dark Side of the Moon (Deluxe Edition)");
        assert_eq!(vars[0], "The Dark Side of the Moon (Deluxe Edition)");
        assert!(vars.iter().any(|v| v == "The Dark Side of the Moon"));
    }

    #[test]
    fn album_variations_redecorate_base_titles() {
        let vars = album_title_variations("Currents");
        assert!(vars.contains(&"Currents".to_string()));
        assert!(vars.contains(&"Currents (Deluxe Edition)".to_string()));
        assert!(vars.contains(&"Currents - Deluxe".to_string()));
    }

    #[test]
    fn album_variations_dedup_case_insensitively() {
        let vars = album_title_variations("Lonerism (Deluxe)");
        let mut lowered: Vec<String> = vars.iter().map(|v| v.to_lowercase()).collect();
        let before = lowered.len();
        lowered.dedup();
        lowered.sort();
        lowered.dedup();
        assert_eq!(before, lowered.len(), "variations contain duplicates: {vars:?}");
    }

    #[test]
    fn strip_edition_handles_dash_spelling() {
        assert_eq!(strip_edition("In Rainbows - Deluxe Edition"), "In Rainbows");
        assert_eq!(strip_edition("In Rainbows"), "In Rainbows");
    }

    #[test]
    fn track_variations_swap_brackets_and_dashes() {
        let vars = track_title_variations("Breathe - Instrumental");
        assert!(vars.contains(&"Breathe (Instrumental)".to_string()));

        let vars = track_title_variations("Breathe (Instrumental)");
        assert!(vars.contains(&"Breathe - Instrumental".to_string()));
    }

    #[test]
    fn track_variations_drop_noise_but_keep_versions() {
        let vars = track_title_variations("Money (feat. Someone) [Explicit]");
        assert!(vars.iter().any(|v| v == "Money"));

        // Remix markers denote a different recording and must survive.
        let vars = track_title_variations("Money (Goat Remix)");
        assert!(!vars.iter().any(|v| v == "Money"));
    }

    #[test]
    fn artist_variations_include_folded_form() {
        let vars = artist_variations("Subcarpaţi");
        assert!(vars.contains(&"Subcarpaţi".to_string()));
        assert!(vars.contains(&"subcarpati".to_string()));
        assert!(vars.contains(&"Subcarpati".to_string()));
    }

    #[test]
    fn clean_track_title_normalizes_brackets_and_noise() {
        assert_eq!(clean_track_title("Time [2011 Remastered]"), "time");
        assert_eq!(clean_track_title("Us and Them (Radio Edit)"), "us and them");
        assert_eq!(clean_track_title("Brain Damage - Live"), "brain damage live");
    }

    #[test]
    fn clean_album_title_strips_editions() {
        assert_eq!(
            clean_album_title("The Dark Side of the Moon (Deluxe Edition)"),
            "the dark side of the moon"
        );
        assert_eq!(clean_album_title("Wish You Were Here"), "wish you were here");
    }
}
