use std::collections::HashSet;

/// Markers whose presence indicates a different recording of the same song,
/// not a metadata variation. Two titles that disagree on any of these are
/// penalized rather than collapsed.
const VERSION_MARKERS: &[&str] = &[
    "live",
    "remix",
    "acoustic",
    "demo",
    "extended",
    "instrumental",
    "unplugged",
];

/// Factor applied when one side carries a version marker the other lacks.
const VERSION_MISMATCH_PENALTY: f64 = 0.6;

/// Similarity between two strings in `[0, 1]`.
///
/// Levenshtein-based (`1 - distance / max_len`), with a penalty when the two
/// sides disagree on version markers (`live`, `remix`, ...). Inputs are
/// compared as given; callers normalize beforehand.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut score = strsim::normalized_levenshtein(a, b).max(0.0);

    if version_markers(a) != version_markers(b) {
        score *= VERSION_MISMATCH_PENALTY;
    }

    score
}

fn version_markers(s: &str) -> HashSet<&'static str> {
    let lower = s.to_lowercase();
    let tokens: HashSet<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    VERSION_MARKERS
        .iter()
        .copied()
        .filter(|m| tokens.contains(m))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(string_similarity("hey jude", "hey jude"), 1.0);
    }

    #[test]
    fn empty_string_scores_zero() {
        assert_eq!(string_similarity("", "hey jude"), 0.0);
    }

    #[test]
    fn single_edit_scores_high() {
        let score = string_similarity("jertfa", "jertfă");
        assert!(score > 0.8, "score was {score}");
    }

    #[test]
    fn version_marker_mismatch_is_penalized() {
        let plain = string_similarity("hey jude", "hey jude radio");
        let live = string_similarity("hey jude", "hey jude live");
        assert!(live < plain, "live={live} plain={plain}");
    }

    #[test]
    fn matching_version_markers_not_penalized() {
        let score = string_similarity("hey jude live", "hey jude live");
        assert_eq!(score, 1.0);
    }

    #[test]
    fn marker_must_be_a_whole_word() {
        // "deliver" contains "live" but is not a live recording.
        let score = string_similarity("deliver", "deliverx");
        assert!(score > 0.8, "score was {score}");
    }
}
