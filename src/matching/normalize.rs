use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold diacritics to plain ASCII: `ţ` -> `t`, `é` -> `e`, `ñ` -> `n`.
///
/// NFKD decomposition splits accented characters into a base character plus
/// combining marks, which are then dropped. A handful of letters do not
/// decompose and are mapped explicitly.
pub fn fold_diacritics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.nfkd().filter(|c| !is_combining_mark(*c)) {
        match c {
            'ø' => out.push('o'),
            'Ø' => out.push('O'),
            'đ' => out.push('d'),
            'Đ' => out.push('D'),
            'ł' => out.push('l'),
            'Ł' => out.push('L'),
            'æ' => out.push_str("ae"),
            'Æ' => out.push_str("AE"),
            'œ' => out.push_str("oe"),
            'Œ' => out.push_str("OE"),
            'ß' => out.push_str("ss"),
            'þ' => out.push_str("th"),
            'Þ' => out.push_str("Th"),
            'ð' => out.push('d'),
            'Ð' => out.push('D'),
            _ => out.push(c),
        }
    }
    out
}

/// Normalize a string for comparison: diacritics folded, lowercased,
/// surrounding whitespace trimmed. Idempotent.
pub fn normalize(text: &str) -> String {
    fold_diacritics(text).to_lowercase().trim().to_string()
}

/// Reduce a title to the form used for filesystem probing: alphanumerics,
/// spaces, dashes and underscores only, lowercased.
pub fn sanitize_for_filename(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .to_lowercase()
}

/// Title-case a normalized string, capitalizing the first letter of each
/// word. Used to produce display-cased artist alias variants.
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_common_diacritics() {
        assert_eq!(fold_diacritics("Subcarpaţi"), "Subcarpati");
        assert_eq!(fold_diacritics("Jertfă"), "Jertfa");
        assert_eq!(fold_diacritics("Beyoncé"), "Beyonce");
        assert_eq!(fold_diacritics("Señorita"), "Senorita");
    }

    #[test]
    fn folds_non_decomposing_letters() {
        assert_eq!(fold_diacritics("Mø"), "Mo");
        assert_eq!(fold_diacritics("Łukasz"), "Lukasz");
        assert_eq!(fold_diacritics("Motörhead"), "Motorhead");
    }

    #[test]
    fn normalize_is_idempotent() {
        for s in ["  Jertfă ", "HELLO", "Mø Øen", "plain ascii"] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn sanitize_keeps_word_characters() {
        assert_eq!(sanitize_for_filename("Hey Jude!"), "hey jude");
        assert_eq!(sanitize_for_filename("AC/DC - T.N.T."), "acdc - tnt");
    }

    #[test]
    fn title_case_capitalizes_words() {
        assert_eq!(title_case("dark side of the moon"), "Dark Side Of The Moon");
    }
}
