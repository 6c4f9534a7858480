//! Text cleanup helpers for OCR output.

/// Characters OCR commonly emits from ruling lines and paper noise
const ARTIFACT_CHARS: &[char] = &[
    '|', '_', '~', '`', '*', '"', '¦', '«', '»', '“', '”', '[', ']', '{', '}',
];

/// Separators and stray punctuation trimmed from both ends of a value
const EDGE_PUNCTUATION: &[char] = &[':', ';', '.', '-', ',', '–', '—'];

/// Normalize recognized text line by line.
///
/// Zero-width characters become spaces, runs of spaces collapse, lines are
/// trimmed and blank lines dropped. Line breaks are kept because field
/// values end at them.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.lines()
        .map(|line| {
            line.replace(|c: char| matches!(c, '\u{200b}'..='\u{200d}' | '\u{feff}'), " ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip OCR artifacts and edge punctuation from a captured value
#[must_use]
pub fn clean_value(raw: &str) -> Option<String> {
    let stripped: String = raw.chars().filter(|c| !ARTIFACT_CHARS.contains(c)).collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let value = collapsed
        .trim_matches(|c: char| EDGE_PUNCTUATION.contains(&c) || c.is_whitespace())
        .to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Share of Tamil and Latin letters, each in [0, 1]
#[must_use]
pub fn script_shares(text: &str) -> (f32, f32) {
    let mut tamil = 0usize;
    let mut latin = 0usize;
    for c in text.chars() {
        if ('\u{0B80}'..='\u{0BFF}').contains(&c) {
            tamil += 1;
        } else if c.is_ascii_alphabetic() {
            latin += 1;
        }
    }
    let total = tamil + latin;
    if total == 0 {
        return (0.0, 0.0);
    }
    (tamil as f32 / total as f32, latin as f32 / total as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_keeps_lines() {
        let raw = "பட்டா\u{200c}எண்  :  12\n\n   Owner:\tRaman  \n";
        assert_eq!(normalize_text(raw), "பட்டா எண் : 12\nOwner: Raman");
    }

    #[test]
    fn test_clean_value_strips_artifacts() {
        assert_eq!(clean_value(" |123/4B_ ").as_deref(), Some("123/4B"));
        assert_eq!(clean_value("Raman.").as_deref(), Some("Raman"));
        assert_eq!(clean_value(" ~|~ "), None);
    }

    #[test]
    fn test_script_shares() {
        let (ta, en) = script_shares("பட்டா abc");
        assert!(ta > 0.0 && en > 0.0);
        assert!((ta + en - 1.0).abs() < 1e-6);
        assert_eq!(script_shares("123 / 45"), (0.0, 0.0));
    }
}
