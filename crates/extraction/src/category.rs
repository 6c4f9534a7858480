//! Keyword-based document classification.

use landrec_common::DocumentCategory;

/// Keywords per category, Tamil first, matched case-insensitively
const CATEGORY_KEYWORDS: &[(DocumentCategory, &[&str])] = &[
    (
        DocumentCategory::SaleDeed,
        &["விற்பனை", "கிரைய", "sale", "conveyance"],
    ),
    (DocumentCategory::Patta, &["பட்டா", "patta"]),
    (DocumentCategory::Chitta, &["சிட்டா", "chitta"]),
    (DocumentCategory::Adangal, &["அடங்கல்", "adangal"]),
    (
        DocumentCategory::GovernmentOrder,
        &["அரசாணை", "உத்தரவு", "government order", "g.o."],
    ),
];

/// Outcome of classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: DocumentCategory,
    /// Keyword occurrences of the assigned category
    pub score: u32,
    pub confidence: u8,
}

/// Category confidence from a keyword score.
///
/// `min(round(score / 10 * 100) + 20, 100)`. This is a linear heuristic
/// carried over for compatibility with existing records, not a calibrated
/// probability: one hit scores 30, eight or more score 100.
#[must_use]
pub fn category_confidence(score: u32) -> u8 {
    if score == 0 {
        return 0;
    }
    let scaled = (f64::from(score) / 10.0 * 100.0).round() as u32 + 20;
    scaled.min(100) as u8
}

/// Assign the first category, in table order, whose keywords occur in the
/// text. Its occurrence count drives the confidence. No hit at all yields
/// [`DocumentCategory::Unknown`] at zero confidence.
#[must_use]
pub fn classify(text: &str) -> Classification {
    let lowered = text.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find_map(|(category, keywords)| {
            let score: u32 = keywords
                .iter()
                .map(|k| lowered.matches(k).count() as u32)
                .sum();
            (score > 0).then(|| Classification {
                category: *category,
                score,
                confidence: category_confidence(score),
            })
        })
        .unwrap_or(Classification {
            category: DocumentCategory::Unknown,
            score: 0,
            confidence: 0,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_is_documented_approximation() {
        // linear heuristic, not a calibrated probability
        assert_eq!(category_confidence(0), 0);
        assert_eq!(category_confidence(1), 30);
        assert_eq!(category_confidence(3), 50);
        assert_eq!(category_confidence(8), 100);
        assert_eq!(category_confidence(40), 100);
    }

    #[test]
    fn test_first_found_category_wins() {
        let c = classify("Sale deed of land\nபட்டா பட்டா patta");
        assert_eq!(c.category, DocumentCategory::SaleDeed);
        assert_eq!(c.score, 1);
        assert_eq!(c.confidence, 30);
    }

    #[test]
    fn test_score_counts_every_keyword_of_category() {
        let c = classify("பட்டா எண்: 77\nPATTA issued, see chitta");
        assert_eq!(c.category, DocumentCategory::Patta);
        assert_eq!(c.score, 2);
        assert_eq!(c.confidence, 40);
    }

    #[test]
    fn test_no_keywords() {
        let c = classify("survey no 12");
        assert_eq!(c.category, DocumentCategory::Unknown);
        assert_eq!(c.confidence, 0);
    }
}
