//! Bilingual label table: regex alternations for the pattern strategy and
//! plain label strings for the spatial strategy.

use landrec_common::FieldKind;
use regex::Regex;
use std::sync::LazyLock;

pub(crate) struct FieldRule {
    pub kind: FieldKind,
    /// Regex alternation matching the field label
    pub label_pattern: &'static str,
    /// Lowercase label strings searched for in table cells
    pub cell_labels: &'static [&'static str],
    /// A label preceded by one of these belongs to a longer label
    pub excluded_prefixes: &'static [&'static str],
}

pub(crate) const FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        kind: FieldKind::DocumentNumber,
        label_pattern: r"ஆவண\s*எண்|பதிவு\s*எண்|\bDocument\s*No\b\.?|\bDocument\s*Number\b|\bDoc\s*No\b\.?|\bRegistration\s*No\b\.?",
        cell_labels: &["ஆவண எண்", "பதிவு எண்", "document no", "document number", "doc no"],
        excluded_prefixes: &[],
    },
    FieldRule {
        kind: FieldKind::PreviousOwner,
        label_pattern: r"முந்தைய\s*உரிமையாளர்|முன்னாள்\s*உரிமையாளர்|\bPrevious\s*Owner|\bFormer\s*Owner",
        cell_labels: &["முந்தைய உரிமையாளர்", "முன்னாள் உரிமையாளர்", "previous owner", "former owner"],
        excluded_prefixes: &[],
    },
    FieldRule {
        kind: FieldKind::OwnerName,
        label_pattern: r"(?:உடைமையாளர்|உடைமையாளரின்|உரிமையாளர்|உரிமையாளரின்|பட்டாதாரர்)\s*பெயர்|\bOwner(?:'s)?\s*Name\b|\bOwner\b",
        cell_labels: &["உடைமையாளர் பெயர்", "உரிமையாளர் பெயர்", "பட்டாதாரர் பெயர்", "owner name", "owner"],
        excluded_prefixes: &["previous", "former", "முந்தைய", "முன்னாள்"],
    },
    FieldRule {
        kind: FieldKind::SurveyNumber,
        label_pattern: r"சர்வே\s*எண்|புல\s*எண்|\bSurvey\s*No\b\.?|\bSurvey\s*Number\b",
        cell_labels: &["சர்வே எண்", "புல எண்", "survey no", "survey number"],
        excluded_prefixes: &[],
    },
    FieldRule {
        kind: FieldKind::Date,
        label_pattern: r"தேதி|நாள்|\bDated?\b",
        cell_labels: &["தேதி", "date"],
        excluded_prefixes: &[],
    },
    FieldRule {
        kind: FieldKind::District,
        label_pattern: r"மாவட்டம்|\bDistrict\b",
        cell_labels: &["மாவட்டம்", "district"],
        excluded_prefixes: &[],
    },
    FieldRule {
        kind: FieldKind::Taluk,
        label_pattern: r"வட்டம்|\bTaluka?\b",
        cell_labels: &["வட்டம்", "taluk"],
        excluded_prefixes: &["மா"],
    },
    FieldRule {
        kind: FieldKind::Village,
        label_pattern: r"கிராமம்|வருவாய்\s*கிராமம்|\bVillage\b",
        cell_labels: &["கிராமம்", "village"],
        excluded_prefixes: &[],
    },
    FieldRule {
        kind: FieldKind::PattaNumber,
        label_pattern: r"பட்டா\s*எண்|\bPatta\s*No\b\.?|\bPatta\s*Number\b",
        cell_labels: &["பட்டா எண்", "patta no", "patta number"],
        excluded_prefixes: &[],
    },
    FieldRule {
        kind: FieldKind::BatchNumber,
        label_pattern: r"தொகுப்பு\s*வரிசை\s*எண்|\bThokuppu\b(?:\s*No\b\.?)?",
        cell_labels: &["தொகுப்பு வரிசை எண்", "thokuppu"],
        excluded_prefixes: &[],
    },
    FieldRule {
        kind: FieldKind::Location,
        label_pattern: r"இடம்|\bLocation\b",
        cell_labels: &["இடம்", "location"],
        excluded_prefixes: &[],
    },
];

pub(crate) struct CompiledField {
    pub rule: &'static FieldRule,
    pub regex: Regex,
}

/// Label, optional separator, then the value up to a line break or comma
pub(crate) static FIELD_PATTERNS: LazyLock<Vec<CompiledField>> = LazyLock::new(|| {
    FIELD_RULES
        .iter()
        .map(|rule| CompiledField {
            rule,
            regex: Regex::new(&format!(
                r"(?i)(?:{})\s*[:\-.]?\s*([^\n,]+)",
                rule.label_pattern
            ))
            .expect("valid field label regex"),
        })
        .collect()
});

/// Unlabelled day/month/year token
pub(crate) static DATE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2}[/\-.]\d{1,2}[/\-.]\d{2,4})\b").expect("valid date token regex")
});

/// True if the label starting at `start` is really the tail of a longer label
pub(crate) fn is_excluded(text: &str, start: usize, excluded_prefixes: &[&str]) -> bool {
    if excluded_prefixes.is_empty() {
        return false;
    }
    let before = text[..start].trim_end().to_lowercase();
    excluded_prefixes.iter().any(|p| before.ends_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(FIELD_PATTERNS.len(), FIELD_RULES.len());
        assert!(DATE_TOKEN.is_match("on 12/03/2019"));
    }

    #[test]
    fn test_exclusion_detects_longer_labels() {
        let text = "மாவட்டம்: மதுரை";
        let start = text.find("வட்டம்").unwrap();
        assert!(is_excluded(text, start, &["மா"]));

        let text = "Previous Owner: Kannan";
        let start = text.find("Owner").unwrap();
        assert!(is_excluded(text, start, &["previous"]));
        assert!(!is_excluded("Owner: Raman", 0, &["previous"]));
    }
}
