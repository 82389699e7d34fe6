//! Script-ratio heuristic: is this genuine text in the target script, or
//! noise?
//!
//! Scanned Hebrew PDFs often carry an invisible text layer produced by a bad
//! OCR pass at scan time, or font-encoded glyph IDs that decode to Latin
//! gibberish. Both decode "successfully". Counting how many characters fall
//! inside the expected script is cheap and catches the common failure mode
//! well enough to decide whether OCR is worth paying for.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive range of Unicode scalar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRange {
    pub start: char,
    pub end: char,
}

impl ScriptRange {
    pub const fn new(start: char, end: char) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, c: char) -> bool {
        self.start <= c && c <= self.end
    }
}

impl fmt::Display for ScriptRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U+{:04X}..=U+{:04X}", self.start as u32, self.end as u32)
    }
}

/// The Hebrew block, U+0590–U+05FF (letters, points, cantillation marks).
pub const HEBREW: ScriptRange = ScriptRange::new('\u{0590}', '\u{05FF}');

/// Fraction of `text`'s characters that fall in any of `ranges`.
///
/// Characters are Unicode scalar values, whitespace included, so the ratio
/// of a Hebrew paragraph sits well below 1.0. The denominator is at least 1:
/// empty text scores 0.0.
pub fn script_ratio(text: &str, ranges: &[ScriptRange]) -> f64 {
    let mut total = 0usize;
    let mut matching = 0usize;
    for c in text.chars() {
        total += 1;
        if ranges.iter().any(|r| r.contains(c)) {
            matching += 1;
        }
    }
    matching as f64 / total.max(1) as f64
}

/// `true` when `text` passes the acceptance threshold.
pub fn is_genuine(text: &str, ranges: &[ScriptRange], threshold: f64) -> bool {
    script_ratio(text, ranges) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_scores_zero() {
        assert_eq!(script_ratio("", &[HEBREW]), 0.0);
    }

    #[test]
    fn pure_hebrew_scores_one() {
        assert_eq!(script_ratio("שלום", &[HEBREW]), 1.0);
    }

    #[test]
    fn counts_chars_not_bytes() {
        // 4 Hebrew letters (8 bytes) + 4 ASCII letters.
        let r = script_ratio("שלוםabcd", &[HEBREW]);
        assert!((r - 0.5).abs() < 1e-9, "got {r}");
    }

    #[test]
    fn whitespace_counts_in_denominator() {
        // "אב" + 8 spaces = 2/10
        let r = script_ratio("אב        ", &[HEBREW]);
        assert!((r - 0.2).abs() < 1e-9, "got {r}");
        assert!(is_genuine("אב        ", &[HEBREW], 0.2));
    }

    #[test]
    fn latin_gibberish_is_noise() {
        let noise = "ÌÉÊÏ ÅÔ ÓÒÎÙ 1234 ///";
        assert!(!is_genuine(noise, &[HEBREW], 0.2));
    }

    #[test]
    fn range_boundaries_are_inclusive() {
        assert!(HEBREW.contains('\u{0590}'));
        assert!(HEBREW.contains('\u{05FF}'));
        assert!(!HEBREW.contains('\u{0600}'));
        assert!(!HEBREW.contains('\u{058F}'));
    }

    #[test]
    fn several_ranges_are_unioned() {
        let arabic = ScriptRange::new('\u{0600}', '\u{06FF}');
        let r = script_ratio("א\u{0627}xx", &[HEBREW, arabic]);
        assert!((r - 0.5).abs() < 1e-9, "got {r}");
    }

    #[test]
    fn display_uses_code_points() {
        assert_eq!(HEBREW.to_string(), "U+0590..=U+05FF");
    }
}
