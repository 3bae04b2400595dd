//! Japanese era (和暦) ⇔ Gregorian (西暦) conversion over noisy recognized text.

pub mod builder;
pub mod era;
pub mod matcher;
pub mod normalize;
pub mod number;
pub mod reverse;

use serde::Serialize;

pub use era::{ERAS, Era};
pub use normalize::normalize;

/// A date pulled out of normalized text, before range validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateCandidate {
    pub era_name: String,
    pub relative_year: u32,
    pub month: Option<u32>,
    /// Only set when `month` is set.
    pub day: Option<u32>,
    pub matched_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionResult {
    pub original: String,
    pub converted: String,
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub era_name: String,
}

/// Finds the first era date in `text` and converts it to the Gregorian calendar.
///
/// Rules are tried in priority order; a rule whose match fails range
/// validation hands over to the next rule.
pub fn wareki_to_seireki(text: &str) -> Option<ConversionResult> {
    if text.trim().is_empty() {
        return None;
    }
    let normalized = normalize(text);
    matcher::candidates(&normalized).find_map(|candidate| {
        builder::build(
            &candidate.era_name,
            candidate.relative_year,
            candidate.month,
            candidate.day,
            &candidate.matched_text,
        )
    })
}

pub fn seireki_to_wareki(year: i32) -> Option<String> {
    reverse::to_era_string(year)
}
