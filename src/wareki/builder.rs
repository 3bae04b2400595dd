use super::ConversionResult;
use super::era;

const MAX_MONTH: u32 = 12;
// Month length and leap years are not checked.
const MAX_DAY: u32 = 31;

pub fn build(
    era_name: &str,
    relative_year: u32,
    month: Option<u32>,
    day: Option<u32>,
    matched_text: &str,
) -> Option<ConversionResult> {
    let era = era::find_by_name(era_name)?;
    if !era.contains(relative_year) {
        return None;
    }
    if let Some(month) = month
        && !(1..=MAX_MONTH).contains(&month)
    {
        return None;
    }
    match (month, day) {
        (None, Some(_)) => return None,
        (_, Some(day)) if !(1..=MAX_DAY).contains(&day) => return None,
        _ => {}
    }

    let year = era.gregorian_year(relative_year);
    Some(ConversionResult {
        original: matched_text.to_string(),
        converted: format_gregorian(year, month, day),
        year,
        month,
        day,
        era_name: era.name.to_string(),
    })
}

fn format_gregorian(year: i32, month: Option<u32>, day: Option<u32>) -> String {
    match (month, day) {
        (Some(month), Some(day)) => format!("{}年{}月{}日", year, month, day),
        (Some(month), None) => format!("{}年{}月", year, month),
        _ => format!("{}年", year),
    }
}
