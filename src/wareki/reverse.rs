use super::era::ERAS;

/// Renders a Gregorian year as an era year (`令和5年`, `平成元年`).
///
/// Eras are scanned newest first, so a succession year resolves to the
/// newer era. Returns `None` for years before 明治.
pub fn to_era_string(gregorian_year: i32) -> Option<String> {
    ERAS.iter()
        .filter(|era| era.start_year <= gregorian_year)
        .find_map(|era| {
            let relative_year = u32::try_from(gregorian_year - era.start_year + 1).ok()?;
            if !era.contains(relative_year) {
                return None;
            }
            Some(if relative_year == 1 {
                format!("{}元年", era.name)
            } else {
                format!("{}{}年", era.name, relative_year)
            })
        })
}
