use unicode_normalization::UnicodeNormalization;

/// Glyphs that OCR engines commonly return in place of the era kanji.
/// No source sequence overlaps another, so application order does not matter.
const ERA_REPAIRS: &[(&str, &str)] = &[
    ("今和", "令和"),
    ("合和", "令和"),
    ("冷和", "令和"),
    ("令利", "令和"),
    ("今利", "令和"),
    ("平戌", "平成"),
    ("平戍", "平成"),
    ("平或", "平成"),
    ("半成", "平成"),
    ("乎成", "平成"),
    ("照和", "昭和"),
    ("昭利", "昭和"),
    ("昭私", "昭和"),
    ("晒和", "昭和"),
    ("太正", "大正"),
    ("犬正", "大正"),
    ("大止", "大正"),
    ("明冶", "明治"),
    ("朋治", "明治"),
    ("明活", "明治"),
];

/// Canonicalizes recognized text before pattern matching.
///
/// NFKC folding runs first, so full-width digits and letters, the
/// full-width period and the square era ligatures (`㍻`, `㋿`) are already
/// plain text by the time the remaining passes run.
pub fn normalize(text: &str) -> String {
    let folded = text.nfkc().collect::<String>();
    let mut out = String::with_capacity(folded.len());
    for ch in folded.chars() {
        if ch.is_whitespace() {
            continue;
        }
        out.push(unify_punctuation(ch).to_ascii_uppercase());
    }
    repair_era_names(out)
}

fn unify_punctuation(ch: char) -> char {
    match ch {
        '\u{3002}' | '\u{FF0E}' | '\u{FF61}' => '.',
        '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
        | '\u{2212}' | '\u{30FC}' | '\u{FF0D}' | '\u{FF70}' | '\u{2500}' => '-',
        other => other,
    }
}

fn repair_era_names(mut text: String) -> String {
    for (wrong, right) in ERA_REPAIRS {
        if text.contains(wrong) {
            text = text.replace(wrong, right);
        }
    }
    text
}
