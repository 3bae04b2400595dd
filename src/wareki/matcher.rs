use regex::{Captures, Match, Regex};
use std::sync::LazyLock;

use super::DateCandidate;
use super::era::{self, ERAS};
use super::number::parse_token;

const NUMERAL: &str = "([0-9]{1,2}|元|[〇零一二三四五六七八九十]{1,3})";
const DIGITS: &str = "([0-9]{1,2})";
const SEPARATOR: &str = "[./-]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    KanjiFullDate,
    KanjiYear,
    AbbreviatedFullDate,
    AbbreviatedYearMonth,
    AbbreviatedYear,
}

struct Rule {
    kind: RuleKind,
    pattern: Regex,
}

// Evaluated top to bottom; the first rule that yields a candidate wins.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let names = ERAS.iter().map(|era| era.name).collect::<Vec<_>>().join("|");
    let era_name = format!("({})", names);
    let codes = ERAS
        .iter()
        .map(|era| era.abbreviation)
        .collect::<String>();
    let code = format!("([{}])", codes);

    let specs = [
        (
            RuleKind::KanjiFullDate,
            format!("{era_name}{NUMERAL}年?{NUMERAL}月{NUMERAL}日?"),
        ),
        (RuleKind::KanjiYear, format!("{era_name}{NUMERAL}年?")),
        (
            RuleKind::AbbreviatedFullDate,
            format!("{code}{DIGITS}{SEPARATOR}{DIGITS}{SEPARATOR}{DIGITS}"),
        ),
        (
            RuleKind::AbbreviatedYearMonth,
            format!("{code}{DIGITS}{SEPARATOR}{DIGITS}"),
        ),
        (RuleKind::AbbreviatedYear, format!("{code}{DIGITS}")),
    ];
    specs
        .into_iter()
        .map(|(kind, source)| Rule {
            kind,
            pattern: Regex::new(&source).expect("era date pattern must compile"),
        })
        .collect()
});

/// Returns the candidate of the highest-priority rule that matches.
pub fn match_date(normalized: &str) -> Option<DateCandidate> {
    candidates(normalized).next()
}

/// Candidates in rule priority order, at most one per rule.
pub fn candidates(normalized: &str) -> impl Iterator<Item = DateCandidate> + '_ {
    RULES.iter().filter_map(move |rule| {
        let caps = rule.pattern.captures(normalized)?;
        extract(rule.kind, normalized, &caps)
    })
}

fn extract(kind: RuleKind, normalized: &str, caps: &Captures<'_>) -> Option<DateCandidate> {
    // Group 1 is the era; every later group is a numeral.
    if !caps
        .iter()
        .skip(2)
        .flatten()
        .all(|token| is_whole_numeral(normalized, token))
    {
        return None;
    }
    let matched_text = caps.get(0)?.as_str().to_string();
    let era_name = match kind {
        RuleKind::KanjiFullDate | RuleKind::KanjiYear => era::find_by_name(&caps[1])?.name,
        _ => {
            let code = caps[1].chars().next()?;
            era::find_by_abbreviation(code)?.name
        }
    };
    let relative_year = parse_token(&caps[2])?;
    let (month, day) = match kind {
        RuleKind::KanjiFullDate | RuleKind::AbbreviatedFullDate => (
            Some(parse_token(&caps[3])?),
            Some(parse_token(&caps[4])?),
        ),
        RuleKind::AbbreviatedYearMonth => (Some(parse_token(&caps[3])?), None),
        RuleKind::KanjiYear | RuleKind::AbbreviatedYear => (None, None),
    };

    Some(DateCandidate {
        era_name: era_name.to_string(),
        relative_year,
        month,
        day,
        matched_text,
    })
}

/// False when the token was cut out of a longer run of the same kind of
/// numeral, e.g. `20` out of `2023`.
fn is_whole_numeral(haystack: &str, token: Match<'_>) -> bool {
    let Some(class) = token.as_str().chars().next().and_then(numeral_class) else {
        return true;
    };
    let before = haystack[..token.start()].chars().next_back();
    let after = haystack[token.end()..].chars().next();
    [before, after]
        .into_iter()
        .flatten()
        .all(|ch| numeral_class(ch) != Some(class))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumeralClass {
    Ascii,
    Kanji,
}

fn numeral_class(ch: char) -> Option<NumeralClass> {
    match ch {
        '0'..='9' => Some(NumeralClass::Ascii),
        '〇' | '零' | '一' | '二' | '三' | '四' | '五' | '六' | '七' | '八' | '九' | '十' => {
            Some(NumeralClass::Kanji)
        }
        _ => None,
    }
}
