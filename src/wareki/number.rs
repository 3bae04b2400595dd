const FIRST_YEAR: &str = "元";
const TEN: char = '十';

/// Converts a year/month/day token to an integer.
///
/// Accepts ASCII digits, `元` (first year) and kanji numerals up to 99
/// written with the `十` marker. Anything else yields `None`.
pub fn parse_token(token: &str) -> Option<u32> {
    if token.is_empty() {
        return None;
    }
    if token == FIRST_YEAR {
        return Some(1);
    }
    if token.chars().all(|ch| ch.is_ascii_digit()) {
        return token.parse().ok();
    }
    parse_kanji(token)
}

fn parse_kanji(token: &str) -> Option<u32> {
    let Some((tens, ones)) = token.split_once(TEN) else {
        return single_digit(token);
    };
    let tens = if tens.is_empty() {
        1
    } else {
        single_digit(tens)?
    };
    let ones = if ones.is_empty() {
        0
    } else {
        single_digit(ones)?
    };
    Some(tens * 10 + ones)
}

fn single_digit(part: &str) -> Option<u32> {
    let mut chars = part.chars();
    let ch = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    kanji_digit(ch)
}

fn kanji_digit(ch: char) -> Option<u32> {
    let value = match ch {
        '〇' | '零' => 0,
        '一' => 1,
        '二' => 2,
        '三' => 3,
        '四' => 4,
        '五' => 5,
        '六' => 6,
        '七' => 7,
        '八' => 8,
        '九' => 9,
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::parse_token;

    #[test]
    fn parses_first_year_marker() {
        assert_eq!(parse_token("元"), Some(1));
    }

    #[test]
    fn parses_ascii_digits() {
        assert_eq!(parse_token("5"), Some(5));
        assert_eq!(parse_token("31"), Some(31));
        assert_eq!(parse_token("05"), Some(5));
    }

    #[test]
    fn parses_kanji_numerals() {
        assert_eq!(parse_token("五"), Some(5));
        assert_eq!(parse_token("十"), Some(10));
        assert_eq!(parse_token("十三"), Some(13));
        assert_eq!(parse_token("二十"), Some(20));
        assert_eq!(parse_token("二十三"), Some(23));
        assert_eq!(parse_token("六十四"), Some(64));
    }

    #[test]
    fn rejects_unsupported_tokens() {
        assert_eq!(parse_token(""), None);
        assert_eq!(parse_token("百"), None);
        assert_eq!(parse_token("二三"), None);
        assert_eq!(parse_token("十十"), None);
        assert_eq!(parse_token("二十三四"), None);
        assert_eq!(parse_token("5年"), None);
    }
}
