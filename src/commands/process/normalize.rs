use std::sync::LazyLock;

use super::*;

static NEGATIVE_PAREN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\((\d+(?:\.\d+)?)\)").expect("valid negative parenthesis regex")
});

static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?$").expect("valid numeric regex")
});

const NOT_A_NUMBER: [&str; 3] = ["nan", "NaN", "None"];

pub(super) fn is_digit_glyph(ch: char) -> bool {
    ch.is_ascii_digit() || ascii_digit_for(ch).is_some()
}

pub(super) fn has_digit(text: &str) -> bool {
    text.chars().any(is_digit_glyph)
}

fn ascii_digit_for(ch: char) -> Option<char> {
    let offset = match ch {
        '\u{0660}'..='\u{0669}' => ch as u32 - 0x0660,
        '\u{06F0}'..='\u{06F9}' => ch as u32 - 0x06F0,
        _ => return None,
    };
    char::from_digit(offset, 10)
}

/// Maps Arabic-Indic and Persian numerals to ASCII, word by word. Words
/// without a digit are kept verbatim; whitespace is collapsed to one space.
pub(super) fn unify_digits(text: &str) -> String {
    if NOT_A_NUMBER.contains(&text) {
        return text.to_string();
    }

    text.split_whitespace()
        .map(|word| {
            if !has_digit(word) {
                return word.to_string();
            }
            word.chars()
                .map(|ch| match ch {
                    '\u{066B}' => '.',
                    '\u{066C}' => ',',
                    _ => ascii_digit_for(ch).unwrap_or(ch),
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(super) fn normalize_token(text: &str) -> String {
    if text.contains('%') {
        return text.replace('%', "").trim().to_string();
    }
    if NOT_A_NUMBER.contains(&text) {
        return text.to_string();
    }
    if has_digit(text) {
        return text.replace(',', "").trim().to_string();
    }

    text.trim()
        .chars()
        .map(|ch| if ch.is_ascii_punctuation() { ' ' } else { ch })
        .collect::<String>()
        .replace("  ", " ")
        .trim()
        .to_string()
}

/// `(123)` becomes `-123`, anywhere in the token.
pub(super) fn negate_parenthesized(text: &str) -> String {
    NEGATIVE_PAREN_RE.replace_all(text, "-$1").into_owned()
}

/// Best-effort numeric parse; anything that is not a plain decimal stays text.
pub(super) fn parse_numeric(text: &str) -> CellValue {
    let trimmed = text.trim();
    if NUMERIC_RE.is_match(trimmed)
        && let Ok(number) = trimmed.parse::<f64>()
    {
        return CellValue::Number(number);
    }
    CellValue::text(text)
}

pub(super) fn normalize_scalar(raw: &str) -> CellValue {
    let unified = unify_digits(raw);
    let token = negate_parenthesized(&normalize_token(&unified));
    parse_numeric(&token)
}

/// Header text: digit-unified with whitespace collapsed, punctuation kept.
pub(super) fn clean_label(raw: &str) -> String {
    unify_digits(raw.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negate_parenthesized_handles_integers_and_decimals() {
        assert_eq!(negate_parenthesized("(123)"), "-123");
        assert_eq!(negate_parenthesized("(12.5)"), "-12.5");
        assert_eq!(negate_parenthesized("(abc)"), "(abc)");
        assert_eq!(
            parse_numeric(&negate_parenthesized("(4500)")),
            CellValue::Number(-4500.0)
        );
    }

    #[test]
    fn unify_digits_only_touches_words_with_digits() {
        assert_eq!(unify_digits("۱۴۰۲/۱۲/۲۹"), "1402/12/29");
        assert_eq!(unify_digits("سال ۱۴۰۲"), "سال 1402");
        assert_eq!(unify_digits("درآمدهای   عملیاتی"), "درآمدهای عملیاتی");
        assert_eq!(unify_digits("١٢٫٥"), "12.5");
        assert_eq!(unify_digits("nan"), "nan");
    }

    #[test]
    fn normalize_token_strips_separators_and_punctuation() {
        assert_eq!(normalize_token("12%"), "12");
        assert_eq!(normalize_token("1,234,567"), "1234567");
        assert_eq!(normalize_token("A-12,3"), "A-123");
        assert_eq!(normalize_token("nan"), "nan");
        assert_eq!(normalize_token("Revenue, net."), "Revenue net");
        assert_eq!(normalize_token("سود (زیان) خالص"), "سود زیان خالص");
    }

    #[test]
    fn normalize_scalar_produces_numbers_for_localized_accounting_negatives() {
        assert_eq!(normalize_scalar("(۱,۲۳۴)"), CellValue::Number(-1234.0));
        assert_eq!(normalize_scalar(" 42 "), CellValue::Number(42.0));
        assert_eq!(normalize_scalar("جمع"), CellValue::text("جمع"));
        assert_eq!(normalize_scalar("B-12"), CellValue::text("B-12"));
    }
}
