//! Locale-tolerant amount normalization.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Normalize a locale-formatted amount literal and parse it.
///
/// Spaces (including NBSP) are thousands separators. When both `,` and `.`
/// appear, the rightmost one is the decimal separator and the other is
/// grouping. A lone separator is decimal when it occurs once with one or two
/// trailing digits, grouping otherwise. Zero, negative, and unparseable
/// input yields `None`.
pub fn normalize_amount(raw: &str) -> Option<Decimal> {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '\u{a0}')
        .collect();

    if compact.is_empty()
        || !compact
            .chars()
            .all(|c| c.is_ascii_digit() || c == ',' || c == '.')
    {
        return None;
    }

    let canonical = match (compact.rfind(','), compact.rfind('.')) {
        (Some(comma), Some(dot)) => {
            let (decimal, grouping) = if dot > comma { ('.', ',') } else { (',', '.') };
            rebuild(&compact, decimal, grouping)
        }
        (Some(_), None) => single_separator(&compact, ','),
        (None, Some(_)) => single_separator(&compact, '.'),
        (None, None) => compact,
    };

    let value = Decimal::from_str(&canonical).ok()?;
    if value <= Decimal::ZERO {
        return None;
    }
    Some(value)
}

fn rebuild(s: &str, decimal: char, grouping: char) -> String {
    s.chars()
        .filter(|c| *c != grouping)
        .map(|c| if c == decimal { '.' } else { c })
        .collect()
}

fn single_separator(s: &str, sep: char) -> String {
    let occurrences = s.matches(sep).count();
    let trailing = s.rfind(sep).map(|i| s.len() - i - 1).unwrap_or(0);
    if occurrences == 1 && (1..=2).contains(&trailing) {
        s.chars().map(|c| if c == sep { '.' } else { c }).collect()
    } else {
        s.chars().filter(|c| *c != sep).collect()
    }
}
