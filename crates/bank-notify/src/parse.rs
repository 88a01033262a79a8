//! Per-bank notification grammars.
//!
//! Each grammar is a marker phrase followed by an amount literal, with an
//! optional `dd.mm.yyyy HH:MM:SS` settlement timestamp anywhere in the body.
//! Scanning is plain substring work; bank notification formats are too
//! loose for anything stricter to survive contact with production mail.

use crate::amount::normalize_amount;
use crate::types::{Bank, ParsedNotification};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;

const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M:%S";
const TIMESTAMP_LEN: usize = 19;

/// Parse a notification body.
///
/// With a hint only that bank's grammar is used; otherwise every known
/// grammar is tried in [`Bank::ALL`] order and the first match wins, so the
/// result is deterministic for a given body.
pub fn parse(text: &str, hint: Option<Bank>) -> Option<ParsedNotification> {
    match hint {
        Some(bank) => parse_as(text, bank),
        None => Bank::ALL.iter().find_map(|bank| parse_as(text, *bank)),
    }
}

/// Map a sender address to a bank with a known grammar.
pub fn bank_hint(sender: &str) -> Option<Bank> {
    let sender = sender.to_ascii_lowercase();
    if sender.contains("meridian") {
        Some(Bank::Meridian)
    } else if sender.contains("unity") {
        Some(Bank::Unity)
    } else if sender.contains("crown") {
        Some(Bank::Crown)
    } else {
        None
    }
}

fn parse_as(text: &str, bank: Bank) -> Option<ParsedNotification> {
    let marker = match bank {
        Bank::Meridian => "Amount:",
        Bank::Unity => "Credit:",
        Bank::Crown => "You have received",
    };
    let amount = amount_after(text, marker)?;
    Some(ParsedNotification {
        amount,
        occurred_at: find_timestamp(text),
        bank,
    })
}

/// Extract the amount literal following `marker`.
///
/// Thousands groups may be space-separated ("1 240.06"), so a following
/// token that opens with exactly three digits continues the literal as long
/// as the part consumed so far has no decimal separator yet.
fn amount_after(text: &str, marker: &str) -> Option<Decimal> {
    let start = text.find(marker)? + marker.len();
    let mut tokens = text[start..].split_whitespace().peekable();
    let mut literal = tokens.next()?.trim_end_matches(['.', ',']).to_string();

    if !literal.chars().all(is_amount_char) {
        return None;
    }

    while literal.chars().all(|c| c.is_ascii_digit()) {
        match tokens.peek() {
            Some(next) if continues_group(next) => {
                let next = tokens.next()?;
                literal.push(' ');
                literal.push_str(next.trim_end_matches(['.', ',']));
            }
            _ => break,
        }
    }

    normalize_amount(&literal)
}

fn is_amount_char(c: char) -> bool {
    c.is_ascii_digit() || c == ',' || c == '.'
}

fn continues_group(token: &str) -> bool {
    let leading_digits = token.chars().take_while(|c| c.is_ascii_digit()).count();
    leading_digits == 3 && token.chars().all(is_amount_char)
}

/// First `dd.mm.yyyy HH:MM:SS` substring, if any.
fn find_timestamp(text: &str) -> Option<NaiveDateTime> {
    let bytes = text.as_bytes();
    (0..bytes.len().saturating_sub(TIMESTAMP_LEN - 1)).find_map(|i| {
        if !bytes[i].is_ascii_digit() {
            return None;
        }
        let window = text.get(i..i + TIMESTAMP_LEN)?;
        NaiveDateTime::parse_from_str(window, TIMESTAMP_FORMAT).ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn ts(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).unwrap()
    }

    #[test]
    fn meridian_grammar() {
        let body = "Meridian Bank. Amount: 1,240.06 GEL. Date: 05.08.2026 14:32:11. Ref 99122";
        let parsed = parse(body, Some(Bank::Meridian)).unwrap();
        assert_eq!(parsed.amount, dec!(1240.06));
        assert_eq!(parsed.occurred_at, Some(ts("05.08.2026 14:32:11")));
        assert_eq!(parsed.bank, Bank::Meridian);
    }

    #[test]
    fn unity_grammar_space_grouped() {
        let body = "UnityPay notice. Credit: 1 240.06 GEL 05.08.2026 14:32:11 acc *4411";
        let parsed = parse(body, Some(Bank::Unity)).unwrap();
        assert_eq!(parsed.amount, dec!(1240.06));
        assert_eq!(parsed.occurred_at, Some(ts("05.08.2026 14:32:11")));
    }

    #[test]
    fn crown_grammar() {
        let body = "CrownBank: You have received 500.00 GEL on 05.08.2026 14:32:11";
        let parsed = parse(body, Some(Bank::Crown)).unwrap();
        assert_eq!(parsed.amount, dec!(500.00));
        assert_eq!(parsed.bank, Bank::Crown);
    }

    #[test]
    fn missing_timestamp_is_none() {
        let body = "CrownBank: You have received 75.50 GEL today";
        let parsed = parse(body, Some(Bank::Crown)).unwrap();
        assert_eq!(parsed.amount, dec!(75.50));
        assert_eq!(parsed.occurred_at, None);
    }

    #[test]
    fn unknown_bank_tries_grammars_in_order() {
        let body = "Credit: 99.95 GEL 01.02.2026 09:00:00";
        let parsed = parse(body, None).unwrap();
        assert_eq!(parsed.bank, Bank::Unity);
        assert_eq!(parsed.amount, dec!(99.95));
    }

    #[test]
    fn amount_not_confused_with_trailing_date() {
        let body = "Credit: 240.06 05.08.2026 14:32:11";
        let parsed = parse(body, Some(Bank::Unity)).unwrap();
        assert_eq!(parsed.amount, dec!(240.06));
    }

    #[test]
    fn bare_grouped_integer_stops_before_date() {
        // "500" must not swallow the date tokens that follow it.
        let body = "Credit: 500 GEL 05.08.2026 14:32:11";
        let parsed = parse(body, Some(Bank::Unity)).unwrap();
        assert_eq!(parsed.amount, dec!(500));
        assert_eq!(parsed.occurred_at, Some(ts("05.08.2026 14:32:11")));
    }

    #[test]
    fn rejects_unrecognized_shapes() {
        assert_eq!(parse("Your OTP code is 443211", None), None);
        assert_eq!(parse("Amount: zero GEL", Some(Bank::Meridian)), None);
        assert_eq!(parse("", None), None);
    }

    #[test]
    fn wrong_hint_does_not_cross_grammars() {
        let body = "Meridian Bank. Amount: 10.00 GEL.";
        assert_eq!(parse(body, Some(Bank::Crown)), None);
    }

    #[test]
    fn hint_from_sender_address() {
        assert_eq!(bank_hint("alerts@meridianbank.example"), Some(Bank::Meridian));
        assert_eq!(bank_hint("no-reply@UNITYPAY.example"), Some(Bank::Unity));
        assert_eq!(bank_hint("notify@crownbank.example"), Some(Bank::Crown));
        assert_eq!(bank_hint("spam@somewhere.example"), None);
    }

    #[test]
    fn timestamp_extraction_ignores_amounts() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 5)
            .unwrap()
            .and_hms_opt(14, 32, 11)
            .unwrap();
        assert_eq!(
            find_timestamp("got 1,240.06 at 05.08.2026 14:32:11 ok"),
            Some(date)
        );
        assert_eq!(find_timestamp("no dates here"), None);
    }
}
