//! Amount and distance extraction from free-form load posts.

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

use super::money::{Distance, Money, RateQuote};

/// Glyph that marks the price lines of a post.
pub const MONEY_MARKER: &str = "💰";

/// Glyph that marks the trip distance line.
pub const TRUCK_MARKER: &str = "🚛";

/// Suffix that makes an amount a per-mile rate.
pub const PER_MILE_SUFFIX: &str = "/mi";

/// One `$` amount found in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountMatch {
    /// Byte range of the numeric part (after `$` and any spaces).
    pub span: Range<usize>,
    pub value: Money,
    /// The original used thousands separators.
    pub grouped: bool,
    /// The amount is followed by `/mi`.
    pub per_distance: bool,
}

fn amount_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\$\s*([0-9][0-9,]*(?:\.[0-9]{1,4})?)(\s*/\s*mi\b)?")
            .expect("amount regex is valid")
    })
}

fn truck_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)🚛[^\n]*?([0-9][0-9,]*(?:\.[0-9]{1,3})?)\s*mi(?:les?)?\b")
            .expect("truck line regex is valid")
    })
}

fn trip_label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)\bTrip\s*:\s*([0-9][0-9,]*(?:\.[0-9]{1,3})?)\s*mi(?:les?)?\b")
            .expect("trip label regex is valid")
    })
}

/// Fold styled unicode down to plain ASCII (`𝗧𝗿𝗶𝗽` becomes `Trip`).
///
/// Anything without an ASCII decomposition is dropped, emoji included.
pub fn ascii_fold(text: &str) -> String {
    text.nfkd().filter(|c| c.is_ascii()).collect()
}

/// Every `$` amount in document order.
pub fn amounts(text: &str) -> Vec<AmountMatch> {
    amount_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let number = caps.get(1)?;
            let value = Money::parse(number.as_str())?;
            Some(AmountMatch {
                span: number.range(),
                value,
                grouped: number.as_str().contains(','),
                per_distance: caps.get(2).is_some(),
            })
        })
        .collect()
}

/// The first amount, for single-value contexts.
pub fn first_amount(text: &str) -> Option<AmountMatch> {
    amounts(text).into_iter().next()
}

/// The first two amounts as (rate, per-mile) candidates.
pub fn first_two_amounts(text: &str) -> (Option<Money>, Option<Money>) {
    let mut found = amounts(text).into_iter().map(|m| m.value);
    (found.next(), found.next())
}

/// Trip miles from the 🚛 line, falling back to a `Trip: N mi` label.
pub fn trip_miles(text: &str) -> Option<Distance> {
    if let Some(caps) = truck_line_regex().captures(text) {
        return caps.get(1).and_then(|m| Distance::parse(m.as_str()));
    }

    let folded = ascii_fold(text);
    let caps = trip_label_regex().captures(&folded)?;
    caps.get(1).and_then(|m| Distance::parse(m.as_str()))
}

/// Build a quote from a post.
///
/// Suffixes win: the first plain amount is the rate and the first `/mi`
/// amount is the per-mile rate. Without any suffix the first two amounts are
/// taken positionally.
pub fn quote_from_text(text: &str) -> Option<RateQuote> {
    let found = amounts(text);
    if !found.iter().any(|m| m.per_distance) {
        let (rate, per_distance) = first_two_amounts(text);
        return RateQuote::new(rate, per_distance);
    }

    let rate = found.iter().find(|m| !m.per_distance).map(|m| m.value);
    let per_distance = found.iter().find(|m| m.per_distance).map(|m| m.value);
    RateQuote::new(rate, per_distance)
}
