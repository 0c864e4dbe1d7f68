//! Fixed-point money and distance values.
//!
//! Everything is `rust_decimal::Decimal`; no float ever touches a price.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The only currency symbol the bot understands.
pub const CURRENCY_SYMBOL: char = '$';

/// Most fractional digits accepted when parsing an amount.
pub const MAX_PARSED_SCALE: u32 = 4;

/// Fractional digits every amount is rendered with.
pub const DISPLAY_SCALE: u32 = 2;

/// A non-negative monetary amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Wrap a decimal, rejecting negative values.
    pub fn new(value: Decimal) -> Option<Self> {
        if value < Decimal::ZERO {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Parse `1,234.5678`, with or without a leading `$`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().trim_start_matches(CURRENCY_SYMBOL).trim_start();
        parse_fixed_point(raw).and_then(Self::new)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Half-up rounding to two places.
    pub fn round2(self) -> Self {
        Self(round2(self.0))
    }

    /// `round2(self + delta)`, which may be negative. `None` on overflow.
    pub fn shifted(self, delta: Decimal) -> Option<Decimal> {
        self.0.checked_add(delta).map(round2)
    }

    /// `round2(self * (1 + percent / 100))`, or `None` if it overflows.
    pub fn marked_up(self, percent: Decimal) -> Option<Self> {
        let factor = percent
            .checked_div(Decimal::ONE_HUNDRED)
            .and_then(|p| p.checked_add(Decimal::ONE))?;
        self.0.checked_mul(factor).map(round2).and_then(Self::new)
    }

    /// The number at display precision, no symbol: `550.00`.
    pub fn render_number(self) -> String {
        let mut value = round2(self.0);
        value.rescale(DISPLAY_SCALE);
        value.to_string()
    }

    /// Like [`Money::render_number`] with thousands separators: `1,200.00`.
    pub fn render_grouped(self) -> String {
        let plain = self.render_number();
        let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

        let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
        for (i, ch) in int_part.chars().enumerate() {
            if i > 0 && (int_part.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        format!("{}.{}", grouped, frac_part)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CURRENCY_SYMBOL, self.render_number())
    }
}

/// A trip distance in miles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Distance(Decimal);

impl Distance {
    pub fn new(miles: Decimal) -> Option<Self> {
        if miles < Decimal::ZERO {
            None
        } else {
            Some(Self(miles))
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        parse_fixed_point(raw.trim()).and_then(Self::new)
    }

    pub fn miles(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}mi", self.0.normalize())
    }
}

/// A price observation; at least one side is always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuote {
    pub rate: Option<Money>,
    pub per_distance: Option<Money>,
}

impl RateQuote {
    pub fn new(rate: Option<Money>, per_distance: Option<Money>) -> Option<Self> {
        if rate.is_none() && per_distance.is_none() {
            return None;
        }
        Some(Self { rate, per_distance })
    }

    pub fn rate(rate: Money) -> Self {
        Self { rate: Some(rate), per_distance: None }
    }

    pub fn per_distance(per_distance: Money) -> Self {
        Self { rate: None, per_distance: Some(per_distance) }
    }
}

/// `round2(round2(rate) / distance)`; `None` for a zero distance or overflow.
pub fn per_distance(rate: Money, distance: Distance) -> Option<Money> {
    if distance.is_zero() {
        return None;
    }
    let value = rate.round2().value().checked_div(distance.miles())?;
    Money::new(round2(value))
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DISPLAY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Digits with optional thousands separators and up to four decimals.
fn parse_fixed_point(raw: &str) -> Option<Decimal> {
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (raw, None),
    };

    if int_part.is_empty() || !int_part.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit() || c == ',') {
        return None;
    }
    if let Some(frac) = frac_part {
        if frac.is_empty()
            || frac.len() > MAX_PARSED_SCALE as usize
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }
    }

    let digits: String = raw.chars().filter(|c| *c != ',').collect();
    digits.parse::<Decimal>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_amounts() {
        assert_eq!(Money::parse("$500.00").unwrap().value(), dec!(500.00));
        assert_eq!(Money::parse("$ 1,234.5678").unwrap().value(), dec!(1234.5678));
        assert_eq!(Money::parse("18").unwrap().value(), dec!(18));

        assert!(Money::parse("1.23456").is_none());
        assert!(Money::parse("abc").is_none());
        assert!(Money::parse("12.").is_none());
        assert!(Money::parse(",12").is_none());
    }

    #[test]
    fn test_half_up_rounding() {
        assert_eq!(Money::parse("2.205").unwrap().render_number(), "2.21");
        assert_eq!(Money::parse("2.2049").unwrap().render_number(), "2.20");
        assert_eq!(Money::parse("7").unwrap().to_string(), "$7.00");
    }

    #[test]
    fn test_render_grouped() {
        assert_eq!(Money::parse("1200").unwrap().render_grouped(), "1,200.00");
        assert_eq!(Money::parse("1234567.891").unwrap().render_grouped(), "1,234,567.89");
        assert_eq!(Money::parse("999.5").unwrap().render_grouped(), "999.50");
    }

    #[test]
    fn test_shifted() {
        let rate = Money::parse("500").unwrap();
        assert_eq!(rate.shifted(dec!(50)), Some(dec!(550)));
        assert_eq!(rate.shifted(dec!(-500.01)), Some(dec!(-0.01)));
        assert!(Money::new(Decimal::MAX).unwrap().shifted(dec!(1)).is_none());
    }

    #[test]
    fn test_marked_up() {
        let rpm = Money::parse("18").unwrap();
        assert_eq!(rpm.marked_up(dec!(10)).unwrap().to_string(), "$19.80");
        assert_eq!(rpm.marked_up(dec!(13)).unwrap().to_string(), "$20.34");
    }

    #[test]
    fn test_marked_up_overflow() {
        let huge = Money::parse("79228162514264337593543950335").unwrap();
        assert!(huge.marked_up(dec!(10)).is_none());
        assert_eq!(huge.marked_up(Decimal::ZERO), Some(huge));
    }

    #[test]
    fn test_per_distance() {
        let rate = Money::parse("550").unwrap();
        let miles = Distance::parse("250.00").unwrap();
        assert_eq!(per_distance(rate, miles).unwrap().to_string(), "$2.20");

        // 1000 / 431.63 = 2.31679...
        let miles = Distance::parse("431.63").unwrap();
        assert_eq!(per_distance(Money::parse("1000").unwrap(), miles).unwrap().to_string(), "$2.32");

        assert!(per_distance(rate, Distance::parse("0").unwrap()).is_none());
    }
}
