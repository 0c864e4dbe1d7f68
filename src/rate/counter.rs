//! Counter-offer ladder.

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::OnceLock;

use super::extract::PER_MILE_SUFFIX;
use super::money::{Money, RateQuote};

/// Markups offered when nothing is configured.
pub const DEFAULT_MARKUPS: [Decimal; 5] = [dec!(10), dec!(13), dec!(15), dec!(25), dec!(30)];

/// Bare numbers at or below this are read as per-mile rates.
pub const DEFAULT_BARE_NUMBER_CEILING: Decimal = dec!(50);

/// Where a tier sits on the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierRole {
    /// A step we propose.
    Suggested,
    /// The top tier: the counterparty's own ceiling.
    TheirCeiling,
}

impl TierRole {
    pub fn label(&self) -> &'static str {
        match self {
            TierRole::Suggested => "Counter offer",
            TierRole::TheirCeiling => "Their ceiling",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterOffer {
    pub markup: Decimal,
    pub role: TierRole,
    pub rate: Option<Money>,
    pub per_distance: Option<Money>,
}

impl CounterOffer {
    fn price_text(&self) -> String {
        match (self.rate, self.per_distance) {
            (Some(rate), Some(rpm)) => format!("{} ({}{})", rate, rpm, PER_MILE_SUFFIX),
            (Some(rate), None) => rate.to_string(),
            (None, Some(rpm)) => format!("{}{}", rpm, PER_MILE_SUFFIX),
            (None, None) => String::new(),
        }
    }

    /// Header line plus a justification sentence.
    pub fn render(&self) -> String {
        let price = self.price_text();
        let justification = match self.role {
            TierRole::Suggested => format!(
                "We can cover it at {}, which is in line with what this lane is paying today.",
                price
            ),
            TierRole::TheirCeiling => format!(
                "{} is the top of their range; hold here and do not go above it.",
                price
            ),
        };
        format!(
            "📈 +{}% · {}\n{}",
            self.markup.normalize(),
            self.role.label(),
            justification
        )
    }
}

fn bare_price_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(\$)?\s*([0-9][0-9,]*(?:\.[0-9]{1,4})?)\s*(/\s*mi(?:le)?)?\s*$")
            .expect("bare price regex is valid")
    })
}

/// Fixed percentage ladder over a quote.
#[derive(Debug, Clone)]
pub struct CounterOfferLadder {
    markups: Vec<Decimal>,
    bare_number_ceiling: Decimal,
}

impl Default for CounterOfferLadder {
    fn default() -> Self {
        Self::new(DEFAULT_MARKUPS.to_vec(), DEFAULT_BARE_NUMBER_CEILING)
    }
}

impl CounterOfferLadder {
    pub fn new(markups: Vec<Decimal>, bare_number_ceiling: Decimal) -> Self {
        Self {
            markups,
            bare_number_ceiling,
        }
    }

    pub fn markups(&self) -> &[Decimal] {
        &self.markups
    }

    /// Read a one-line price such as `18`, `$1,200` or `2.10/mi`.
    ///
    /// `$` means a total rate and `/mi` a per-mile rate. With neither marker
    /// the ceiling decides.
    pub fn classify_bare(&self, input: &str) -> Option<RateQuote> {
        let input = input.trim();
        if input.contains('\n') {
            return None;
        }

        let caps = bare_price_regex().captures(input)?;
        let value = Money::parse(caps.get(2)?.as_str())?;
        let has_symbol = caps.get(1).is_some();
        let has_suffix = caps.get(3).is_some();

        let quote = if has_suffix {
            RateQuote::per_distance(value)
        } else if has_symbol {
            RateQuote::rate(value)
        } else if value.value() <= self.bare_number_ceiling {
            RateQuote::per_distance(value)
        } else {
            RateQuote::rate(value)
        };
        Some(quote)
    }

    /// One offer per markup, in ladder order.
    ///
    /// `None` when any tier would overflow the decimal range.
    pub fn offers(&self, quote: &RateQuote) -> Option<Vec<CounterOffer>> {
        let last = self.markups.len().saturating_sub(1);
        self.markups
            .iter()
            .enumerate()
            .map(|(i, pct)| {
                let rate = match quote.rate {
                    Some(r) => Some(r.marked_up(*pct)?),
                    None => None,
                };
                let per_distance = match quote.per_distance {
                    Some(r) => Some(r.marked_up(*pct)?),
                    None => None,
                };
                Some(CounterOffer {
                    markup: *pct,
                    role: if i == last {
                        TierRole::TheirCeiling
                    } else {
                        TierRole::Suggested
                    },
                    rate,
                    per_distance,
                })
            })
            .collect()
    }

    /// All tiers as one message, blank line between blocks.
    pub fn render(&self, quote: &RateQuote) -> Option<String> {
        let offers = self.offers(quote)?;
        Some(
            offers
                .iter()
                .map(CounterOffer::render)
                .collect::<Vec<_>>()
                .join("\n\n"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_bare_number() {
        let ladder = CounterOfferLadder::default();

        let quote = ladder.classify_bare("18").unwrap();
        assert_eq!(quote.per_distance.unwrap().value(), dec!(18));
        assert!(quote.rate.is_none());

        let quote = ladder.classify_bare("50").unwrap();
        assert!(quote.per_distance.is_some());

        let quote = ladder.classify_bare("1200").unwrap();
        assert_eq!(quote.rate.unwrap().value(), dec!(1200));
    }

    #[test]
    fn test_classify_markers_override_ceiling() {
        let ladder = CounterOfferLadder::default();
        assert!(ladder.classify_bare("$18").unwrap().rate.is_some());
        assert!(ladder.classify_bare("120 /mi").unwrap().per_distance.is_some());
        assert!(ladder.classify_bare("$2.10/mi").unwrap().per_distance.is_some());
    }

    #[test]
    fn test_classify_rejects_non_prices() {
        let ladder = CounterOfferLadder::default();
        assert!(ladder.classify_bare("Add 50").is_none());
        assert!(ladder.classify_bare("18\n19").is_none());
        assert!(ladder.classify_bare("").is_none());
    }

    #[test]
    fn test_offers_ladder() {
        let ladder = CounterOfferLadder::default();
        let offers = ladder
            .offers(&RateQuote::per_distance(Money::parse("18").unwrap()))
            .unwrap();
        assert_eq!(offers.len(), 5);
        assert_eq!(offers[0].per_distance.unwrap().to_string(), "$19.80");
        assert_eq!(offers[4].per_distance.unwrap().to_string(), "$23.40");
        assert_eq!(offers[0].role, TierRole::Suggested);
        assert_eq!(offers[4].role, TierRole::TheirCeiling);
    }

    #[test]
    fn test_offers_both_sides() {
        let ladder = CounterOfferLadder::new(vec![dec!(10)], dec!(50));
        let quote = RateQuote::new(Money::parse("500"), Money::parse("2.00")).unwrap();
        let offers = ladder.offers(&quote).unwrap();
        assert_eq!(offers[0].rate.unwrap().to_string(), "$550.00");
        assert_eq!(offers[0].per_distance.unwrap().to_string(), "$2.20");
        assert_eq!(offers[0].role, TierRole::TheirCeiling);
    }

    #[test]
    fn test_render() {
        let ladder = CounterOfferLadder::default();
        let text = ladder
            .render(&RateQuote::per_distance(Money::parse("18").unwrap()))
            .unwrap();
        assert!(text.starts_with("📈 +10% · Counter offer\n"));
        assert!(text.contains("$19.80/mi"));
        assert!(text.contains("📈 +30% · Their ceiling"));
        assert_eq!(text.matches("📈").count(), 5);
    }

    #[test]
    fn test_ladder_refuses_overflowing_price() {
        let ladder = CounterOfferLadder::default();
        let quote = ladder.classify_bare("79228162514264337593543950335").unwrap();
        assert!(quote.rate.is_some());
        assert!(ladder.offers(&quote).is_none());
        assert!(ladder.render(&quote).is_none());
    }
}
