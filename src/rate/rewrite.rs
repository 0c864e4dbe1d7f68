//! In-place rate rewriting for load posts.
//!
//! Lines are classified by content, not position: the first 💰 line with a
//! `$` amount and no `/mi` is the rate line, the first one with `/mi` is the
//! per-mile line. Only the number on each line changes.

use rust_decimal::Decimal;
use thiserror::Error;

use super::extract::{
    ascii_fold, first_amount, quote_from_text, trip_miles, MONEY_MARKER, PER_MILE_SUFFIX,
};
use super::money::{per_distance, Money, CURRENCY_SYMBOL};

pub const RATE_LABEL: &str = "𝗥𝗮𝘁𝗲";
pub const PER_MILE_LABEL: &str = "𝗣𝗲𝗿 𝗺𝗶𝗹𝗲";

/// Why an `Add`/`Minus` adjustment could not be applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdjustError {
    #[error("no rate found in the post")]
    MissingRate,

    #[error("no trip distance found in the post")]
    MissingDistance,

    #[error("trip distance is zero")]
    ZeroDistance,

    #[error("the adjusted rate would be negative")]
    NegativeRate,

    #[error("the adjusted rate is too large")]
    RateTooLarge,
}

/// Result of applying a rate adjustment to a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjustment {
    pub rate: Money,
    pub per_mile: Money,
    pub text: String,
    /// The post had no usable 💰 lines and a fresh block was appended.
    pub templated: bool,
}

/// Apply `delta` to the post's rate and recompute the per-mile rate.
pub fn adjust_trip(original: &str, delta: Decimal) -> Result<Adjustment, AdjustError> {
    let base_rate = quote_from_text(original)
        .and_then(|q| q.rate)
        .ok_or(AdjustError::MissingRate)?;
    let miles = trip_miles(original).ok_or(AdjustError::MissingDistance)?;
    if miles.is_zero() {
        return Err(AdjustError::ZeroDistance);
    }

    let shifted = base_rate.shifted(delta).ok_or(AdjustError::RateTooLarge)?;
    let rate = Money::new(shifted).ok_or(AdjustError::NegativeRate)?;
    let per_mile = per_distance(rate, miles).ok_or(AdjustError::RateTooLarge)?;

    let (text, templated) = match rewrite_rate_lines(original, rate, per_mile) {
        Some(text) => (text, false),
        None => (templated_rewrite(original, rate, per_mile), true),
    };

    tracing::debug!(%rate, %per_mile, %miles, templated, "Adjusted trip rate");

    Ok(Adjustment {
        rate,
        per_mile,
        text,
        templated,
    })
}

/// Patch the rate and per-mile lines in place.
///
/// Returns `None` when the post has no 💰 price line at all.
pub fn rewrite_rate_lines(original: &str, rate: Money, per_mile: Money) -> Option<String> {
    let mut lines: Vec<String> = original.split('\n').map(str::to_string).collect();

    let mut rate_idx = None;
    let mut per_mile_idx = None;
    for (idx, line) in lines.iter().enumerate() {
        if !line.contains(MONEY_MARKER) || !line.contains(CURRENCY_SYMBOL) {
            continue;
        }
        if ascii_fold(line).to_lowercase().contains(PER_MILE_SUFFIX) {
            per_mile_idx.get_or_insert(idx);
        } else {
            rate_idx.get_or_insert(idx);
        }
    }

    match (rate_idx, per_mile_idx) {
        (None, None) => return None,
        (Some(r), Some(p)) => {
            lines[r] = replace_first_amount(&lines[r], rate);
            lines[p] = replace_first_amount(&lines[p], per_mile);
        }
        (Some(r), None) => {
            lines[r] = replace_first_amount(&lines[r], rate);
            let line = per_mile_line(leading_whitespace(&lines[r]), per_mile);
            lines.insert(r + 1, line);
        }
        (None, Some(p)) => {
            lines[p] = replace_first_amount(&lines[p], per_mile);
            let line = rate_line(leading_whitespace(&lines[p]), rate);
            lines.insert(p, line);
        }
    }

    Some(lines.join("\n"))
}

/// Fallback for posts without 💰 lines: append a labelled price block.
pub fn templated_rewrite(original: &str, rate: Money, per_mile: Money) -> String {
    let block = format!("{}\n{}", rate_line("", rate), per_mile_line("", per_mile));
    let trimmed = original.trim_end();
    if trimmed.is_empty() {
        block
    } else {
        format!("{}\n{}", trimmed, block)
    }
}

fn rate_line(indent: &str, rate: Money) -> String {
    format!("{}{} {}: {}", indent, MONEY_MARKER, RATE_LABEL, rate)
}

fn per_mile_line(indent: &str, per_mile: Money) -> String {
    format!(
        "{}{} {}: {}{}",
        indent, MONEY_MARKER, PER_MILE_LABEL, per_mile, PER_MILE_SUFFIX
    )
}

fn leading_whitespace(line: &str) -> &str {
    let trimmed = line.trim_start();
    &line[..line.len() - trimmed.len()]
}

/// Swap the digits of the first `$` amount, keeping `$`, spacing and suffix.
fn replace_first_amount(line: &str, value: Money) -> String {
    let Some(first) = first_amount(line) else {
        return line.to_string();
    };

    let rendered = if first.grouped {
        value.render_grouped()
    } else {
        value.render_number()
    };

    let mut out = String::with_capacity(line.len() + rendered.len());
    out.push_str(&line[..first.span.start]);
    out.push_str(&rendered);
    out.push_str(&line[first.span.end..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const POST: &str = "🗺 Trip ID: T-1042\n**💰 𝗥𝗮𝘁𝗲: $1,250.00 🔥**\n💰 𝗣𝗲𝗿 𝗺𝗶𝗹𝗲: $ 2.90/mi\n🚛 Trip: 431.63mi\n";

    fn money(raw: &str) -> Money {
        Money::parse(raw).unwrap()
    }

    #[test]
    fn test_rewrite_keeps_decoration() {
        let out = rewrite_rate_lines(POST, money("1300"), money("3.01")).unwrap();
        assert_eq!(
            out,
            "🗺 Trip ID: T-1042\n**💰 𝗥𝗮𝘁𝗲: $1,300.00 🔥**\n💰 𝗣𝗲𝗿 𝗺𝗶𝗹𝗲: $ 3.01/mi\n🚛 Trip: 431.63mi\n"
        );
    }

    #[test]
    fn test_rewrite_with_current_values_is_identity() {
        let out = rewrite_rate_lines(POST, money("1250"), money("2.90")).unwrap();
        assert_eq!(out, POST);
    }

    #[test]
    fn test_rewrite_classifies_by_content() {
        let post = "💰 $2.50/mi\nnotes\n💰 Total $900";
        let out = rewrite_rate_lines(post, money("950"), money("2.64")).unwrap();
        assert_eq!(out, "💰 $2.64/mi\nnotes\n💰 Total $950.00");
    }

    #[test]
    fn test_rewrite_synthesizes_per_mile_line() {
        let post = "  💰 𝗥𝗮𝘁𝗲: $500.00\n🚛 Trip: 250.00mi";
        let out = rewrite_rate_lines(post, money("550"), money("2.2")).unwrap();
        assert_eq!(
            out,
            "  💰 𝗥𝗮𝘁𝗲: $550.00\n  💰 𝗣𝗲𝗿 𝗺𝗶𝗹𝗲: $2.20/mi\n🚛 Trip: 250.00mi"
        );
    }

    #[test]
    fn test_rewrite_fails_without_money_lines() {
        assert!(rewrite_rate_lines("Rate: $500\nTrip: 250mi", money("1"), money("1")).is_none());
    }

    #[test]
    fn test_templated_rewrite() {
        let out = templated_rewrite("Rate: $500\nTrip: 250mi\n", money("550"), money("2.2"));
        assert_eq!(
            out,
            "Rate: $500\nTrip: 250mi\n💰 𝗥𝗮𝘁𝗲: $550.00\n💰 𝗣𝗲𝗿 𝗺𝗶𝗹𝗲: $2.20/mi"
        );
    }

    #[test]
    fn test_adjust_trip_scenario() {
        let post = "💰 𝗥𝗮𝘁𝗲: $500.00\n🚛 Trip: 250.00mi";
        let adj = adjust_trip(post, dec!(50)).unwrap();
        assert_eq!(adj.rate.to_string(), "$550.00");
        assert_eq!(adj.per_mile.to_string(), "$2.20");
        assert!(!adj.templated);

        let lines: Vec<&str> = adj.text.lines().collect();
        assert_eq!(lines[0], "💰 𝗥𝗮𝘁𝗲: $550.00");
        assert_eq!(lines[1], "💰 𝗣𝗲𝗿 𝗺𝗶𝗹𝗲: $2.20/mi");
        assert_eq!(lines[2], "🚛 Trip: 250.00mi");
    }

    #[test]
    fn test_adjust_trip_minus() {
        let adj = adjust_trip(POST, dec!(-250)).unwrap();
        assert_eq!(adj.rate.to_string(), "$1000.00");
        assert_eq!(adj.per_mile.to_string(), "$2.32");
        assert!(adj.text.contains("$1,000.00"));
        assert!(adj.text.contains("$ 2.32/mi"));
    }

    #[test]
    fn test_adjust_trip_errors() {
        assert_eq!(adjust_trip("🚛 Trip: 250mi", dec!(50)), Err(AdjustError::MissingRate));
        assert_eq!(adjust_trip("💰 Rate: $500", dec!(50)), Err(AdjustError::MissingDistance));
        assert_eq!(
            adjust_trip("💰 Rate: $500\n🚛 Trip: 0mi", dec!(50)),
            Err(AdjustError::ZeroDistance)
        );
        assert_eq!(
            adjust_trip("💰 Rate: $500\n🚛 Trip: 250mi", dec!(-600)),
            Err(AdjustError::NegativeRate)
        );
    }

    #[test]
    fn test_adjust_trip_out_of_range() {
        assert_eq!(
            adjust_trip("💰 Rate: $500\n🚛 Trip: 250mi", dec!(79228162514264337593543950335)),
            Err(AdjustError::RateTooLarge)
        );
        assert_eq!(
            adjust_trip("💰 Rate: $9999999999999999999999999999\n🚛 Trip: 0.001mi", dec!(0)),
            Err(AdjustError::RateTooLarge)
        );
    }

    #[test]
    fn test_adjust_trip_templated_fallback() {
        let adj = adjust_trip("Rate: $500\nTrip: 250mi", dec!(0)).unwrap();
        assert!(adj.templated);
        assert!(adj.text.ends_with("💰 𝗣𝗲𝗿 𝗺𝗶𝗹𝗲: $2.00/mi"));
    }
}
