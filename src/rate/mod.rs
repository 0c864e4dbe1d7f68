//! Rate handling - extraction, in-place rewriting and counter offers.

pub mod counter;
pub mod extract;
pub mod money;
pub mod rewrite;

pub use counter::{CounterOffer, CounterOfferLadder, TierRole};
pub use money::{per_distance, Distance, Money, RateQuote};
pub use rewrite::{adjust_trip, AdjustError, Adjustment};
