//! Core module - engine state, the intent router and the outbound seam.

pub mod outbox;
pub mod router;
pub mod state;

pub use outbox::{Button, Control, Outbound, Outbox};
pub use router::{CallbackEvent, Handled, Inbound, Router};
pub use state::EngineState;
