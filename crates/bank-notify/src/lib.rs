//! Bank transfer notification parsing.
//!
//! Turns raw notification text from supported banks into a normalized
//! amount, settlement timestamp, and bank identity. Parsing is pure and
//! deterministic: an unrecognized shape yields `None` and the caller decides
//! what to do with the message.

mod amount;
mod parse;
mod types;

pub use amount::normalize_amount;
pub use parse::{bank_hint, parse};
pub use types::{Bank, ParsedNotification};
