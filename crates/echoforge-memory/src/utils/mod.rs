//! Memory Utilities
//!
//! Hashing, time and validation helpers shared across the crate.

mod hashing;
mod time;
mod validation;

pub use hashing::{content_fingerprint, content_hash};
pub use time::{now_millis, millis_to_datetime};
pub use validation::{validate_entry, validate_query, validate_registration};
