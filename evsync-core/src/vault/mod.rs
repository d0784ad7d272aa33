//! Personal data vault adapter.

mod client;
mod payload;

pub use client::VaultStore;
pub use payload::{MetaEnvelope, NEWLINE_TOKEN, event_to_payload};
