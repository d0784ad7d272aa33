//! Core of evsync: two-way presence sync between a personal data vault and
//! a Nextcloud calendar.
//!
//! - `event` holds the source-neutral [`Event`] and uid-keyed [`EventMap`]
//! - `vault` and `caldav` adapt each backing store to [`EventStore`]
//! - `reconcile` and `sync` compute and apply what is missing on each side

pub mod caldav;
pub mod config;
pub mod error;
pub mod event;
pub mod ics;
pub mod reconcile;
mod retry;
pub mod store;
pub mod sync;
pub mod vault;

pub use error::{SyncError, SyncResult};
pub use event::{Event, EventMap, EventTime};
pub use store::EventStore;
