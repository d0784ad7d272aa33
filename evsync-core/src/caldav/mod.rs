//! Nextcloud calendar access over CalDAV.

mod client;
mod multistatus;

pub use client::{CalDavCalendar, DavClient};
pub use multistatus::{CalendarCollection, CalendarResource};
