//! Source-neutral event types.
//!
//! Both stores convert their native representation (vault envelope payloads,
//! iCalendar VEVENTs) into [`Event`], and the reconciler works exclusively
//! with [`EventMap`]s of them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Color used when neither source specifies one.
pub const DEFAULT_COLOR: &str = "blue";

/// A calendar event as seen by the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Stable identifier shared by both sources; the reconciliation key.
    pub uid: String,
    pub start: EventTime,
    pub end: EventTime,
    pub title: String,
    pub description: String,
    pub color: String,
    /// Recurrence is carried as a flag only; rules are never expanded.
    pub recurrence: bool,
}

impl Event {
    /// Build an event with the default description, color and recurrence.
    pub fn new(
        uid: impl Into<String>,
        start: EventTime,
        end: EventTime,
        title: impl Into<String>,
    ) -> Self {
        Event {
            uid: uid.into(),
            start,
            end,
            title: title.into(),
            description: String::new(),
            color: DEFAULT_COLOR.to_string(),
            recurrence: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventTime {
    /// All-day value (`VALUE=DATE` / `YYYY-MM-DD`).
    Date(NaiveDate),
    DateTimeUtc(DateTime<Utc>),
    /// Date-time with an explicit numeric offset, as stored in the vault.
    DateTimeOffset(DateTime<FixedOffset>),
    /// Local time without any zone information.
    DateTimeFloating(NaiveDateTime),
    /// Local time in a named zone (`TZID=Europe/Oslo`).
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
}

impl EventTime {
    /// Render as ISO-8601 the way the vault stores timestamps.
    ///
    /// Dates become `YYYY-MM-DD`, aware date-times carry a `+HH:MM` offset,
    /// floating ones carry none. Zoned values are resolved to their offset;
    /// an unknown TZID is written as floating time.
    pub fn to_iso(&self) -> String {
        match self {
            EventTime::Date(d) => d.format("%Y-%m-%d").to_string(),
            EventTime::DateTimeUtc(dt) => format_offset(&dt.fixed_offset()),
            EventTime::DateTimeOffset(dt) => format_offset(dt),
            EventTime::DateTimeFloating(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            EventTime::DateTimeZoned { datetime, tzid } => match tzid.parse::<chrono_tz::Tz>() {
                Ok(tz) => match tz.from_local_datetime(datetime).earliest() {
                    Some(local) => format_offset(&local.fixed_offset()),
                    None => datetime.format("%Y-%m-%dT%H:%M:%S").to_string(),
                },
                Err(_) => {
                    tracing::warn!(tzid = %tzid, "unknown timezone, writing floating time");
                    datetime.format("%Y-%m-%dT%H:%M:%S").to_string()
                }
            },
        }
    }

    /// Parse an ISO-8601 date or date-time as produced by the vault.
    ///
    /// Accepts `YYYY-MM-DD`, and date-times with a `T` or space separator,
    /// optional fractional seconds, and an optional `Z`/`+HH:MM` offset.
    pub fn parse_iso(value: &str) -> SyncResult<Self> {
        let value = value.trim();

        if value.len() == 10 {
            return NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(EventTime::Date)
                .map_err(|e| SyncError::timestamp(value, e.to_string()));
        }

        let normalized = match value.as_bytes().get(10) {
            Some(b' ') => format!("{}T{}", &value[..10], &value[11..]),
            _ => value.to_string(),
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
            return Ok(from_fixed(dt));
        }
        if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M%:z") {
            return Ok(from_fixed(dt));
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, format) {
                return Ok(EventTime::DateTimeFloating(dt));
            }
        }

        Err(SyncError::timestamp(value, "not an ISO-8601 date or date-time"))
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::DateTimeZoned { datetime, tzid } => {
                write!(f, "{} ({})", datetime.format("%Y-%m-%dT%H:%M:%S"), tzid)
            }
            other => f.write_str(&other.to_iso()),
        }
    }
}

fn format_offset(dt: &DateTime<FixedOffset>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

fn from_fixed(dt: DateTime<FixedOffset>) -> EventTime {
    if dt.offset().local_minus_utc() == 0 {
        EventTime::DateTimeUtc(dt.with_timezone(&Utc))
    } else {
        EventTime::DateTimeOffset(dt)
    }
}

/// Events of one source keyed by uid.
///
/// Inserting an event whose uid is already present replaces the earlier one
/// (last write wins). Iteration is ordered by uid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventMap(BTreeMap<String, Event>);

impl EventMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keyed by `event.uid`, returning the event it replaced.
    pub fn insert(&mut self, event: Event) -> Option<Event> {
        self.0.insert(event.uid.clone(), event)
    }

    pub fn get(&self, uid: &str) -> Option<&Event> {
        self.0.get(uid)
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.0.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn uids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.0.values()
    }
}

impl FromIterator<Event> for EventMap {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        let mut map = EventMap::new();
        for event in iter {
            map.insert(event);
        }
        map
    }
}

impl Extend<Event> for EventMap {
    fn extend<I: IntoIterator<Item = Event>>(&mut self, iter: I) {
        for event in iter {
            self.insert(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floating(s: &str) -> EventTime {
        EventTime::DateTimeFloating(NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap())
    }

    #[test]
    fn insert_duplicate_uid_keeps_last() {
        let mut map = EventMap::new();
        let start = floating("2024-01-01T10:00:00");
        let end = floating("2024-01-01T11:00:00");

        assert!(map.insert(Event::new("Z", start.clone(), end.clone(), "first")).is_none());
        let replaced = map.insert(Event::new("Z", start, end, "second"));

        assert_eq!(replaced.map(|e| e.title), Some("first".to_string()));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("Z").unwrap().title, "second");
    }

    #[test]
    fn parse_iso_date_only() {
        assert_eq!(
            EventTime::parse_iso("2024-03-05").unwrap(),
            EventTime::Date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
        );
    }

    #[test]
    fn parse_iso_with_offset_and_utc() {
        let offset = EventTime::parse_iso("2024-01-01T10:00:00+02:00").unwrap();
        assert!(matches!(offset, EventTime::DateTimeOffset(_)));
        assert_eq!(offset.to_iso(), "2024-01-01T10:00:00+02:00");

        let utc = EventTime::parse_iso("2024-01-01T10:00:00+00:00").unwrap();
        assert!(matches!(utc, EventTime::DateTimeUtc(_)));

        let zulu = EventTime::parse_iso("2024-01-01T10:00:00Z").unwrap();
        assert_eq!(utc, zulu);
    }

    #[test]
    fn parse_iso_floating_with_space_separator() {
        assert_eq!(
            EventTime::parse_iso("2024-01-01 10:00:00").unwrap(),
            floating("2024-01-01T10:00:00")
        );
        assert_eq!(
            EventTime::parse_iso("2024-01-01T10:00").unwrap(),
            floating("2024-01-01T10:00:00")
        );
    }

    #[test]
    fn parse_iso_rejects_garbage() {
        let err = EventTime::parse_iso("next tuesday").unwrap_err();
        assert!(matches!(err, SyncError::Timestamp { .. }));
    }

    #[test]
    fn zoned_time_resolves_offset() {
        let zoned = EventTime::DateTimeZoned {
            datetime: NaiveDateTime::parse_from_str("2024-07-01T10:00:00", "%Y-%m-%dT%H:%M:%S")
                .unwrap(),
            tzid: "Europe/Oslo".to_string(),
        };
        assert_eq!(zoned.to_iso(), "2024-07-01T10:00:00+02:00");
    }

    #[test]
    fn unknown_zone_falls_back_to_floating() {
        let zoned = EventTime::DateTimeZoned {
            datetime: NaiveDateTime::parse_from_str("2024-07-01T10:00:00", "%Y-%m-%dT%H:%M:%S")
                .unwrap(),
            tzid: "Mars/Olympus".to_string(),
        };
        assert_eq!(zoned.to_iso(), "2024-07-01T10:00:00");
    }
}
