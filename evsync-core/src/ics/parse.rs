//! ICS parsing using the icalendar crate's parser.

use chrono::Duration;
use icalendar::{
    DatePerhapsTime,
    parser::{Component, Property, read_calendar, unfold},
};

use crate::error::{SyncError, SyncResult};
use crate::event::{DEFAULT_COLOR, Event, EventTime};

/// Parse every VEVENT in an iCalendar payload.
///
/// A single calendar object may carry several VEVENTs; all of them are
/// returned in document order. VEVENTs without a UID are skipped since they
/// cannot be reconciled. Missing or malformed DTSTART is an error.
pub fn parse_events(content: &str) -> SyncResult<Vec<Event>> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| SyncError::IcsParse(e.to_string()))?;

    let mut events = Vec::new();
    for vevent in calendar.components.iter().filter(|c| c.name == "VEVENT") {
        match parse_vevent(vevent)? {
            Some(event) => events.push(event),
            None => tracing::warn!("skipping VEVENT without UID"),
        }
    }

    Ok(events)
}

fn parse_vevent(vevent: &Component) -> SyncResult<Option<Event>> {
    let Some(uid) = vevent.find_prop("UID").map(|p| p.val.to_string()) else {
        return Ok(None);
    };
    if uid.trim().is_empty() {
        return Ok(None);
    }

    let start = vevent
        .find_prop("DTSTART")
        .ok_or_else(|| SyncError::IcsParse(format!("event {uid} has no DTSTART")))
        .and_then(|p| to_event_time(&uid, p))?;

    let end = match vevent.find_prop("DTEND") {
        Some(prop) => to_event_time(&uid, prop)?,
        None => implied_end(&uid, vevent, &start)?,
    };

    let title = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_default();
    let description = vevent
        .find_prop("DESCRIPTION")
        .map(|p| p.val.to_string())
        .unwrap_or_default();
    let color = vevent
        .find_prop("COLOR")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| DEFAULT_COLOR.to_string());
    let recurrence = vevent.find_prop("RRULE").is_some();

    Ok(Some(Event {
        uid,
        start,
        end,
        title,
        description,
        color,
        recurrence,
    }))
}

/// Convert a DTSTART/DTEND property, preserving timezone info
fn to_event_time(uid: &str, prop: &Property) -> SyncResult<EventTime> {
    let dpt = DatePerhapsTime::try_from(prop).map_err(|_| {
        SyncError::timestamp(
            prop.val.to_string(),
            format!("unparseable {} in event {uid}", prop.name),
        )
    })?;

    Ok(match dpt {
        DatePerhapsTime::Date(d) => EventTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            icalendar::CalendarDateTime::Utc(dt) => EventTime::DateTimeUtc(dt),
            icalendar::CalendarDateTime::Floating(naive) => EventTime::DateTimeFloating(naive),
            icalendar::CalendarDateTime::WithTimezone { date_time, tzid } => {
                EventTime::DateTimeZoned {
                    datetime: date_time,
                    tzid,
                }
            }
        },
    })
}

/// End time for a VEVENT without DTEND (RFC 5545 3.6.1).
fn implied_end(uid: &str, vevent: &Component, start: &EventTime) -> SyncResult<EventTime> {
    if let Some(prop) = vevent.find_prop("DURATION") {
        let duration = parse_duration(prop.val.as_ref())
            .ok_or_else(|| SyncError::IcsParse(format!("invalid DURATION in event {uid}")))?;
        return shift(uid, start, duration);
    }

    match start {
        EventTime::Date(_) => shift(uid, start, Duration::days(1)),
        other => Ok(other.clone()),
    }
}

/// Parse an iCalendar DURATION value (`PT1H`, `-P1D`, `P2W`).
fn parse_duration(value: &str) -> Option<Duration> {
    let negative = value.starts_with('-');
    let iso = value.trim_start_matches(['-', '+']);

    let duration = iso8601::duration(iso).ok()?;
    let std_duration: std::time::Duration = duration.into();
    let duration = Duration::from_std(std_duration).ok()?;

    Some(if negative { -duration } else { duration })
}

fn shift(uid: &str, time: &EventTime, by: Duration) -> SyncResult<EventTime> {
    let shifted = match time {
        EventTime::Date(d) => d
            .checked_add_signed(Duration::days(by.num_days()))
            .map(EventTime::Date),
        EventTime::DateTimeUtc(dt) => dt.checked_add_signed(by).map(EventTime::DateTimeUtc),
        EventTime::DateTimeOffset(dt) => dt.checked_add_signed(by).map(EventTime::DateTimeOffset),
        EventTime::DateTimeFloating(dt) => {
            dt.checked_add_signed(by).map(EventTime::DateTimeFloating)
        }
        EventTime::DateTimeZoned { datetime, tzid } => {
            datetime
                .checked_add_signed(by)
                .map(|datetime| EventTime::DateTimeZoned {
                    datetime,
                    tzid: tzid.clone(),
                })
        }
    };

    shifted.ok_or_else(|| SyncError::IcsParse(format!("end of event {uid} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};

    fn naive(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    #[test]
    fn test_parse_minimal_event_uses_defaults() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:X\r\n\
DTSTART:20240101T100000\r\n\
DTEND:20240101T110000\r\n\
SUMMARY:Meeting\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let events = parse_events(ics).expect("Should parse");
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.uid, "X");
        assert_eq!(event.start, EventTime::DateTimeFloating(naive("2024-01-01T10:00:00")));
        assert_eq!(event.end, EventTime::DateTimeFloating(naive("2024-01-01T11:00:00")));
        assert_eq!(event.title, "Meeting");
        assert_eq!(event.color, "blue");
        assert_eq!(event.description, "");
        assert!(!event.recurrence);
    }

    #[test]
    fn test_parse_multiple_vevents_in_one_payload() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:first
DTSTART:20240101T100000Z
DTEND:20240101T110000Z
SUMMARY:One
END:VEVENT
BEGIN:VEVENT
UID:second
DTSTART:20240102T100000Z
DTEND:20240102T110000Z
SUMMARY:Two
COLOR:red
END:VEVENT
END:VCALENDAR"#;

        let events = parse_events(ics).expect("Should parse");
        let uids: Vec<_> = events.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(uids, vec!["first", "second"]);
        assert_eq!(
            events[0].start,
            EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(events[1].color, "red");
    }

    #[test]
    fn test_parse_preserves_tzid_and_description() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:zoned
DTSTART;TZID=Europe/Oslo:20240601T090000
DTEND;TZID=Europe/Oslo:20240601T100000
SUMMARY:Standup\, daily
DESCRIPTION:Line1\nLine2
END:VEVENT
END:VCALENDAR"#;

        let events = parse_events(ics).expect("Should parse");
        let event = &events[0];
        match &event.start {
            EventTime::DateTimeZoned { tzid, datetime } => {
                assert_eq!(tzid, "Europe/Oslo");
                assert_eq!(*datetime, naive("2024-06-01T09:00:00"));
            }
            other => panic!("Expected DateTimeZoned, got {:?}", other),
        }
        assert_eq!(event.title, "Standup, daily");
        assert_eq!(event.description, "Line1\nLine2");
    }

    #[test]
    fn test_parse_skips_event_without_uid() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
DTSTART:20240101T100000Z
DTEND:20240101T110000Z
SUMMARY:Anonymous
END:VEVENT
END:VCALENDAR"#;

        assert!(parse_events(ics).expect("Should parse").is_empty());
    }

    #[test]
    fn test_missing_dtend_uses_duration() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:dur
DTSTART:20240101T100000Z
DURATION:PT90M
SUMMARY:Long
END:VEVENT
END:VCALENDAR"#;

        let events = parse_events(ics).expect("Should parse");
        assert_eq!(
            events[0].end,
            EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 1, 1, 11, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_all_day_without_dtend_lasts_one_day() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:allday
DTSTART;VALUE=DATE:20240301
SUMMARY:Holiday
END:VEVENT
END:VCALENDAR"#;

        let events = parse_events(ics).expect("Should parse");
        assert_eq!(
            events[0].end,
            EventTime::Date(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap())
        );
    }

    #[test]
    fn test_missing_dtstart_is_an_error() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:broken
SUMMARY:No start
END:VEVENT
END:VCALENDAR"#;

        assert!(matches!(parse_events(ics), Err(SyncError::IcsParse(_))));
    }

    #[test]
    fn test_huge_duration_is_an_error() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:forever
DTSTART:20240101T100000Z
DURATION:P99999999W
SUMMARY:Forever
END:VEVENT
END:VCALENDAR"#;

        assert!(matches!(parse_events(ics), Err(SyncError::IcsParse(_))));
    }

    #[test]
    fn test_escaped_backslashes_are_decoded_once() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:paths
DTSTART:20240101T100000Z
DTEND:20240101T110000Z
SUMMARY:C:\\new folder
DESCRIPTION:a\\\,b
END:VEVENT
END:VCALENDAR"#;

        let events = parse_events(ics).expect("Should parse");
        assert_eq!(events[0].title, "C:\\new folder");
        assert_eq!(events[0].description, "a\\,b");
    }

    #[test]
    fn test_generated_title_survives_round_trip() {
        let start = EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
        let end = EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap());
        let event = Event::new("rt", start, end, "C:\\new, folder; v2");

        let parsed = parse_events(&crate::ics::generate_ics(&event)).expect("Should parse");

        assert_eq!(parsed[0].title, "C:\\new, folder; v2");
    }
}
