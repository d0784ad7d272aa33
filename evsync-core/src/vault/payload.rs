//! Conversion between vault envelope payloads and [`Event`].
//!
//! Payloads are flat JSON objects:
//!
//! ```json
//! {"start": "2024-01-01T10:00:00+01:00", "end": "...", "title": "...",
//!  "description": "Line1__Line2", "recurrence": false, "color": "blue",
//!  "uid": "..."}
//! ```

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::error::{SyncError, SyncResult};
use crate::event::{DEFAULT_COLOR, Event, EventTime};

/// Stand-in for `\n` inside stored descriptions.
pub const NEWLINE_TOKEN: &str = "__";

/// A stored envelope as returned by the vault.
#[derive(Debug, Clone, Deserialize)]
pub struct MetaEnvelope {
    pub id: String,
    #[serde(default)]
    pub ontology: Option<String>,
    pub parsed: Value,
}

impl MetaEnvelope {
    /// Normalize into an [`Event`].
    ///
    /// When the payload has no `uid` (absent, null or empty), the envelope
    /// id is used and written back onto the payload. Non-string uids are
    /// kept and read as their JSON text.
    pub fn normalize(&mut self) -> SyncResult<Event> {
        let id = self.id.clone();
        let payload = self.parsed.as_object_mut().ok_or_else(|| {
            SyncError::Payload(format!("envelope {id} payload is not an object"))
        })?;

        let missing_uid = match payload.get("uid") {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        if missing_uid {
            payload.insert("uid".to_string(), Value::String(id.clone()));
        }

        event_from_payload(payload)
    }
}

fn event_from_payload(payload: &Map<String, Value>) -> SyncResult<Event> {
    let uid = match payload.get("uid") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => return Err(SyncError::Payload("missing field 'uid'".to_string())),
    };
    let start = EventTime::parse_iso(required_str(payload, "start")?)?;
    let end = EventTime::parse_iso(required_str(payload, "end")?)?;
    let title = required_str(payload, "title")?.to_string();

    let description = payload
        .get("description")
        .and_then(Value::as_str)
        .map(|d| d.replace(NEWLINE_TOKEN, "\n"))
        .unwrap_or_default();

    let color = payload
        .get("color")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_COLOR)
        .to_string();

    let recurrence = match payload.get("recurrence") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(rule)) => !rule.is_empty() && rule != "false",
        _ => false,
    };

    Ok(Event {
        uid,
        start,
        end,
        title,
        description,
        color,
        recurrence,
    })
}

fn required_str<'a>(payload: &'a Map<String, Value>, key: &str) -> SyncResult<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::Payload(format!("missing or non-string field '{key}'")))
}

/// Build the payload stored for `event`.
///
/// Recurrence is always stored as `false`; rules are not synced.
pub fn event_to_payload(event: &Event) -> Value {
    json!({
        "start": event.start.to_iso(),
        "end": event.end.to_iso(),
        "title": event.title,
        "description": event.description.replace('\n', NEWLINE_TOKEN),
        "recurrence": false,
        "color": event.color,
        "uid": event.uid,
    })
}
