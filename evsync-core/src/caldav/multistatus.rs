//! Parsing of DAV multistatus responses.
//!
//! Elements are matched by local name only; servers disagree on prefixes
//! and some omit namespaces entirely.

use roxmltree::{Document, Node};

use crate::error::{SyncError, SyncResult};

/// A calendar collection found under the calendar home.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarCollection {
    pub href: String,
    pub display_name: Option<String>,
}

/// A calendar object with its iCalendar payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarResource {
    pub href: String,
    pub etag: Option<String>,
    pub data: String,
}

fn parse(body: &str) -> SyncResult<Document<'_>> {
    Document::parse(body).map_err(|e| SyncError::DavResponse(format!("invalid XML: {e}")))
}

fn responses<'a, 'input>(doc: &'a Document<'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    doc.root_element()
        .descendants()
        .filter(|n| n.tag_name().name() == "response")
}

fn child_text(node: Node, name: &str) -> Option<String> {
    node.descendants()
        .filter(|n| n.tag_name().name() == name)
        .find_map(|n| n.text())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Href nested inside a property such as `current-user-principal` or
/// `calendar-home-set`.
pub fn find_href_property(body: &str, property: &str) -> SyncResult<Option<String>> {
    let doc = parse(body)?;

    let href = doc
        .root_element()
        .descendants()
        .filter(|n| n.tag_name().name() == property)
        .find_map(|prop| child_text(prop, "href"));

    Ok(href)
}

/// Calendar collections in a Depth 1 PROPFIND of the calendar home.
///
/// Only responses whose `resourcetype` contains `calendar` are returned, so
/// the home itself and non-calendar collections (inbox, outbox) are skipped.
pub fn parse_calendar_collections(body: &str) -> SyncResult<Vec<CalendarCollection>> {
    let doc = parse(body)?;

    let calendars = responses(&doc)
        .filter(|response| {
            response
                .descendants()
                .filter(|n| n.tag_name().name() == "resourcetype")
                .any(|rt| rt.children().any(|c| c.tag_name().name() == "calendar"))
        })
        .filter_map(|response| {
            let href = child_text(response, "href")?;
            let display_name = child_text(response, "displayname");
            Some(CalendarCollection { href, display_name })
        })
        .collect();

    Ok(calendars)
}

/// Calendar objects in a `calendar-query` REPORT response.
pub fn parse_calendar_resources(body: &str) -> SyncResult<Vec<CalendarResource>> {
    let doc = parse(body)?;

    let resources = responses(&doc)
        .filter_map(|response| {
            let href = child_text(response, "href")?;
            let etag = child_text(response, "getetag");
            // Resources without calendar data (e.g. 404 propstat) are skipped
            let data = child_text(response, "calendar-data")?;
            Some(CalendarResource { href, etag, data })
        })
        .collect();

    Ok(resources)
}
