//! CalDAV client for Nextcloud.
//!
//! Discovery follows the usual chain:
//! 1. PROPFIND the DAV root for `current-user-principal`
//! 2. PROPFIND the principal for `calendar-home-set`
//! 3. PROPFIND the home (Depth 1) and pick the calendar by display name

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, IF_NONE_MATCH};
use secrecy::{ExposeSecret, Secret};
use tracing::{debug, info};
use url::Url;

use crate::caldav::multistatus::{
    find_href_property, parse_calendar_collections, parse_calendar_resources,
};
use crate::config::{NextcloudConfig, ReadRetry};
use crate::error::{SyncError, SyncResult};
use crate::event::{Event, EventMap};
use crate::ics::{generate_ics, parse_events};
use crate::store::EventStore;

const PRINCIPAL_PROPFIND: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:current-user-principal/>
  </d:prop>
</d:propfind>"#;

const HOME_SET_PROPFIND: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop>
    <c:calendar-home-set/>
  </d:prop>
</d:propfind>"#;

const CALENDARS_PROPFIND: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:displayname/>
    <d:resourcetype/>
  </d:prop>
</d:propfind>"#;

const EVENTS_REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<c:calendar-query xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop>
    <d:getetag/>
    <c:calendar-data/>
  </d:prop>
  <c:filter>
    <c:comp-filter name="VCALENDAR">
      <c:comp-filter name="VEVENT"/>
    </c:comp-filter>
  </c:filter>
</c:calendar-query>"#;

/// Headers the Nextcloud AppAPI gateway expects on every request.
fn app_api_headers(user: &str, password: &str) -> SyncResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("aa-version"),
        HeaderValue::from_static("2.3.0"),
    );
    headers.insert(
        HeaderName::from_static("ex-app-id"),
        HeaderValue::from_static("flow"),
    );
    headers.insert(
        HeaderName::from_static("ex-app-version"),
        HeaderValue::from_static("1.0.0"),
    );

    let mut app_auth = HeaderValue::from_str(&STANDARD.encode(format!("{user}:{password}")))
        .map_err(|e| SyncError::Config(format!("Invalid Nextcloud credentials: {e}")))?;
    app_auth.set_sensitive(true);
    headers.insert(HeaderName::from_static("authorization-app-api"), app_auth);

    Ok(headers)
}

fn dav_method(name: &str) -> SyncResult<Method> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| SyncError::DavResponse(format!("invalid method {name}: {e}")))
}

/// Authenticated HTTP session against one Nextcloud account.
#[derive(Clone)]
pub struct DavClient {
    http: reqwest::Client,
    user: String,
    password: Secret<String>,
}

impl DavClient {
    pub fn new(user: &str, password: &Secret<String>) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .default_headers(app_api_headers(user, password.expose_secret())?)
            .build()?;

        Ok(DavClient {
            http,
            user: user.to_string(),
            password: password.clone(),
        })
    }

    /// Send a DAV request and return the final URL (after redirects) and body.
    async fn send(
        &self,
        method: &str,
        url: &Url,
        depth: Option<&str>,
        body: &'static str,
    ) -> SyncResult<(Url, String)> {
        let mut request = self
            .http
            .request(dav_method(method)?, url.clone())
            .basic_auth(&self.user, Some(self.password.expose_secret()))
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(body);
        if let Some(depth) = depth {
            request = request.header("Depth", depth);
        }

        let response = request.send().await?;
        let status = response.status();
        let final_url = response.url().clone();

        if !status.is_success() {
            return Err(SyncError::DavStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok((final_url, response.text().await?))
    }

    async fn href_property(&self, url: &Url, body: &'static str, property: &str) -> SyncResult<Url> {
        let (final_url, xml) = self.send("PROPFIND", url, Some("0"), body).await?;

        let href = find_href_property(&xml, property)?.ok_or_else(|| {
            SyncError::DavResponse(format!("no {property} in response from {url}"))
        })?;

        resolve_href(&final_url, &href)
    }

    /// Find the calendar with display name `name`.
    pub async fn find_calendar(&self, dav_root: &Url, name: &str) -> SyncResult<Url> {
        let principal = self
            .href_property(dav_root, PRINCIPAL_PROPFIND, "current-user-principal")
            .await?;
        debug!(url = %principal, "found principal");

        let home = self
            .href_property(&principal, HOME_SET_PROPFIND, "calendar-home-set")
            .await?;
        debug!(url = %home, "found calendar home");

        let (final_url, xml) = self
            .send("PROPFIND", &home, Some("1"), CALENDARS_PROPFIND)
            .await?;
        let calendars = parse_calendar_collections(&xml)?;
        debug!(count = calendars.len(), "listed calendars");

        let calendar = calendars
            .into_iter()
            .find(|c| c.display_name.as_deref() == Some(name))
            .ok_or_else(|| SyncError::CalendarNotFound(name.to_string()))?;

        resolve_href(&final_url, &calendar.href)
    }
}

/// Turn a (usually absolute-path) href into a full URL.
fn resolve_href(base: &Url, href: &str) -> SyncResult<Url> {
    base.join(href)
        .map_err(|e| SyncError::DavResponse(format!("invalid href {href}: {e}")))
}

/// One Nextcloud calendar, the CalDAV side of a sync.
pub struct CalDavCalendar {
    client: DavClient,
    url: Url,
    name: String,
    read_retry: ReadRetry,
}

impl CalDavCalendar {
    /// Discover the configured calendar on the Nextcloud server.
    pub async fn connect(config: &NextcloudConfig, read_retry: ReadRetry) -> SyncResult<Self> {
        let client = DavClient::new(&config.user, &config.password)?;
        let dav_root = Url::parse(&config.dav_root())
            .map_err(|e| SyncError::Config(format!("Invalid Nextcloud base URL: {e}")))?;

        let url = read_retry
            .run("discover calendar", || {
                client.find_calendar(&dav_root, &config.calendar_name)
            })
            .await?;
        info!(calendar = %config.calendar_name, url = %url, "found calendar");

        Ok(CalDavCalendar {
            client,
            url,
            name: config.calendar_name.clone(),
            read_retry,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn calendar_name(&self) -> &str {
        &self.name
    }

    /// URL for a new object named after the event uid.
    fn object_url(&self, uid: &str) -> SyncResult<Url> {
        let mut url = self.url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::DavResponse(format!("calendar URL {} cannot hold objects", self.url)))?
            .pop_if_empty()
            .push(&format!("{uid}.ics"));
        Ok(url)
    }
}

impl EventStore for CalDavCalendar {
    fn name(&self) -> &str {
        "nextcloud"
    }

    async fn list_events(&self) -> SyncResult<EventMap> {
        let (_, xml) = self
            .read_retry
            .run("list calendar objects", || {
                self.client.send("REPORT", &self.url, Some("1"), EVENTS_REPORT)
            })
            .await?;

        let resources = parse_calendar_resources(&xml)?;
        debug!(count = resources.len(), "fetched calendar objects");

        let mut events = EventMap::new();
        for resource in resources {
            for event in parse_events(&resource.data)? {
                if let Some(previous) = events.insert(event) {
                    debug!(uid = %previous.uid, href = %resource.href, "duplicate uid in calendar, keeping later object");
                }
            }
        }

        info!(count = events.len(), "fetched calendar events");
        Ok(events)
    }

    async fn create_event(&self, event: &Event) -> SyncResult<()> {
        let url = self.object_url(&event.uid)?;
        let ics = generate_ics(event);

        // If-None-Match: * makes the server refuse to overwrite an existing object
        let response = self
            .client
            .http
            .put(url.clone())
            .basic_auth(&self.client.user, Some(self.client.password.expose_secret()))
            .header(CONTENT_TYPE, "text/calendar; charset=utf-8")
            .header(IF_NONE_MATCH, "*")
            .body(ics)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::DavStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        info!(uid = %event.uid, url = %url, "created calendar object");
        Ok(())
    }
}
