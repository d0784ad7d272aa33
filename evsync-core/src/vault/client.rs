//! GraphQL client for the personal data vault.

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};
use url::Url;

use crate::config::{ReadRetry, VaultConfig, VaultEndpoint};
use crate::error::{SyncError, SyncResult};
use crate::event::{Event, EventMap};
use crate::store::EventStore;
use crate::vault::payload::{MetaEnvelope, event_to_payload};

const FIND_BY_ONTOLOGY: &str = r#"query FindEvents($ontology: String!) {
  findMetaEnvelopesByOntology(ontology: $ontology) {
    id
    ontology
    parsed
  }
}"#;

const STORE_ENVELOPE: &str = r#"mutation StoreEvent($input: MetaEnvelopeInput!) {
  storeMetaEnvelope(input: $input) {
    metaEnvelope {
      id
      ontology
    }
  }
}"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindData {
    find_meta_envelopes_by_ontology: Vec<MetaEnvelope>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreData {
    store_meta_envelope: StoredEnvelope,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEnvelope {
    meta_envelope: StoredId,
}

#[derive(Debug, Deserialize)]
struct StoredId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RegistryEntry {
    uri: String,
}

/// Event store backed by the vault of one identity.
pub struct VaultStore {
    http: reqwest::Client,
    graphql_url: Url,
    ename: String,
    ontology: String,
    token: Secret<String>,
    read_retry: ReadRetry,
}

impl VaultStore {
    /// Build the store, resolving the ename through the registry if needed.
    pub async fn connect(config: &VaultConfig, read_retry: ReadRetry) -> SyncResult<Self> {
        let http = reqwest::Client::new();

        let base = match &config.endpoint {
            VaultEndpoint::Url(url) => url.clone(),
            VaultEndpoint::Registry(registry) => {
                read_retry
                    .run("resolve ename", || resolve_vault(&http, registry, &config.ename))
                    .await?
            }
        };

        let graphql_url = graphql_url(&base)?;
        debug!(url = %graphql_url, ename = %config.ename, "using vault");

        Ok(VaultStore {
            http,
            graphql_url,
            ename: config.ename.clone(),
            ontology: config.ontology.clone(),
            token: config.token.clone(),
            read_retry,
        })
    }

    async fn execute<T: DeserializeOwned>(&self, query: &str, variables: Value) -> SyncResult<T> {
        let response = self
            .http
            .post(self.graphql_url.clone())
            .bearer_auth(self.token.expose_secret())
            .header("X-ENAME", &self.ename)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Vault(format!("HTTP {status}: {body}")));
        }

        let text = response.text().await?;
        let body: GraphQlResponse<T> = serde_json::from_str(&text)?;
        if !body.errors.is_empty() {
            let messages: Vec<_> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(SyncError::Vault(messages.join("; ")));
        }

        body.data
            .ok_or_else(|| SyncError::Vault("response carried no data".to_string()))
    }

    async fn fetch_envelopes(&self) -> SyncResult<Vec<MetaEnvelope>> {
        let data: FindData = self
            .execute(FIND_BY_ONTOLOGY, json!({ "ontology": self.ontology }))
            .await?;
        Ok(data.find_meta_envelopes_by_ontology)
    }
}

impl EventStore for VaultStore {
    fn name(&self) -> &str {
        "vault"
    }

    async fn list_events(&self) -> SyncResult<EventMap> {
        let envelopes = self
            .read_retry
            .run("list vault envelopes", || self.fetch_envelopes())
            .await?;

        let mut events = EventMap::new();
        for mut envelope in envelopes {
            let event = envelope.normalize()?;
            if let Some(previous) = events.insert(event) {
                debug!(uid = %previous.uid, envelope = %envelope.id, "duplicate uid in vault, keeping later envelope");
            }
        }

        info!(count = events.len(), "fetched vault events");
        Ok(events)
    }

    async fn create_event(&self, event: &Event) -> SyncResult<()> {
        let input = json!({
            "ontology": self.ontology,
            "payload": event_to_payload(event),
            "acl": ["*"],
        });

        let data: StoreData = self.execute(STORE_ENVELOPE, json!({ "input": input })).await?;

        info!(
            uid = %event.uid,
            envelope = %data.store_meta_envelope.meta_envelope.id,
            "stored event in vault"
        );
        Ok(())
    }
}

/// Look up the vault URL registered for `ename`.
async fn resolve_vault(http: &reqwest::Client, registry: &str, ename: &str) -> SyncResult<String> {
    let mut url = Url::parse(registry)
        .map_err(|e| SyncError::Config(format!("Invalid registry URL {registry}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| SyncError::Config(format!("Invalid registry URL {registry}")))?
        .pop_if_empty()
        .push("resolve");
    url.query_pairs_mut().append_pair("w3id", ename);

    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::Vault(format!(
            "registry could not resolve {ename} (HTTP {status})"
        )));
    }

    let entry: RegistryEntry = response.json().await?;
    debug!(ename, uri = %entry.uri, "resolved vault");
    Ok(entry.uri)
}

fn graphql_url(base: &str) -> SyncResult<Url> {
    let mut url =
        Url::parse(base).map_err(|e| SyncError::Config(format!("Invalid vault URL {base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| SyncError::Config(format!("Invalid vault URL {base}")))?
        .pop_if_empty()
        .push("graphql");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EVENT_ONTOLOGY;
    use crate::event::EventTime;
    use mockito::Matcher;

    fn config(url: String) -> VaultConfig {
        VaultConfig {
            endpoint: VaultEndpoint::Url(url),
            ename: "@abc".to_string(),
            ontology: EVENT_ONTOLOGY.to_string(),
            token: Secret::new("jwt".to_string()),
        }
    }

    #[test]
    fn graphql_url_appends_segment() {
        assert_eq!(
            graphql_url("https://vault.example.com").unwrap().as_str(),
            "https://vault.example.com/graphql"
        );
        assert_eq!(
            graphql_url("https://vault.example.com/api/").unwrap().as_str(),
            "https://vault.example.com/api/graphql"
        );
    }

    #[tokio::test]
    async fn list_events_substitutes_missing_uid_and_keeps_last_duplicate() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/graphql")
            .match_header("authorization", "Bearer jwt")
            .match_header("x-ename", "@abc")
            .match_body(Matcher::PartialJson(
                json!({ "variables": { "ontology": EVENT_ONTOLOGY } }),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "data": {
                        "findMetaEnvelopesByOntology": [
                            { "id": "env-1", "ontology": EVENT_ONTOLOGY,
                              "parsed": { "start": "2024-01-01", "end": "2024-01-02", "title": "No uid" } },
                            { "id": "env-2", "ontology": EVENT_ONTOLOGY,
                              "parsed": { "uid": "dup", "start": "2024-01-01", "end": "2024-01-02", "title": "first" } },
                            { "id": "env-3", "ontology": EVENT_ONTOLOGY,
                              "parsed": { "uid": "dup", "start": "2024-01-01", "end": "2024-01-02", "title": "second" } }
                        ]
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let store = VaultStore::connect(&config(server.url()), ReadRetry::default())
            .await
            .unwrap();
        let events = store.list_events().await.unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events.get("env-1").unwrap().title, "No uid");
        assert_eq!(events.get("dup").unwrap().title, "second");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_event_sends_escaped_description() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/graphql")
            .match_body(Matcher::PartialJson(json!({
                "variables": { "input": {
                    "ontology": EVENT_ONTOLOGY,
                    "payload": {
                        "uid": "u1",
                        "title": "Meeting",
                        "description": "Line1__Line2",
                        "recurrence": false,
                        "color": "blue",
                        "start": "2024-01-01T10:00:00",
                        "end": "2024-01-01T11:00:00"
                    }
                }}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "data": { "storeMetaEnvelope": { "metaEnvelope": { "id": "new-env", "ontology": EVENT_ONTOLOGY } } } })
                    .to_string(),
            )
            .create_async()
            .await;

        let store = VaultStore::connect(&config(server.url()), ReadRetry::default())
            .await
            .unwrap();

        let mut event = Event::new(
            "u1",
            EventTime::parse_iso("2024-01-01T10:00:00").unwrap(),
            EventTime::parse_iso("2024-01-01T11:00:00").unwrap(),
            "Meeting",
        );
        event.description = "Line1\nLine2".to_string();

        store.create_event(&event).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn graphql_errors_become_vault_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/graphql")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "data": null, "errors": [{ "message": "unauthorized" }] }).to_string())
            .create_async()
            .await;

        let store = VaultStore::connect(&config(server.url()), ReadRetry::default())
            .await
            .unwrap();
        let err = store.list_events().await.unwrap_err();

        assert!(matches!(err, SyncError::Vault(ref m) if m.contains("unauthorized")));
    }

    #[tokio::test]
    async fn connect_resolves_ename_through_registry() {
        let mut server = mockito::Server::new_async().await;
        let vault_url = format!("{}/vault", server.url());
        let registry = server
            .mock("GET", "/resolve")
            .match_query(Matcher::UrlEncoded("w3id".into(), "@abc".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "ename": "@abc", "uri": vault_url }).to_string())
            .create_async()
            .await;

        let mut cfg = config(String::new());
        cfg.endpoint = VaultEndpoint::Registry(server.url());

        let store = VaultStore::connect(&cfg, ReadRetry::default()).await.unwrap();

        assert_eq!(store.graphql_url.path(), "/vault/graphql");
        registry.assert_async().await;
    }

    #[tokio::test]
    async fn list_events_retries_reads() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", "/graphql")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let retry = ReadRetry {
            retries: 1,
            delay: std::time::Duration::from_millis(1),
        };
        let store = VaultStore::connect(&config(server.url()), retry).await.unwrap();

        assert!(store.list_events().await.is_err());
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn create_event_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", "/graphql")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let retry = ReadRetry {
            retries: 3,
            delay: std::time::Duration::from_millis(1),
        };
        let store = VaultStore::connect(&config(server.url()), retry).await.unwrap();
        let day = EventTime::parse_iso("2024-01-01").unwrap();

        let result = store
            .create_event(&Event::new("u", day.clone(), day, "t"))
            .await;

        assert!(result.is_err());
        failing.assert_async().await;
    }
}
