use std::path::PathBuf;

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::auth::{self, AuthStatus, Credentials, Token};
use crate::{BlockingApiClient, ClientConfig, ClientError};

/// Blocking client for the NMDC runtime API.
///
/// Holds the bearer token for its whole lifetime. Not meant to be shared
/// across threads without external locking; token refresh needs `&mut self`.
#[derive(Debug)]
pub struct NmdcClient {
    pub(crate) transport: BlockingApiClient,
    credentials_path: Option<PathBuf>,
    token: Option<Token>,
}

impl NmdcClient {
    /// Builds a client and fetches its first token.
    ///
    /// A missing credentials file yields an unauthenticated client
    /// ([`AuthStatus::Anonymous`]). A failed grant is returned as an error.
    pub fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let mut client = Self {
            transport: BlockingApiClient::new(&config.base_url)?,
            credentials_path: config.credentials_path,
            token: None,
        };
        client.get_token()?;
        Ok(client)
    }

    pub fn auth_status(&self) -> AuthStatus {
        match &self.token {
            Some(token) => AuthStatus::Authenticated {
                expires_at: token.expires_at(),
            },
            None => AuthStatus::Anonymous,
        }
    }

    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    /// Loads credentials and runs a client-credentials grant.
    ///
    /// Without a credentials file the token is cleared and requests continue
    /// unauthenticated. A failed grant leaves the current token in place.
    pub fn get_token(&mut self) -> Result<AuthStatus, ClientError> {
        let credentials = match &self.credentials_path {
            Some(path) => Credentials::load(path)?,
            None => None,
        };
        let Some(credentials) = credentials else {
            self.token = None;
            self.transport.set_bearer_token(None);
            return Ok(AuthStatus::Anonymous);
        };

        let token = auth::request_token(&self.transport, &credentials, Utc::now())?;
        self.transport
            .set_bearer_token(Some(token.access_token().to_owned()));
        self.token = Some(token);
        Ok(self.auth_status())
    }

    /// Requests a new token when the current one expires within a minute.
    ///
    /// Returns whether a grant was attempted.
    pub fn refresh_token(&mut self) -> Result<bool, ClientError> {
        self.refresh_token_at(Utc::now())
    }

    fn refresh_token_at(&mut self, now: DateTime<Utc>) -> Result<bool, ClientError> {
        let due = self.token.as_ref().is_none_or(|token| token.needs_refresh(now));
        if !due {
            return Ok(false);
        }
        self.get_token()?;
        Ok(true)
    }

    /// Mints `count` new identifiers under `namespace`/`shoulder`.
    ///
    /// `count` is forwarded unchecked; the server rejects bad values.
    pub fn mint(&self, namespace: &str, shoulder: &str, count: i64) -> Result<Value, ClientError> {
        self.transport.post_json(
            "ids/mint",
            json!({
                "populator": "",
                "naa": namespace,
                "shoulder": shoulder,
                "number": count,
            }),
        )
    }

    /// Fetches every page of a collection and concatenates their `resources`.
    ///
    /// Each page is requested with the original query plus `page_token`. A
    /// payload without `resources` ends the walk; it is logged and the
    /// resources gathered so far are returned.
    pub(crate) fn walk_pages(
        &self,
        collection: &str,
        filter: Option<&Value>,
        max_page_size: u32,
    ) -> Result<Vec<Value>, ClientError> {
        let page_size = max_page_size.to_string();
        let filter = filter.map(Value::to_string);
        let mut base_query = vec![("max_page_size", page_size.as_str())];
        if let Some(filter) = &filter {
            base_query.push(("filter", filter.as_str()));
        }

        let mut results = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = base_query.clone();
            if let Some(token) = &page_token {
                query.push(("page_token", token.as_str()));
            }

            let (status, payload) = self
                .transport
                .exchange(Method::GET, collection, &query, None)?;
            let Some(resources) = payload.get("resources").and_then(Value::as_array) else {
                error!(%status, collection, payload = %payload, "page without resources");
                break;
            };
            debug!(collection, count = resources.len(), "fetched page");
            results.extend(resources.iter().cloned());

            page_token = next_page_token(&payload);
            if page_token.is_none() {
                break;
            }
        }
        Ok(results)
    }
}

/// Everything but RFC 3986 unreserved characters is escaped.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub(crate) fn encode_path_segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

/// Returns the cursor of the next page; absent, null, empty, `false` and `0`
/// all end the walk.
fn next_page_token(payload: &Value) -> Option<String> {
    match payload.get("next_page_token")? {
        Value::String(token) if !token.is_empty() => Some(token.clone()),
        Value::Number(number) if number.as_i64() != Some(0) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::Path;

    use chrono::{TimeDelta, Utc};
    use httpmock::prelude::*;
    use serde_json::json;

    use super::{NmdcClient, encode_path_segment, next_page_token};
    use crate::{AuthStatus, ClientConfig, ClientError};

    /// Unauthenticated client pointed at a mock server.
    pub(crate) fn anonymous_client(server: &MockServer) -> NmdcClient {
        NmdcClient::connect(ClientConfig::new(server.base_url())).unwrap()
    }

    fn write_credentials(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("creds.json");
        std::fs::write(
            &path,
            json!({"client_id": "cid", "client_secret": "csec"}).to_string(),
        )
        .unwrap();
        path
    }

    fn token_mock(server: &MockServer, minutes: i64) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200).json_body(json!({
                "access_token": "tok",
                "expires": {"minutes": minutes}
            }));
        })
    }

    #[test]
    fn connect_without_credentials_file_is_anonymous() {
        let server = MockServer::start();
        let dir = tempfile::tempdir().unwrap();
        let config =
            ClientConfig::new(server.base_url()).with_credentials_path(dir.path().join("none"));

        let client = NmdcClient::connect(config).unwrap();
        assert_eq!(client.auth_status(), AuthStatus::Anonymous);
        assert!(client.transport.bearer_token().is_none());
    }

    #[test]
    fn connect_with_credentials_authenticates() {
        let server = MockServer::start();
        let grant = token_mock(&server, 30);
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::new(server.base_url())
            .with_credentials_path(write_credentials(dir.path()));

        let client = NmdcClient::connect(config).unwrap();

        grant.assert();
        assert!(matches!(
            client.auth_status(),
            AuthStatus::Authenticated { .. }
        ));
        assert_eq!(client.transport.bearer_token(), Some("tok"));
    }

    #[test]
    fn failed_grant_fails_construction() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(500).body("down");
        });
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::new(server.base_url())
            .with_credentials_path(write_credentials(dir.path()));

        let err = NmdcClient::connect(config).unwrap_err();
        assert!(matches!(err, ClientError::HttpStatus { .. }));
    }

    #[test]
    fn refresh_is_skipped_while_token_is_fresh() {
        let server = MockServer::start();
        let grant = token_mock(&server, 30);
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::new(server.base_url())
            .with_credentials_path(write_credentials(dir.path()));
        let mut client = NmdcClient::connect(config).unwrap();

        assert!(!client.refresh_token().unwrap());
        grant.assert_calls(1);
    }

    #[test]
    fn refresh_runs_one_grant_near_expiry() {
        let server = MockServer::start();
        let grant = token_mock(&server, 30);
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::new(server.base_url())
            .with_credentials_path(write_credentials(dir.path()));
        let mut client = NmdcClient::connect(config).unwrap();

        let now = Utc::now();
        client.token.as_mut().unwrap().expires_at = now + TimeDelta::seconds(30);
        assert!(client.refresh_token_at(now).unwrap());
        grant.assert_calls(2);

        let expires_at = client.token().unwrap().expires_at();
        assert!(expires_at > now + TimeDelta::seconds(60));
    }

    #[test]
    fn failed_refresh_keeps_current_token() {
        let server = MockServer::start();
        let mut grant = token_mock(&server, 30);
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::new(server.base_url())
            .with_credentials_path(write_credentials(dir.path()));
        let mut client = NmdcClient::connect(config).unwrap();

        grant.delete();
        let outage = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(503).body("unavailable");
        });

        let now = Utc::now();
        client.token.as_mut().unwrap().expires_at = now + TimeDelta::seconds(45);
        let err = client.refresh_token_at(now).unwrap_err();

        outage.assert();
        assert!(matches!(err, ClientError::HttpStatus { .. }));
        assert_eq!(client.transport.bearer_token(), Some("tok"));
        assert_eq!(
            client.auth_status(),
            AuthStatus::Authenticated {
                expires_at: now + TimeDelta::seconds(45)
            }
        );
    }

    #[test]
    fn removed_credentials_file_drops_token_on_refresh() {
        let server = MockServer::start();
        token_mock(&server, 30);
        let dir = tempfile::tempdir().unwrap();
        let creds = write_credentials(dir.path());
        let config = ClientConfig::new(server.base_url()).with_credentials_path(&creds);
        let mut client = NmdcClient::connect(config).unwrap();

        std::fs::remove_file(&creds).unwrap();
        let now = Utc::now();
        client.token.as_mut().unwrap().expires_at = now;
        assert!(client.refresh_token_at(now).unwrap());

        assert_eq!(client.auth_status(), AuthStatus::Anonymous);
        assert!(client.transport.bearer_token().is_none());
    }

    #[test]
    fn mint_posts_fixed_populator() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/ids/mint").json_body(json!({
                "populator": "",
                "naa": "nmdc",
                "shoulder": "mga0",
                "number": 2
            }));
            then.status(201).json_body(json!(["nmdc:mga0-01", "nmdc:mga0-02"]));
        });

        let ids = anonymous_client(&server).mint("nmdc", "mga0", 2).unwrap();

        mock.assert();
        assert_eq!(ids, json!(["nmdc:mga0-01", "nmdc:mga0-02"]));
    }

    #[test]
    fn page_walk_concatenates_in_order() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/operations")
                .query_param("max_page_size", "2")
                .query_param_missing("page_token");
            then.status(200).json_body(json!({
                "resources": [{"id": "op1"}, {"id": "op2"}],
                "next_page_token": "p2"
            }));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/operations")
                .query_param("max_page_size", "2")
                .query_param("page_token", "p2");
            then.status(200).json_body(json!({
                "resources": [{"id": "op3"}],
                "next_page_token": ""
            }));
        });

        let client = anonymous_client(&server);
        let resources = client.walk_pages("operations", None, 2).unwrap();
        let ids: Vec<_> = resources.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["op1", "op2", "op3"]);
    }

    #[test]
    fn page_walk_stops_at_payload_without_resources() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/objects")
                .query_param_missing("page_token");
            then.status(200).json_body(json!({
                "resources": [{"id": "o1"}],
                "next_page_token": "p2"
            }));
        });
        let broken = server.mock(|when, then| {
            when.method(GET)
                .path("/objects")
                .query_param("page_token", "p2");
            then.status(200).json_body(json!({"detail": "oops"}));
        });

        let client = anonymous_client(&server);
        let resources = client.walk_pages("objects", None, 40).unwrap();

        broken.assert();
        assert_eq!(resources, vec![json!({"id": "o1"})]);
    }

    #[test]
    fn page_walk_embeds_filter_as_json() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/jobs")
                .query_param("filter", r#"{"claimed":false}"#);
            then.status(200).json_body(json!({"resources": []}));
        });

        let client = anonymous_client(&server);
        let resources = client
            .walk_pages("jobs", Some(&json!({"claimed": false})), 20)
            .unwrap();

        mock.assert();
        assert!(resources.is_empty());
    }

    #[test]
    fn path_segments_are_escaped() {
        assert_eq!(encode_path_segment("abc-123"), "abc-123");
        assert_eq!(encode_path_segment("a/b?c"), "a%2Fb%3Fc");
        assert_eq!(encode_path_segment("a b"), "a%20b");
        assert_eq!(encode_path_segment("a+b"), "a%2Bb");
    }

    #[test]
    fn encoded_ids_survive_url_join() {
        let base = url::Url::parse("https://example.com/").unwrap();
        let joined = base
            .join(&format!("objects/{}", encode_path_segment("a b+c")))
            .unwrap();
        assert_eq!(joined.path(), "/objects/a%20b%2Bc");
    }

    #[test]
    fn falsy_page_tokens_end_the_walk() {
        assert_eq!(next_page_token(&json!({})), None);
        assert_eq!(next_page_token(&json!({"next_page_token": null})), None);
        assert_eq!(next_page_token(&json!({"next_page_token": ""})), None);
        assert_eq!(next_page_token(&json!({"next_page_token": false})), None);
        assert_eq!(next_page_token(&json!({"next_page_token": 0})), None);
        assert_eq!(
            next_page_token(&json!({"next_page_token": "abc"})),
            Some("abc".to_owned())
        );
    }
}
