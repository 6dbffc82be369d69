use reqwest::{Method, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use crate::ClientError;

/// Generic blocking JSON REST client.
///
/// Owns the optional bearer token; every request made while a token is set
/// carries `Authorization: Bearer <token>`.
#[derive(Debug)]
pub struct BlockingApiClient {
    base_url: Url,
    bearer_token: Option<String>,
    http: reqwest::blocking::Client,
}

impl BlockingApiClient {
    /// Creates a new client with the given base URL.
    ///
    /// The URL is normalized to include a trailing slash, so relative endpoint
    /// paths join correctly.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, ClientError> {
        let parsed = Url::parse(base_url.as_ref())
            .map_err(|_| ClientError::InvalidBaseUrl(base_url.as_ref().to_owned()))?;

        Ok(Self {
            base_url: ensure_trailing_slash(parsed),
            bearer_token: None,
            http: reqwest::blocking::Client::new(),
        })
    }

    /// Returns a new client with a bearer token attached to all requests.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Replaces (or clears) the bearer token used for subsequent requests.
    pub fn set_bearer_token(&mut self, token: Option<String>) {
        self.bearer_token = token;
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Sends a `GET` request and parses the response as JSON.
    pub fn get_json(&self, path: &str) -> Result<Value, ClientError> {
        self.request_json(Method::GET, path, None)
    }

    /// Sends a `POST` request with a JSON body and parses the response as JSON.
    pub fn post_json(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.request_json(Method::POST, path, Some(body))
    }

    /// Sends a `PUT` request with a JSON body and parses the response as JSON.
    pub fn put_json(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.request_json(Method::PUT, path, Some(body))
    }

    /// Sends a `PATCH` request with a JSON body and parses the response as JSON.
    pub fn patch_json(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.request_json(Method::PATCH, path, Some(body))
    }

    /// Sends a request and parses the response as JSON.
    pub fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ClientError> {
        self.request_json_with_query(method, path, &[], body)
    }

    /// Sends a request with query parameters and parses the response as JSON.
    ///
    /// Returns [`Value::Null`] for successful responses with an empty body and
    /// [`ClientError::HttpStatus`] for any non-success status.
    pub fn request_json_with_query(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Value, ClientError> {
        let (status, payload) = self.send(method, path, query, body)?;

        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                status,
                body: payload,
            });
        }

        if payload.trim().is_empty() {
            Ok(Value::Null)
        } else {
            Ok(serde_json::from_str(&payload)?)
        }
    }

    /// Sends a request and returns the status together with the decoded body,
    /// whatever the status is.
    ///
    /// Bodies that are not JSON come back as [`Value::String`], empty bodies as
    /// [`Value::Null`]. Only transport failures are errors here.
    pub fn exchange(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<(StatusCode, Value), ClientError> {
        let (status, payload) = self.send(method, path, query, body)?;
        let value = if payload.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&payload).unwrap_or(Value::String(payload))
        };
        Ok((status, value))
    }

    /// Sends a `POST` with an `application/x-www-form-urlencoded` body.
    ///
    /// The bearer token is never attached; this is used to obtain one.
    pub fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Value, ClientError> {
        let url = self.build_url(path)?;
        debug!(%url, "POST form");
        let response = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()?;
        let status = response.status();
        let payload = response.text()?;

        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                status,
                body: payload,
            });
        }
        Ok(serde_json::from_str(&payload)?)
    }

    fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<(StatusCode, String), ClientError> {
        let url = self.build_url(path)?;
        debug!(%method, %url, "sending request");
        let mut request = self
            .http
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");

        if !query.is_empty() {
            request = request.query(query);
        }

        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        if let Some(json_body) = body {
            request = request.json(&json_body);
        }

        let response = request.send()?;
        let status = response.status();
        let payload = response.text()?;
        Ok((status, payload))
    }

    fn build_url(&self, path: &str) -> Result<Url, ClientError> {
        let relative = path.trim_start_matches('/');
        self.base_url
            .join(relative)
            .map_err(|_| ClientError::InvalidPath(path.to_owned()))
    }
}

fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let mut path = url.path().to_owned();
        path.push('/');
        url.set_path(&path);
    }
    url
}
