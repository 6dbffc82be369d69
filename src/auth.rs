//! Client-credentials authentication against the `/token` endpoint.

use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{BlockingApiClient, ClientError};

/// Tokens this close to expiry are replaced by [`crate::NmdcClient::refresh_token`].
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Contents of the credentials JSON file.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Reads credentials from `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist, which callers treat as
    /// unauthenticated mode.
    pub fn load(path: &Path) -> Result<Option<Self>, ClientError> {
        if !path.exists() {
            debug!(path = %path.display(), "no credentials file");
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path).map_err(|e| ClientError::InvalidCredentials {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| ClientError::InvalidCredentials {
                path: path.to_owned(),
                reason: e.to_string(),
            })
    }
}

/// Bearer token plus its absolute expiry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub(crate) access_token: String,
    pub(crate) expires_at: DateTime<Utc>,
}

impl Token {
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True once `now` is within [`REFRESH_MARGIN_SECS`] of expiry, or past it.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - TimeDelta::seconds(REFRESH_MARGIN_SECS)
    }
}

/// Authentication state of a client after construction or refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthStatus {
    /// A bearer token is held and attached to every request.
    Authenticated { expires_at: DateTime<Utc> },
    /// No credentials file was found; requests go out without a token.
    Anonymous,
}

#[derive(Deserialize)]
struct GrantResponse {
    access_token: String,
    expires: GrantExpiry,
}

#[derive(Deserialize)]
struct GrantExpiry {
    minutes: i64,
}

/// Runs a client-credentials grant and returns the resulting token.
pub(crate) fn request_token(
    transport: &BlockingApiClient,
    credentials: &Credentials,
    now: DateTime<Utc>,
) -> Result<Token, ClientError> {
    info!(client_id = %credentials.client_id, "requesting access token");
    let payload = transport.post_form(
        "token",
        &[
            ("grant_type", "client_credentials"),
            ("client_id", &credentials.client_id),
            ("client_secret", &credentials.client_secret),
        ],
    )?;
    let grant: GrantResponse = serde_json::from_value(payload)?;

    let expires_at = grant
        .expires
        .minutes
        .checked_mul(60)
        .and_then(TimeDelta::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| {
            ClientError::InvalidGrant(format!(
                "expiry of {} minutes is out of range",
                grant.expires.minutes
            ))
        })?;

    Ok(Token {
        access_token: grant.access_token,
        expires_at,
    })
}
