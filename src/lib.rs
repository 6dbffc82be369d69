//! Blocking client library for the NMDC runtime API.
//!
//! Public API layers:
//! - [`BlockingApiClient`]: generic JSON HTTP transport with bearer auth.
//! - [`NmdcClient`]: token lifecycle plus typed calls for identifiers,
//!   objects, jobs and operations.
//! - [`ClientError`]: unified error type used by all clients.
//!
//! Checksums of uploaded files are cached next to them in `<file>.sha256`;
//! see [`sha256_with_sidecar`].

mod auth;
mod blocking_client;
mod checksum;
mod config;
mod error;
mod nmdc_client;
mod objects;
mod workflow;

pub use auth::{AuthStatus, Credentials, REFRESH_MARGIN_SECS, Token};
/// Generic blocking JSON REST client.
pub use blocking_client::BlockingApiClient;
pub use checksum::{sha256_with_sidecar, sidecar_path};
pub use config::{CREDENTIALS_FILE_NAME, ClientConfig, DEFAULT_BASE_URL, default_credentials_path};
/// Error type returned by all client operations.
pub use error::ClientError;
pub use nmdc_client::NmdcClient;
pub use objects::{
    AccessMethod, AccessUrl, Checksum, DEFAULT_OBJECT_PAGE_SIZE, ObjectRecord, guess_mime_type,
};
pub use workflow::{DEFAULT_JOB_PAGE_SIZE, DEFAULT_OPERATION_PAGE_SIZE};
