use std::path::PathBuf;

/// Deployment the client talks to unless told otherwise.
pub const DEFAULT_BASE_URL: &str = "https://api.dev.microbiomedata.org/";

/// File name of the client-credentials JSON inside the home directory.
pub const CREDENTIALS_FILE_NAME: &str = ".nmdc-creds.json";

/// Connection settings for [`crate::NmdcClient`].
///
/// Both values are passed in explicitly; the client never reads environment
/// variables on its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root, joined with relative endpoint paths.
    pub base_url: String,
    /// Location of the `{client_id, client_secret}` JSON file.
    ///
    /// `None` makes the client run unauthenticated.
    pub credentials_path: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            credentials_path: None,
        }
    }

    #[must_use]
    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            credentials_path: default_credentials_path(),
        }
    }
}

/// Returns `$HOME/.nmdc-creds.json`, or `None` when no home directory is known.
pub fn default_credentials_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CREDENTIALS_FILE_NAME))
}
