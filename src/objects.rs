//! Object registry: content-addressed data objects and their metadata.

use std::ffi::OsStr;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};

use crate::checksum::sha256_with_sidecar;
use crate::nmdc_client::encode_path_segment;
use crate::{ClientError, NmdcClient};

/// Default `max_page_size` for [`NmdcClient::list_objs`].
pub const DEFAULT_OBJECT_PAGE_SIZE: u32 = 40;

/// Object document sent to `POST /objects`.
///
/// Unset fields are serialized as `null`, not omitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectRecord {
    pub aliases: Option<Vec<String>>,
    pub description: String,
    pub mime_type: Option<String>,
    pub name: String,
    pub access_methods: Vec<AccessMethod>,
    pub checksums: Vec<Checksum>,
    pub contents: Option<Vec<Value>>,
    pub created_time: String,
    pub size: u64,
    pub updated_time: Option<String>,
    pub version: Option<String>,
    pub id: String,
    pub self_uri: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccessMethod {
    pub access_id: Option<String>,
    pub access_url: AccessUrl,
    pub region: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccessUrl {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Checksum {
    pub checksum: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ObjectRecord {
    /// Describes a local file served from `data_url`.
    ///
    /// The id is the file's SHA-256 (read from or written to its sidecar).
    pub fn from_file(
        path: &Path,
        description: &str,
        data_url: &str,
        drs_authority: &str,
    ) -> Result<Self, ClientError> {
        let size = std::fs::metadata(path)
            .map_err(|e| ClientError::io(path, e))?
            .len();
        let name = path.file_name().map_or_else(
            || path.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        );
        let sha = sha256_with_sidecar(path)?;

        Ok(Self {
            aliases: None,
            description: description.to_owned(),
            mime_type: guess_mime_type(path),
            name,
            access_methods: vec![AccessMethod {
                access_id: None,
                access_url: AccessUrl {
                    url: data_url.to_owned(),
                },
                region: None,
                kind: "https".to_owned(),
            }],
            checksums: vec![Checksum {
                checksum: sha.clone(),
                kind: "sha256".to_owned(),
            }],
            contents: None,
            created_time: Utc::now().to_rfc3339(),
            size,
            updated_time: None,
            version: None,
            self_uri: format!("drs://{drs_authority}/{sha}"),
            id: sha,
        })
    }
}

/// Guesses a MIME type from the file extension.
///
/// Compressed files report their encoding (`x.tsv.gz` → `application/gzip`).
pub fn guess_mime_type(path: &Path) -> Option<String> {
    if let Some(encoding) = path
        .extension()
        .and_then(OsStr::to_str)
        .and_then(compression_encoding)
    {
        return Some(format!("application/{encoding}"));
    }
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_owned())
}

fn compression_encoding(extension: &str) -> Option<&'static str> {
    match extension {
        "gz" | "tgz" => Some("gzip"),
        "bz2" | "tbz2" => Some("bzip2"),
        "xz" | "txz" => Some("xz"),
        "Z" => Some("compress"),
        "br" => Some("br"),
        _ => None,
    }
}

impl NmdcClient {
    /// Fetches an object.
    ///
    /// With `decode`, a JSON-encoded `description` is parsed into a
    /// `metadata` field; anything unparseable yields `metadata: null`.
    pub fn get_object(&self, id: &str, decode: bool) -> Result<Value, ClientError> {
        let mut data = self
            .transport
            .get_json(&format!("objects/{}", encode_path_segment(id)))?;

        if decode {
            if let Some(object) = data.as_object_mut() {
                if let Some(description) = object.get("description") {
                    let metadata = description
                        .as_str()
                        .and_then(|raw| serde_json::from_str(raw).ok())
                        .unwrap_or(Value::Null);
                    object.insert("metadata".to_owned(), metadata);
                }
            }
        }
        Ok(data)
    }

    /// Registers the file at `path` as an object reachable at `data_url`.
    pub fn create_object(
        &self,
        path: &Path,
        description: &str,
        data_url: &str,
    ) -> Result<Value, ClientError> {
        let record = ObjectRecord::from_file(path, description, data_url, &self.drs_authority())?;
        self.transport
            .post_json("objects", serde_json::to_value(&record)?)
    }

    /// Replaces the object's type list with `[kind]`.
    pub fn set_type(&self, id: &str, kind: &str) -> Result<Value, ClientError> {
        self.transport.put_json(
            &format!("objects/{}/types", encode_path_segment(id)),
            json!([kind]),
        )
    }

    /// Sets `created_time` to now so downstream watchers pick the object up again.
    pub fn bump_time(&self, id: &str) -> Result<Value, ClientError> {
        self.transport.patch_json(
            &format!("objects/{}", encode_path_segment(id)),
            json!({ "created_time": Utc::now().to_rfc3339() }),
        )
    }

    /// Lists all objects matching `filter`, following pagination.
    pub fn list_objs(
        &self,
        filter: Option<&Value>,
        max_page_size: u32,
    ) -> Result<Vec<Value>, ClientError> {
        self.walk_pages("objects", filter, max_page_size)
    }

    fn drs_authority(&self) -> String {
        let base = self.transport.base_url();
        let host = base.host_str().unwrap_or_default();
        match base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        }
    }
}
