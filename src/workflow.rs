//! Jobs and long-running operations.

use reqwest::{Method, StatusCode};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::nmdc_client::encode_path_segment;
use crate::{ClientError, NmdcClient};

/// Default `max_page_size` for [`NmdcClient::list_jobs`].
pub const DEFAULT_JOB_PAGE_SIZE: u32 = 20;

/// Default `max_page_size` for [`NmdcClient::list_ops`].
pub const DEFAULT_OPERATION_PAGE_SIZE: u32 = 40;

impl NmdcClient {
    /// Lists all jobs matching `filter`, following pagination.
    pub fn list_jobs(
        &self,
        filter: Option<&Value>,
        max_page_size: u32,
    ) -> Result<Vec<Value>, ClientError> {
        self.walk_pages("jobs", filter, max_page_size)
    }

    pub fn get_job(&self, id: &str) -> Result<Value, ClientError> {
        self.transport
            .get_json(&format!("jobs/{}", encode_path_segment(id)))
    }

    /// Attempts to claim a job and returns the response with a `claimed` flag.
    ///
    /// `claimed` is `true` only for `409 Conflict`, meaning somebody already
    /// holds the job. Every other status, success or failure, reports `false`.
    pub fn claim_job(&self, id: &str) -> Result<Value, ClientError> {
        let (status, payload) = self.transport.exchange(
            Method::POST,
            &format!("jobs/{}:claim", encode_path_segment(id)),
            &[],
            None,
        )?;
        let claimed = status == StatusCode::CONFLICT;
        info!(job = id, %status, claimed, "claim attempted");

        let mut data = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("detail".to_owned(), other);
                map
            }
        };
        data.insert("claimed".to_owned(), Value::Bool(claimed));
        Ok(Value::Object(data))
    }

    /// Lists all operations matching `filter`, following pagination.
    pub fn list_ops(
        &self,
        filter: Option<&Value>,
        max_page_size: u32,
    ) -> Result<Vec<Value>, ClientError> {
        self.walk_pages("operations", filter, max_page_size)
    }

    pub fn get_op(&self, id: &str) -> Result<Value, ClientError> {
        self.transport
            .get_json(&format!("operations/{}", encode_path_segment(id)))
    }

    /// Patches an operation.
    ///
    /// `done` and `result` are sent when given (`Some(false)` included). A
    /// `meta` value is stored under `metadata.extra`, keeping the rest of the
    /// current metadata, which requires fetching the operation first. If that
    /// operation has no metadata the update is skipped and `Ok(None)` returned.
    pub fn update_op(
        &self,
        id: &str,
        done: Option<bool>,
        result: Option<Value>,
        meta: Option<Value>,
    ) -> Result<Option<Value>, ClientError> {
        let mut update = Map::new();
        if let Some(done) = done {
            update.insert("done".to_owned(), Value::Bool(done));
        }
        if let Some(result) = result {
            update.insert("result".to_owned(), result);
        }
        if let Some(meta) = meta {
            let current = self.get_op(id)?;
            let Some(mut metadata) = existing_metadata(&current) else {
                warn!(operation = id, "operation has no metadata, skipping update");
                return Ok(None);
            };
            metadata.insert("extra".to_owned(), meta);
            update.insert("metadata".to_owned(), Value::Object(metadata));
        }

        self.transport
            .patch_json(
                &format!("operations/{}", encode_path_segment(id)),
                Value::Object(update),
            )
            .map(Some)
    }
}

/// Mergeable metadata of an operation; null, missing, empty or non-object
/// metadata counts as absent.
fn existing_metadata(operation: &Value) -> Option<Map<String, Value>> {
    match operation.get("metadata") {
        Some(Value::Object(map)) if !map.is_empty() => Some(map.clone()),
        _ => None,
    }
}
