use axum::extract::{Json, Path, State};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::prelude::{SecretPath, StoreError};

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::v0::{api_url, bad_request_response, store_error_response, Caller};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    #[serde(skip)]
    pub path: SecretPath,
    /// Base64-encoded ciphertext, already encrypted to the
    ///  parent directory's recipients
    pub contents: String,
    /// Optional commit message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResponse {
    pub path: SecretPath,
    pub version: u64,
}

pub async fn handler(
    State(state): State<ServiceState>,
    caller: Caller,
    Path(path): Path<String>,
    Json(req): Json<WriteRequest>,
) -> Result<impl IntoResponse, WriteError> {
    let path = SecretPath::new(&path);
    let ciphertext = base64::engine::general_purpose::STANDARD
        .decode(&req.contents)
        .map_err(|e| WriteError::InvalidContents(e.to_string()))?;

    let mut tx = state.store().begin_as(caller.name())?;
    tx.put(&path, ciphertext)?;
    if let Some(message) = req.message {
        tx.set_message(message);
    }
    let version = tx.commit().await?;

    tracing::info!(caller = %caller, path = %path, version, "secret written");
    Ok((http::StatusCode::OK, Json(WriteResponse { path, version })).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("invalid contents: {0}")]
    InvalidContents(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for WriteError {
    fn into_response(self) -> Response {
        match self {
            WriteError::InvalidContents(_) => bad_request_response(&self),
            WriteError::Store(e) => store_error_response(&e, true),
        }
    }
}

// Client implementation - builds request for this operation
impl ApiRequest for WriteRequest {
    type Response = WriteResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = api_url(base_url, "/api/v0/pass", &self.path)?;
        Ok(client.post(full_url).json(&self))
    }
}
