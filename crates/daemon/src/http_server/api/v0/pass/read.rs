use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::prelude::{NodeKind, Recipients, SecretPath, StoreError};

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::v0::{api_url, store_error_response, Caller};
use crate::ServiceState;

#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub path: SecretPath,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadResponse {
    Secret(SecretInfo),
    Directory(DirectoryInfo),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretInfo {
    /// File name with the container suffix removed
    pub name: String,
    pub path: SecretPath,
    /// Base64-encoded ciphertext
    pub contents: String,
    /// Recipients named by the ciphertext itself
    pub recipients: Recipients,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryInfo {
    pub children: Vec<ChildInfo>,
    /// Effective policy of the directory
    pub recipients: Recipients,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildType {
    File,
    Dir,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildInfo {
    pub name: String,
    pub path: SecretPath,
    #[serde(rename = "type")]
    pub child_type: ChildType,
}

pub async fn handler(
    State(state): State<ServiceState>,
    caller: Caller,
    path: Option<Path<String>>,
) -> Result<impl IntoResponse, ReadError> {
    let path = SecretPath::new(path.as_deref().map(String::as_str).unwrap_or("/"));
    let suffix = state.container_suffix();

    let mut tx = state.store().begin_as(caller.name())?;
    let response = match tx.kind(&path)? {
        None => return Err(StoreError::NotFound(path).into()),
        Some(NodeKind::Secret) => {
            let ciphertext = tx.get(&path)?;
            let recipients = tx.recipients(&path)?;
            let file_name = path.file_name().unwrap_or_default();
            ReadResponse::Secret(SecretInfo {
                name: file_name
                    .strip_suffix(suffix)
                    .unwrap_or(file_name)
                    .to_string(),
                contents: base64::engine::general_purpose::STANDARD.encode(&ciphertext),
                path,
                recipients,
            })
        }
        Some(NodeKind::Directory) => {
            let children = tx
                .list(&path)?
                .iter()
                .filter_map(|entry| {
                    let name = entry.display_name(suffix)?;
                    Some(ChildInfo {
                        name: name.to_string(),
                        path: path.join(&entry.name),
                        child_type: if entry.is_dir() {
                            ChildType::Dir
                        } else {
                            ChildType::File
                        },
                    })
                })
                .collect();
            let recipients = tx.recipients(&path)?;
            ReadResponse::Directory(DirectoryInfo {
                children,
                recipients,
            })
        }
    };
    tx.abort();

    tracing::debug!(caller = %caller, "served read");
    Ok((http::StatusCode::OK, Json(response)).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for ReadError {
    fn into_response(self) -> Response {
        match self {
            ReadError::Store(e) => store_error_response(&e, false),
        }
    }
}

// Client implementation - builds request for this operation
impl ApiRequest for ReadRequest {
    type Response = ReadResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = api_url(base_url, "/api/v0/pass", &self.path)?;
        Ok(client.get(full_url))
    }
}
