use std::collections::BTreeMap;

use axum::extract::{Json, Path, State};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::prelude::{Recipients, SecretPath, StoreError, SuppliedCiphertexts};

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::v0::{api_url, bad_request_response, store_error_response, Caller};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePermRequest {
    #[serde(skip)]
    pub path: SecretPath,
    /// Key ids of the new explicit policy; empty to inherit again
    pub access: Vec<String>,
    /// Base64 ciphertext for every secret the change re-encrypts,
    ///  keyed by path. Produced by the client, which holds the keys.
    #[serde(default)]
    pub contents: BTreeMap<String, String>,
    /// Optional commit message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePermResponse {
    pub path: SecretPath,
    /// Effective policy after the change
    pub access: Recipients,
    /// Secrets whose ciphertext was replaced
    pub reencrypted: Vec<SecretPath>,
    pub version: u64,
}

pub async fn handler(
    State(state): State<ServiceState>,
    caller: Caller,
    Path(path): Path<String>,
    Json(req): Json<UpdatePermRequest>,
) -> Result<impl IntoResponse, UpdatePermError> {
    let path = SecretPath::new(&path);
    let recipients =
        Recipients::parse(&req.access).map_err(|e| UpdatePermError::InvalidAccess(e.to_string()))?;

    let mut supplied = SuppliedCiphertexts::new();
    for (secret, contents) in req.contents.iter() {
        let ciphertext = base64::engine::general_purpose::STANDARD
            .decode(contents)
            .map_err(|e| UpdatePermError::InvalidContents(format!("{}: {}", secret, e)))?;
        supplied.insert(SecretPath::new(secret), Bytes::from(ciphertext));
    }

    let mut tx = state.store().begin_as(caller.name())?;
    tx.set_recipients(&path, recipients)?;
    let reencrypted = tx.pending_reencryption();
    if let Some(missing) = reencrypted.iter().find(|p| !supplied.contains(*p)) {
        return Err(UpdatePermError::MissingContents(missing.clone()));
    }
    let access = tx.recipients(&path)?;
    if let Some(message) = req.message {
        tx.set_message(message);
    }
    let version = tx.commit_with(&supplied).await?;

    tracing::info!(
        caller = %caller,
        path = %path,
        access = %access,
        reencrypted = reencrypted.len(),
        version,
        "policy changed"
    );
    Ok((
        http::StatusCode::OK,
        Json(UpdatePermResponse {
            path,
            access,
            reencrypted,
            version,
        }),
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum UpdatePermError {
    #[error("invalid access list: {0}")]
    InvalidAccess(String),
    #[error("invalid contents for {0}")]
    InvalidContents(String),
    #[error("no re-encrypted contents supplied for {0}")]
    MissingContents(SecretPath),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for UpdatePermError {
    fn into_response(self) -> Response {
        match self {
            UpdatePermError::InvalidAccess(_)
            | UpdatePermError::InvalidContents(_)
            | UpdatePermError::MissingContents(_) => bad_request_response(&self),
            UpdatePermError::Store(e) => store_error_response(&e, true),
        }
    }
}

// Client implementation - builds request for this operation
impl ApiRequest for UpdatePermRequest {
    type Response = UpdatePermResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = api_url(base_url, "/api/v0/perm", &self.path)?;
        Ok(client.post(full_url).json(&self))
    }
}
