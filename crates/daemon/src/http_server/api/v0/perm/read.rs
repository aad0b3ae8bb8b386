use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::prelude::{NodeKind, Recipients, SecretPath, StoreError};

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::v0::{api_url, store_error_response, Caller};
use crate::ServiceState;

#[derive(Debug, Clone)]
pub struct PermRequest {
    pub path: SecretPath,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermResponse {
    pub path: SecretPath,
    /// Recipients in effect for the directory
    pub access: Recipients,
    /// Recipients set on the directory itself, empty if it inherits
    pub explicit: Recipients,
    /// Secrets a policy change here would have to re-encrypt
    pub change: Vec<SecretPath>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    caller: Caller,
    path: Option<Path<String>>,
) -> Result<impl IntoResponse, PermError> {
    let path = SecretPath::new(path.as_deref().map(String::as_str).unwrap_or("/"));

    let mut tx = state.store().begin_as(caller.name())?;
    match tx.kind(&path)? {
        Some(NodeKind::Directory) => {}
        Some(NodeKind::Secret) => return Err(StoreError::NotADirectory(path).into()),
        None => return Err(StoreError::NotFound(path).into()),
    }
    let access = tx.recipients(&path)?;
    let explicit = tx.explicit_recipients(&path)?;
    let change = tx.governed_secrets(&path)?;
    tx.abort();

    Ok((
        http::StatusCode::OK,
        Json(PermResponse {
            path,
            access,
            explicit,
            change,
        }),
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum PermError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for PermError {
    fn into_response(self) -> Response {
        match self {
            PermError::Store(e) => store_error_response(&e, false),
        }
    }
}

// Client implementation - builds request for this operation
impl ApiRequest for PermRequest {
    type Response = PermResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = api_url(base_url, "/api/v0/perm", &self.path)?;
        Ok(client.get(full_url))
    }
}
