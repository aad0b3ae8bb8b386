use axum::extract::{Json, Path, State};
use axum::response::{IntoResponse, Response};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::prelude::{SecretPath, StoreError};

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::v0::{api_url, store_error_response, Caller};
use crate::ServiceState;

#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub path: SecretPath,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub path: SecretPath,
    pub version: u64,
}

pub async fn handler(
    State(state): State<ServiceState>,
    caller: Caller,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, DeleteError> {
    let path = SecretPath::new(&path);

    let mut tx = state.store().begin_as(caller.name())?;
    tx.delete(&path)?;
    let version = tx.commit().await?;

    tracing::info!(caller = %caller, path = %path, version, "path deleted");
    Ok((http::StatusCode::OK, Json(DeleteResponse { path, version })).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for DeleteError {
    fn into_response(self) -> Response {
        match self {
            DeleteError::Store(e) => store_error_response(&e, true),
        }
    }
}

// Client implementation - builds request for this operation
impl ApiRequest for DeleteRequest {
    type Response = DeleteResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = api_url(base_url, "/api/v0/pass", &self.path)?;
        Ok(client.delete(full_url))
    }
}
