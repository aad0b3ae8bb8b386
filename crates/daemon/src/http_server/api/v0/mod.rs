use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use url::Url;

use common::prelude::{SecretPath, StoreError};

pub mod caller;
pub mod pass;
pub mod perm;

pub use caller::Caller;

use crate::http_server::api::client::ApiError;
use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .nest("/pass", pass::router(state.clone()))
        .nest("/perm", perm::router(state.clone()))
        .with_state(state)
}

/// Build `{base}{prefix}/{path...}` with each segment escaped
pub(crate) fn api_url(base_url: &Url, prefix: &str, path: &SecretPath) -> Result<Url, ApiError> {
    let mut url = base_url.join(prefix)?;
    url.path_segments_mut()
        .map_err(|_| ApiError::UrlParse(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .extend(path.segments());
    Ok(url)
}

/// Map a store failure onto an HTTP response. `writing` separates a
///  client sending a bad container (422) from a bad container already
///  in the tree (500).
pub(crate) fn store_error_response(err: &StoreError, writing: bool) -> Response {
    let status = match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::NotADirectory(_)
        | StoreError::IsADirectory(_)
        | StoreError::InvalidPath(..)
        | StoreError::InvalidRecipients(_) => StatusCode::BAD_REQUEST,
        StoreError::NotEmpty(_) => StatusCode::CONFLICT,
        StoreError::Conflict(_) => {
            let msg = serde_json::json!({"msg": err.to_string(), "retryable": true});
            return (StatusCode::CONFLICT, Json(msg)).into_response();
        }
        StoreError::MalformedContainer { .. } | StoreError::RecipientMismatch { .. }
            if writing =>
        {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        StoreError::MalformedContainer { .. }
        | StoreError::RecipientMismatch { .. }
        | StoreError::ReencryptionFailed { .. }
        | StoreError::Unavailable(_) => {
            tracing::error!(error = %err, "internal error handling request");
            return internal_error_response();
        }
    };
    let msg = serde_json::json!({"msg": err.to_string()});
    (status, Json(msg)).into_response()
}

pub(crate) fn bad_request_response(msg: impl std::fmt::Display) -> Response {
    let msg = serde_json::json!({"msg": msg.to_string()});
    (StatusCode::BAD_REQUEST, Json(msg)).into_response()
}

pub(crate) fn internal_error_response() -> Response {
    let msg = serde_json::json!({"msg": "internal server error"});
    (StatusCode::INTERNAL_SERVER_ERROR, Json(msg)).into_response()
}
