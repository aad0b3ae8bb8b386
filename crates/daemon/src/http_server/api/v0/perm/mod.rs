use axum::routing::get;
use axum::Router;

use crate::ServiceState;

pub mod read;
pub mod update;

pub use read::{PermRequest, PermResponse};
pub use update::{UpdatePermRequest, UpdatePermResponse};

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/", get(read::handler))
        .route("/*path", get(read::handler).post(update::handler))
        .with_state(state)
}
