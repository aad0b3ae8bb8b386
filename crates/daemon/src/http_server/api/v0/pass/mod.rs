use axum::routing::get;
use axum::Router;

use crate::ServiceState;

pub mod delete;
pub mod read;
pub mod write;

pub use delete::{DeleteRequest, DeleteResponse};
pub use read::{ChildInfo, ChildType, DirectoryInfo, ReadRequest, ReadResponse, SecretInfo};
pub use write::{WriteRequest, WriteResponse};

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/", get(read::handler))
        .route(
            "/*path",
            get(read::handler)
                .post(write::handler)
                .delete(delete::handler),
        )
        .with_state(state)
}
