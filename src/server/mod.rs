//! HTTP facade - pure plumbing over the node.

mod routes;

pub use routes::{create_router, AppState};
