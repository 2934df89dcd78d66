//! API module for all HTTP handlers

pub mod containers;
pub mod handlers;
pub mod restart;

use axum::{Router, routing};

use crate::SharedState;

// Re-export handlers
pub use containers::list_containers;
pub use handlers::{root, status};
pub use restart::{restart_container, restart_passing_workflow};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", routing::get(root))
        .route("/status", routing::get(status))
        .route("/containers", routing::get(list_containers))
        .route("/restart/{container_name}", routing::post(restart_container))
        .route(
            "/restart-passing-workflow/{container_name}/{workflow_name}",
            routing::post(restart_passing_workflow),
        )
        .with_state(state)
}
