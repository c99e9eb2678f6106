// libs/schedule-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn schedule_routes(state: Arc<AppConfig>) -> Router {
    // All slot operations require authentication
    let protected_routes = Router::new()
        .route("/generate", post(handlers::generate_slots))
        .route("/bulk", post(handlers::bulk_create_slots))
        .route("/copy-previous-week", post(handlers::copy_previous_week))
        .route(
            "/doctors/{doctor_id}/available",
            get(handlers::list_available_slots),
        )
        .route(
            "/presented/{conversation_id}/{position}",
            get(handlers::resolve_presented_slot),
        )
        .route("/{slot_id}", delete(handlers::delete_slot))
        .route(
            "/doctors/{doctor_id}/day/{date}",
            delete(handlers::delete_slots_by_day),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
