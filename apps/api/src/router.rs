use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use billing_cell::router::billing_routes;
use schedule_cell::router::schedule_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic Scheduling API is running!" }))
        .nest("/slots", schedule_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/billing", billing_routes(state))
}
