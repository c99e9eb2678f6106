// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    // Every appointment operation requires authentication
    let protected_routes = Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route(
            "/{appointment_id}/reschedule",
            post(handlers::reschedule_appointment),
        )
        .route(
            "/{appointment_id}/complete",
            post(handlers::complete_appointment),
        )
        .route(
            "/patients/{patient_id}",
            get(handlers::list_patient_appointments),
        )
        .route(
            "/doctors/{doctor_id}",
            get(handlers::list_doctor_appointments),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
