// libs/billing-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn billing_routes(state: Arc<AppConfig>) -> Router {
    // Money only moves for authenticated callers
    let protected_routes = Router::new()
        .route("/settle", post(handlers::settle_appointment))
        .route("/invoices/{patient_id}", get(handlers::list_pending_invoices))
        .route("/payments/{patient_id}", get(handlers::list_payment_history))
        .route("/balance/{user_id}", get(handlers::get_balance))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
