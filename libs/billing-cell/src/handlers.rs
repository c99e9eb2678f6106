// libs/billing-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{BillingError, SettleRequest};
use crate::services::invoices::InvoiceService;
use crate::services::settlement::SettlementService;

fn map_billing_error(e: BillingError) -> AppError {
    match e {
        BillingError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        BillingError::Forbidden => AppError::Forbidden(
            "Only the appointment's patient can settle it".to_string(),
        ),
        BillingError::NotCompleted => {
            AppError::Conflict("Appointment is not completed yet".to_string())
        }
        BillingError::AlreadySettled => {
            AppError::Conflict("Appointment is already settled".to_string())
        }
        BillingError::InsufficientFunds => AppError::InsufficientFunds(
            "Insufficient balance to settle this appointment".to_string(),
        ),
        BillingError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn settle_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SettleRequest>,
) -> Result<Json<Value>, AppError> {
    // The payer in the request must be the caller; admins may settle
    // on a patient's behalf.
    if !user.is_admin() && !user.owns(&request.payer_id) {
        return Err(AppError::Forbidden(
            "Cannot settle with another user's balance".to_string(),
        ));
    }

    let settlement = SettlementService::new(&state);
    let record = settlement
        .settle(&request, auth.token())
        .await
        .map_err(map_billing_error)?;

    Ok(Json(json!({
        "success": true,
        "payment": record,
    })))
}

#[axum::debug_handler]
pub async fn list_pending_invoices(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() && !user.owns(&patient_id) {
        return Err(AppError::Forbidden(
            "Not authorized to view these invoices".to_string(),
        ));
    }

    let invoices = InvoiceService::new(&state)
        .list_pending_invoices(patient_id, auth.token())
        .await
        .map_err(map_billing_error)?;

    Ok(Json(json!({ "invoices": invoices })))
}

#[axum::debug_handler]
pub async fn list_payment_history(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() && !user.owns(&patient_id) {
        return Err(AppError::Forbidden(
            "Not authorized to view this payment history".to_string(),
        ));
    }

    let payments = InvoiceService::new(&state)
        .list_payment_history(patient_id, auth.token())
        .await
        .map_err(map_billing_error)?;

    Ok(Json(json!({ "payments": payments })))
}

#[axum::debug_handler]
pub async fn get_balance(
    State(state): State<Arc<AppConfig>>,
    Path(user_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() && !user.owns(&user_id) {
        return Err(AppError::Forbidden(
            "Not authorized to view this balance".to_string(),
        ));
    }

    let balance = SettlementService::new(&state)
        .get_balance(user_id, auth.token())
        .await
        .map_err(map_billing_error)?;

    Ok(Json(json!({ "user_id": user_id, "balance": balance })))
}
