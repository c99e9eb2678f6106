// libs/appointment-cell/src/handlers.rs
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

use crate::models::{
    Appointment, AppointmentError, BookAppointmentRequest, CompleteAppointmentRequest,
    RescheduleAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::SlotNotFound => AppError::NotFound("Slot not found".to_string()),
        AppointmentError::SlotAlreadyBooked => {
            AppError::Conflict("Slot is already booked".to_string())
        }
        AppointmentError::InvalidVisitType(raw) => {
            AppError::ValidationError(format!("Invalid visit type: {}", raw))
        }
        AppointmentError::Forbidden => {
            AppError::Forbidden("Not authorized to act on this appointment".to_string())
        }
        AppointmentError::InvalidStatusTransition(status) => {
            AppError::Conflict(format!("Appointment cannot be modified in status: {}", status))
        }
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Patients act on their own appointments; admins on any.
fn authorize_patient_side(user: &User, appointment: &Appointment) -> Result<(), AppError> {
    if user.is_admin() || (user.is_patient() && user.owns(&appointment.patient_id)) {
        return Ok(());
    }
    Err(AppError::Forbidden(
        "Not authorized to act on this appointment".to_string(),
    ))
}

fn authorize_doctor_side(user: &User, appointment: &Appointment) -> Result<(), AppError> {
    if user.is_admin() || (user.is_doctor() && user.owns(&appointment.doctor_id)) {
        return Ok(());
    }
    Err(AppError::Forbidden(
        "Not authorized to act on this appointment".to_string(),
    ))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() && !user.owns(&request.patient_id) {
        return Err(AppError::Forbidden(
            "Patients can only book for themselves".to_string(),
        ));
    }

    let booking = AppointmentBookingService::new(&state);
    let appointment = booking
        .book_appointment(&request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking = AppointmentBookingService::new(&state);
    let outcome = booking
        .cancel_appointment(appointment_id, &user, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "result": outcome,
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let booking = AppointmentBookingService::new(&state);

    let existing = booking
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;
    authorize_patient_side(&user, &existing)?;

    let appointment = booking
        .reschedule_appointment(appointment_id, request.new_slot_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CompleteAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let booking = AppointmentBookingService::new(&state);

    let existing = booking
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;
    authorize_doctor_side(&user, &existing)?;

    let appointment = booking
        .complete_appointment(appointment_id, request.review.as_deref(), auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking = AppointmentBookingService::new(&state);
    let appointment = booking
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    // Visible to either party of the visit.
    if !user.is_admin()
        && !user.owns(&appointment.patient_id)
        && !user.owns(&appointment.doctor_id)
    {
        return Err(AppError::Forbidden(
            "Not authorized to view this appointment".to_string(),
        ));
    }

    Ok(Json(json!({ "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn list_patient_appointments(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() && !user.owns(&patient_id) {
        return Err(AppError::Forbidden(
            "Not authorized to view these appointments".to_string(),
        ));
    }

    let booking = AppointmentBookingService::new(&state);
    let appointments = booking
        .list_for_patient(patient_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

#[axum::debug_handler]
pub async fn list_doctor_appointments(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() && !(user.is_doctor() && user.owns(&doctor_id)) {
        return Err(AppError::Forbidden(
            "Not authorized to view these appointments".to_string(),
        ));
    }

    let booking = AppointmentBookingService::new(&state);
    let appointments = booking
        .list_for_doctor(doctor_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}
