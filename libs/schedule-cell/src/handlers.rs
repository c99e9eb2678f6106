// libs/schedule-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AvailableSlotsQuery, BulkSlotsRequest, CopyPreviousWeekRequest, GenerateSlotsRequest,
    ScheduleError, SlotBatchResult,
};
use crate::services::availability::AvailabilityService;
use crate::services::generator::SlotGeneratorService;
use crate::services::presentation::SlotPresentationCache;

fn map_schedule_error(e: ScheduleError) -> AppError {
    match e {
        ScheduleError::MissingField(field) => {
            AppError::ValidationError(format!("Missing required field: {}", field))
        }
        ScheduleError::InvalidWindow(msg) => AppError::ValidationError(msg),
        ScheduleError::NoSourceSlots => {
            AppError::NotFound("No slots found in the source week".to_string())
        }
        ScheduleError::SlotNotFound => AppError::NotFound("Slot not found".to_string()),
        ScheduleError::NotOwner => {
            AppError::Auth("Not authorized to manage this doctor's slots".to_string())
        }
        ScheduleError::CacheUnavailable => {
            AppError::Internal("Conversation cache is not configured".to_string())
        }
        ScheduleError::CacheError(msg) => AppError::Internal(msg),
        ScheduleError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Only the owning doctor (or an admin) may manage a doctor's slots.
fn authorize_doctor(user: &User, doctor_id: &Uuid) -> Result<(), AppError> {
    if user.is_admin() || (user.is_doctor() && user.owns(doctor_id)) {
        return Ok(());
    }
    Err(AppError::Auth(
        "Not authorized to manage this doctor's slots".to_string(),
    ))
}

#[axum::debug_handler]
pub async fn generate_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<GenerateSlotsRequest>,
) -> Result<Json<Value>, AppError> {
    authorize_doctor(&user, &request.doctor_id)?;

    let generator = SlotGeneratorService::new(&state);
    let created = generator
        .generate_range(&request, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "result": SlotBatchResult { created },
    })))
}

#[axum::debug_handler]
pub async fn bulk_create_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BulkSlotsRequest>,
) -> Result<Json<Value>, AppError> {
    authorize_doctor(&user, &request.doctor_id)?;

    let generator = SlotGeneratorService::new(&state);
    let created = generator
        .generate_bulk(request.doctor_id, &request.slots, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "result": SlotBatchResult { created },
    })))
}

#[axum::debug_handler]
pub async fn copy_previous_week(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CopyPreviousWeekRequest>,
) -> Result<Json<Value>, AppError> {
    authorize_doctor(&user, &request.doctor_id)?;

    let generator = SlotGeneratorService::new(&state);
    let created = generator
        .copy_previous_week(request.doctor_id, request.week_start, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "result": SlotBatchResult { created },
    })))
}

#[axum::debug_handler]
pub async fn list_available_slots(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<AvailableSlotsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let availability = AvailabilityService::new(&state);
    let slots = availability
        .list_available_slots(doctor_id, auth.token())
        .await
        .map_err(map_schedule_error)?;

    // A chat conversation remembers the ordering it was shown so a
    // later "book number N" resolves against this exact list.
    if let Some(conversation_id) = query.conversation_id {
        let cache = SlotPresentationCache::new(&state).map_err(map_schedule_error)?;
        let slot_ids: Vec<Uuid> = slots.iter().map(|s| s.id).collect();
        cache
            .remember(conversation_id, &slot_ids)
            .await
            .map_err(map_schedule_error)?;
    }

    Ok(Json(json!({ "slots": slots })))
}

#[axum::debug_handler]
pub async fn resolve_presented_slot(
    State(state): State<Arc<AppConfig>>,
    Path((conversation_id, position)): Path<(Uuid, usize)>,
) -> Result<Json<Value>, AppError> {
    let cache = SlotPresentationCache::new(&state).map_err(map_schedule_error)?;
    let slot_id = cache
        .resolve(conversation_id, position)
        .await
        .map_err(map_schedule_error)?
        .ok_or_else(|| {
            AppError::NotFound(format!("No presented slot at position {}", position))
        })?;

    Ok(Json(json!({ "slot_id": slot_id })))
}

#[axum::debug_handler]
pub async fn delete_slot(
    State(state): State<Arc<AppConfig>>,
    Path(slot_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_doctor() && !user.is_admin() {
        return Err(AppError::Auth(
            "Only doctors can delete slots".to_string(),
        ));
    }

    let requester = if user.is_admin() { None } else { Some(user.id.as_str()) };
    let generator = SlotGeneratorService::new(&state);
    let result = generator
        .delete_slot(slot_id, requester, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "result": result,
    })))
}

#[axum::debug_handler]
pub async fn delete_slots_by_day(
    State(state): State<Arc<AppConfig>>,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    authorize_doctor(&user, &doctor_id)?;

    let generator = SlotGeneratorService::new(&state);
    let result = generator
        .delete_slots_by_day(doctor_id, date, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "result": result,
    })))
}
