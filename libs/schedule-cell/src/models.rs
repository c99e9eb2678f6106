// libs/schedule-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// SLOT MODELS
// ==============================================================================

/// A bookable time interval offered by a doctor. Time bounds are
/// immutable once created; a slot is deleted only by its owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// Shift definition for range-mode generation. Every field is required;
/// they are optional here only so a missing one surfaces as a
/// validation error instead of a deserialization failure.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateSlotsRequest {
    pub doctor_id: Uuid,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub slot_minutes: Option<i64>,
    pub break_minutes: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotWindow {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Explicit slot list supplied by the calendar-copy UI.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkSlotsRequest {
    pub doctor_id: Uuid,
    pub slots: Vec<SlotWindow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CopyPreviousWeekRequest {
    pub doctor_id: Uuid,
    pub week_start: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotBatchResult {
    pub created: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotDeletionResult {
    pub deleted: usize,
    pub cancelled_appointments: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailableSlotsQuery {
    /// When present, the returned ordering is remembered for this
    /// conversation so a follow-up "book number N" resolves against
    /// exactly the list the caller was shown.
    pub conversation_id: Option<Uuid>,
}

// ==============================================================================
// TYPED READ SHAPES (one per query, no generic include graphs)
// ==============================================================================

/// Projection of appointments that currently occupy a slot.
#[derive(Debug, Clone, Deserialize)]
pub struct OccupiedSlotRef {
    pub slot_id: Option<Uuid>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid slot window: {0}")]
    InvalidWindow(String),

    #[error("No slots found in the source week")]
    NoSourceSlots,

    #[error("Slot not found")]
    SlotNotFound,

    #[error("Slot does not belong to the requesting doctor")]
    NotOwner,

    #[error("Conversation cache is not configured")]
    CacheUnavailable,

    #[error("Conversation cache error: {0}")]
    CacheError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
