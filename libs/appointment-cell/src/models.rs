// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A booked (or formerly booked) visit. `scheduled_start`/`scheduled_end`
/// are copied from the slot at booking time so the record survives the
/// slot's deletion; `slot_id` goes null when a doctor deletes the slot.
/// Payment fields are written exactly once, by settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub slot_id: Option<Uuid>,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub visit_type: VisitType,
    pub reason: String,
    pub note: Option<String>,
    pub status: AppointmentStatus,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub price_due: i64,
    pub paid_amount: Option<i64>,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub receipt_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VisitType {
    #[serde(rename = "new")]
    New,
    #[serde(rename = "follow-up")]
    FollowUp,
}

impl VisitType {
    /// Accepted wire values for the booking request.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "new" => Some(VisitType::New),
            "follow-up" => Some(VisitType::FollowUp),
            _ => None,
        }
    }

    /// Display reason recorded on the appointment at booking time.
    pub fn reason(&self) -> &'static str {
        match self {
            VisitType::New => "New Problem",
            VisitType::FollowUp => "Follow-Up",
        }
    }
}

impl fmt::Display for VisitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitType::New => write!(f, "new"),
            VisitType::FollowUp => write!(f, "follow-up"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// Booking input. `visit_type` stays a raw string so an unknown value
/// surfaces as a validation error rather than a body-rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct BookAppointmentRequest {
    pub slot_id: Uuid,
    pub patient_id: Uuid,
    pub visit_type: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_slot_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteAppointmentRequest {
    pub review: Option<String>,
}

/// How a cancellation landed. Patient-initiated cancels delete the
/// record outright; doctor-initiated cancels keep it as an audit
/// record with the slot detached. Both free the slot for rebooking.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
    Deleted,
    SoftCancelled,
}

// ==============================================================================
// TYPED READ SHAPES
// ==============================================================================

/// The slot row the coordinator reads before booking.
#[derive(Debug, Clone, Deserialize)]
pub struct BookableSlot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Slot not found")]
    SlotNotFound,

    #[error("Slot is already booked")]
    SlotAlreadyBooked,

    #[error("Invalid visit type: {0}")]
    InvalidVisitType(String),

    #[error("Not authorized to act on this appointment")]
    Forbidden,

    #[error("Appointment cannot be modified in status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
