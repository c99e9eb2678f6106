// libs/billing-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SettleRequest {
    pub appointment_id: Uuid,
    pub payer_id: Uuid,
    pub method: String,
}

// ==============================================================================
// TYPED READ SHAPES
// ==============================================================================

/// The appointment fields settlement needs for its precondition
/// checks. One shape per read; no generic row fetches.
#[derive(Debug, Clone, Deserialize)]
pub struct SettleableAppointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub status: String,
    pub price_due: i64,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceRow {
    pub id: Uuid,
    pub balance: i64,
}

/// What the settlement function hands back after the transfer commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub price_due: i64,
    pub paid_amount: i64,
    pub paid_at: DateTime<Utc>,
    pub payment_method: String,
    pub receipt_url: Option<String>,
}

/// A completed, unpaid visit awaiting settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub visit_type: String,
    pub reason: String,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub price_due: i64,
}

/// A settled visit, for the payment history view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub scheduled_start: DateTime<Utc>,
    pub paid_amount: i64,
    pub paid_at: DateTime<Utc>,
    pub payment_method: String,
    pub receipt_url: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Only the appointment's patient can settle it")]
    Forbidden,

    #[error("Appointment is not completed yet")]
    NotCompleted,

    #[error("Appointment is already settled")]
    AlreadySettled,

    #[error("Insufficient balance to settle this appointment")]
    InsufficientFunds,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
