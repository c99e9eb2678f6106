// libs/appointment-cell/src/services/booking.rs
use chrono::Utc;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};
use shared_models::auth::User;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest, BookableSlot,
    CancelOutcome, VisitType,
};
use crate::services::lifecycle::AppointmentLifecycleService;

/// Coordinates the whole appointment lifecycle against the slot
/// inventory. Slot exclusivity is enforced twice: a cheap occupancy
/// read up front, then the partial unique index on
/// `appointments.slot_id` (where status <> 'cancelled') at insert
/// time - the insert either lands or comes back 409, so two racing
/// bookings can never both win.
pub struct AppointmentBookingService {
    supabase: SupabaseClient,
    lifecycle: AppointmentLifecycleService,
    visit_price: i64,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            lifecycle: AppointmentLifecycleService::new(),
            visit_price: config.visit_price,
        }
    }

    /// Book a slot for a patient. The schedule times are copied onto
    /// the appointment so the record stays meaningful if the slot is
    /// later deleted.
    pub async fn book_appointment(
        &self,
        request: &BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let visit_type = VisitType::parse(&request.visit_type)
            .ok_or_else(|| AppointmentError::InvalidVisitType(request.visit_type.clone()))?;

        let slot = self.fetch_slot(request.slot_id, auth_token).await?;

        // Fast path: reject an occupied slot before attempting the
        // insert. The unique index still backstops the race.
        if self.slot_is_taken(request.slot_id, auth_token).await? {
            return Err(AppointmentError::SlotAlreadyBooked);
        }

        let now = Utc::now();
        let body = json!([{
            "slot_id": request.slot_id,
            "doctor_id": slot.doctor_id,
            "patient_id": request.patient_id,
            "visit_type": visit_type.to_string(),
            "reason": visit_type.reason(),
            "note": request.note,
            "status": AppointmentStatus::Scheduled.to_string(),
            "scheduled_start": slot.start_time,
            "scheduled_end": slot.end_time,
            "price_due": self.visit_price,
            "created_at": now,
            "updated_at": now,
        }]);

        let created: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(body),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| match e {
                SupabaseError::Conflict(_) => AppointmentError::SlotAlreadyBooked,
                other => AppointmentError::DatabaseError(other.to_string()),
            })?;

        let appointment = created
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Insert returned no row".to_string()))?;

        info!(
            "Booked appointment {} for patient {} in slot {}",
            appointment.id, appointment.patient_id, request.slot_id
        );
        Ok(appointment)
    }

    /// Cancel an appointment. Who is asking decides what happens:
    /// the owning patient removes the record outright, while a doctor
    /// (or admin) keeps it as a cancelled audit record with the slot
    /// detached. Either way the slot becomes bookable again.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<CancelOutcome, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        self.lifecycle
            .validate_status_transition(&appointment.status, &AppointmentStatus::Cancelled)?;

        if user.is_patient() && user.owns(&appointment.patient_id) {
            self.delete_appointment(appointment_id, auth_token).await?;
            info!("Patient {} cancelled appointment {}", user.id, appointment_id);
            return Ok(CancelOutcome::Deleted);
        }

        if user.is_admin() || (user.is_doctor() && user.owns(&appointment.doctor_id)) {
            self.soft_cancel(appointment_id, auth_token).await?;
            info!("Doctor-side cancel of appointment {}", appointment_id);
            return Ok(CancelOutcome::SoftCancelled);
        }

        Err(AppointmentError::Forbidden)
    }

    /// Move an appointment to a different slot. The new slot is booked
    /// first so the patient never loses their old time without holding
    /// a new one; only once the new booking is in place is the old
    /// record removed. If that removal fails, the fresh booking is
    /// deleted again to back out.
    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        new_slot_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let existing = self.get_appointment(appointment_id, auth_token).await?;

        self.lifecycle
            .validate_status_transition(&existing.status, &AppointmentStatus::Cancelled)?;

        let request = BookAppointmentRequest {
            slot_id: new_slot_id,
            patient_id: existing.patient_id,
            visit_type: existing.visit_type.to_string(),
            note: existing.note.clone(),
        };
        let replacement = self.book_appointment(&request, auth_token).await?;

        if let Err(e) = self.delete_appointment(appointment_id, auth_token).await {
            warn!(
                "Reschedule of {} failed after booking {}; backing out the new booking",
                appointment_id, replacement.id
            );
            // Compensate so the patient is not left double-booked.
            self.delete_appointment(replacement.id, auth_token).await?;
            return Err(e);
        }

        info!(
            "Rescheduled appointment {} into {} (slot {})",
            appointment_id, replacement.id, new_slot_id
        );
        Ok(replacement)
    }

    /// Mark a visit as having happened. The status filter on the PATCH
    /// makes the write conditional: a concurrent cancel or a repeated
    /// complete matches zero rows and is reported as an invalid
    /// transition rather than silently overwriting a terminal state.
    pub async fn complete_appointment(
        &self,
        appointment_id: Uuid,
        review: Option<&str>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        self.lifecycle
            .validate_status_transition(&appointment.status, &AppointmentStatus::Completed)?;

        let mut body = json!({
            "status": AppointmentStatus::Completed.to_string(),
            "updated_at": Utc::now(),
        });
        if let Some(text) = review {
            body["note"] = json!(text);
        }

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment_id,
            AppointmentStatus::Scheduled,
        );
        let updated: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        updated
            .into_iter()
            .next()
            .ok_or(AppointmentError::InvalidStatusTransition(appointment.status))
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    /// A patient's appointments, newest first.
    pub async fn list_for_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&order=scheduled_start.desc",
            patient_id,
        );
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    /// A doctor's appointments, soonest first - this is their day view.
    pub async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&order=scheduled_start.asc",
            doctor_id,
        );
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    async fn fetch_slot(
        &self,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<BookableSlot, AppointmentError> {
        let path = format!(
            "/rest/v1/slots?id=eq.{}&select=id,doctor_id,start_time,end_time",
            slot_id,
        );
        let rows: Vec<BookableSlot> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter().next().ok_or(AppointmentError::SlotNotFound)
    }

    async fn slot_is_taken(
        &self,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?slot_id=eq.{}&status=neq.{}&select=id",
            slot_id,
            AppointmentStatus::Cancelled,
        );
        let rows: Vec<serde_json::Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        debug!("Slot {} occupancy check: {} rows", slot_id, rows.len());
        Ok(!rows.is_empty())
    }

    async fn delete_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let _: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                Some(auth_token),
                None,
                Some(representation_headers()),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    async fn soft_cancel(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let body = json!({
            "status": AppointmentStatus::Cancelled.to_string(),
            "reason": "Cancelled by doctor",
            "slot_id": serde_json::Value::Null,
            "updated_at": Utc::now(),
        });
        let _: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

fn representation_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}
