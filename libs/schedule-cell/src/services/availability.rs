// libs/schedule-cell/src/services/availability.rs
use std::collections::HashSet;

use chrono::Utc;
use reqwest::Method;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{OccupiedSlotRef, ScheduleError, Slot};

/// Read-only query surface over unbooked slots.
pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Upcoming free slots for a doctor, earliest first. The ascending
    /// order is part of the contract: the chat-style booking flow
    /// resolves "book number N" positionally against this exact list.
    pub async fn list_available_slots(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Slot>, ScheduleError> {
        let now = Utc::now().to_rfc3339();

        let slots_path = format!(
            "/rest/v1/slots?doctor_id=eq.{}&start_time=gte.{}&order=start_time.asc",
            doctor_id,
            urlencoding::encode(&now),
        );
        let slots: Vec<Slot> = self
            .supabase
            .request(Method::GET, &slots_path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        if slots.is_empty() {
            return Ok(slots);
        }

        let occupied_path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=neq.cancelled&slot_id=not.is.null&select=slot_id",
            doctor_id,
        );
        let occupied: Vec<OccupiedSlotRef> = self
            .supabase
            .request(Method::GET, &occupied_path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let taken: HashSet<Uuid> = occupied.into_iter().filter_map(|r| r.slot_id).collect();

        let free: Vec<Slot> = slots
            .into_iter()
            .filter(|slot| !taken.contains(&slot.id))
            .collect();

        debug!(
            "Doctor {} has {} free upcoming slots",
            doctor_id,
            free.len()
        );
        Ok(free)
    }
}
