// libs/schedule-cell/src/services/generator.rs
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    GenerateSlotsRequest, ScheduleError, Slot, SlotDeletionResult, SlotWindow,
};

/// Materializes bookable slots from a doctor's shift rules and owns
/// slot deletion (with its cancellation cascade). Inserts are
/// duplicate-skipping: an identical (doctor, start, end) tuple is
/// silently ignored, so re-submitting a shift is idempotent.
pub struct SlotGeneratorService {
    supabase: SupabaseClient,
}

const MAX_SHIFT_MINUTES: i64 = 24 * 60;

/// Greedy fixed-stride packing: emit [cur, cur+len) while the full
/// slot fits, then advance by len + break. A trailing partial slot
/// that would overrun the window is dropped - partial slots are
/// unbookable.
pub fn build_range_windows(
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    slot_minutes: i64,
    break_minutes: i64,
) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>, ScheduleError> {
    if slot_minutes <= 0 {
        return Err(ScheduleError::InvalidWindow(
            "Slot length must be positive".to_string(),
        ));
    }
    if break_minutes < 0 {
        return Err(ScheduleError::InvalidWindow(
            "Break length cannot be negative".to_string(),
        ));
    }
    // A shift never spans more than a day; anything larger would also
    // overflow the Duration arithmetic below.
    if slot_minutes > MAX_SHIFT_MINUTES || break_minutes > MAX_SHIFT_MINUTES {
        return Err(ScheduleError::InvalidWindow(
            "Slot and break lengths cannot exceed 24 hours".to_string(),
        ));
    }
    if start >= end {
        return Err(ScheduleError::InvalidWindow(
            "Shift start must be before shift end".to_string(),
        ));
    }

    let window_end = date.and_time(end).and_utc();
    let length = Duration::minutes(slot_minutes);
    let stride = length + Duration::minutes(break_minutes);

    let mut windows = Vec::new();
    let mut current = date.and_time(start).and_utc();
    while current + length <= window_end {
        windows.push((current, current + length));
        current += stride;
    }

    Ok(windows)
}

impl SlotGeneratorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Range mode: fixed-stride slots packed into one shift window.
    pub async fn generate_range(
        &self,
        request: &GenerateSlotsRequest,
        auth_token: &str,
    ) -> Result<usize, ScheduleError> {
        let date = request.date.ok_or(ScheduleError::MissingField("date"))?;
        let start = request
            .start_time
            .ok_or(ScheduleError::MissingField("start_time"))?;
        let end = request
            .end_time
            .ok_or(ScheduleError::MissingField("end_time"))?;
        let slot_minutes = request
            .slot_minutes
            .ok_or(ScheduleError::MissingField("slot_minutes"))?;
        let break_minutes = request
            .break_minutes
            .ok_or(ScheduleError::MissingField("break_minutes"))?;

        let windows = build_range_windows(date, start, end, slot_minutes, break_minutes)?;
        debug!(
            "Generating {} range slots for doctor {} on {}",
            windows.len(),
            request.doctor_id,
            date
        );

        self.insert_slots(request.doctor_id, &windows, auth_token)
            .await
    }

    /// Bulk mode: an explicit window list from the calendar-copy UI.
    pub async fn generate_bulk(
        &self,
        doctor_id: Uuid,
        slots: &[SlotWindow],
        auth_token: &str,
    ) -> Result<usize, ScheduleError> {
        let mut windows = Vec::with_capacity(slots.len());
        for window in slots {
            if window.start_time >= window.end_time {
                return Err(ScheduleError::InvalidWindow(format!(
                    "Slot starting at {} ends before it begins",
                    window.start_time
                )));
            }
            windows.push((window.start_time, window.end_time));
        }

        self.insert_slots(doctor_id, &windows, auth_token).await
    }

    /// Copies the time shape of the week before `week_start`, shifted
    /// forward seven days. Booking state is not copied: every new slot
    /// starts free.
    pub async fn copy_previous_week(
        &self,
        doctor_id: Uuid,
        week_start: NaiveDate,
        auth_token: &str,
    ) -> Result<usize, ScheduleError> {
        let window_end = week_start.and_time(NaiveTime::MIN).and_utc();
        let window_start = window_end - Duration::days(7);

        let path = format!(
            "/rest/v1/slots?doctor_id=eq.{}&start_time=gte.{}&start_time=lt.{}&order=start_time.asc",
            doctor_id,
            urlencoding::encode(&window_start.to_rfc3339()),
            urlencoding::encode(&window_end.to_rfc3339()),
        );

        let source: Vec<Slot> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        if source.is_empty() {
            return Err(ScheduleError::NoSourceSlots);
        }

        let shifted: Vec<(DateTime<Utc>, DateTime<Utc>)> = source
            .iter()
            .map(|slot| {
                (
                    slot.start_time + Duration::days(7),
                    slot.end_time + Duration::days(7),
                )
            })
            .collect();

        info!(
            "Copying {} slots forward one week for doctor {}",
            shifted.len(),
            doctor_id
        );

        self.insert_slots(doctor_id, &shifted, auth_token).await
    }

    /// Deletes a single slot after soft-cancelling any active
    /// appointment attached to it. `requester_id` of None skips the
    /// ownership check (admin path).
    pub async fn delete_slot(
        &self,
        slot_id: Uuid,
        requester_id: Option<&str>,
        auth_token: &str,
    ) -> Result<SlotDeletionResult, ScheduleError> {
        let path = format!("/rest/v1/slots?id=eq.{}", slot_id);
        let rows: Vec<Slot> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let slot = rows.into_iter().next().ok_or(ScheduleError::SlotNotFound)?;
        if let Some(requester) = requester_id {
            if slot.doctor_id.to_string() != requester {
                return Err(ScheduleError::NotOwner);
            }
        }

        let cancelled = self
            .soft_cancel_attached(&format!("slot_id=eq.{}", slot_id), auth_token)
            .await?;

        let delete_path = format!("/rest/v1/slots?id=eq.{}", slot_id);
        let deleted: Vec<Slot> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &delete_path,
                Some(auth_token),
                None,
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        Ok(SlotDeletionResult {
            deleted: deleted.len(),
            cancelled_appointments: cancelled,
        })
    }

    /// Deletes every slot a doctor has on the given day. Attached
    /// active appointments are soft-cancelled first so patients keep
    /// an audit record of the cancellation.
    pub async fn delete_slots_by_day(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<SlotDeletionResult, ScheduleError> {
        let day_start = date.and_time(NaiveTime::MIN).and_utc();
        let day_end = day_start + Duration::days(1);

        let path = format!(
            "/rest/v1/slots?doctor_id=eq.{}&start_time=gte.{}&start_time=lt.{}",
            doctor_id,
            urlencoding::encode(&day_start.to_rfc3339()),
            urlencoding::encode(&day_end.to_rfc3339()),
        );
        let slots: Vec<Slot> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        if slots.is_empty() {
            return Ok(SlotDeletionResult {
                deleted: 0,
                cancelled_appointments: 0,
            });
        }

        let id_list = slots
            .iter()
            .map(|s| s.id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let cancelled = self
            .soft_cancel_attached(&format!("slot_id=in.({})", id_list), auth_token)
            .await?;

        let delete_path = format!("/rest/v1/slots?id=in.({})", id_list);
        let deleted: Vec<Slot> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &delete_path,
                Some(auth_token),
                None,
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        info!(
            "Deleted {} slots for doctor {} on {} ({} appointments cancelled)",
            deleted.len(),
            doctor_id,
            date,
            cancelled
        );

        Ok(SlotDeletionResult {
            deleted: deleted.len(),
            cancelled_appointments: cancelled,
        })
    }

    // Private helpers

    /// Duplicate-skipping batch insert. PostgREST resolves conflicts
    /// on (doctor_id, start_time, end_time) by ignoring the duplicate
    /// row, and the representation contains only actually-created rows.
    async fn insert_slots(
        &self,
        doctor_id: Uuid,
        windows: &[(DateTime<Utc>, DateTime<Utc>)],
        auth_token: &str,
    ) -> Result<usize, ScheduleError> {
        if windows.is_empty() {
            return Ok(0);
        }

        let rows: Vec<Value> = windows
            .iter()
            .map(|(start, end)| {
                json!({
                    "doctor_id": doctor_id,
                    "start_time": start,
                    "end_time": end,
                })
            })
            .collect();

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static(
                "resolution=ignore-duplicates,return=representation",
            ),
        );

        let created: Vec<Slot> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/slots?on_conflict=doctor_id,start_time,end_time",
                Some(auth_token),
                Some(Value::Array(rows)),
                Some(headers),
            )
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        debug!("Created {} slots for doctor {}", created.len(), doctor_id);
        Ok(created.len())
    }

    /// Marks active appointments matching `filter` as cancelled by the
    /// doctor and detaches the slot reference; the time-stamped record
    /// survives for the patient.
    async fn soft_cancel_attached(
        &self,
        filter: &str,
        auth_token: &str,
    ) -> Result<usize, ScheduleError> {
        let path = format!("/rest/v1/appointments?{}&status=neq.cancelled", filter);
        let body = json!({
            "status": "cancelled",
            "reason": "Cancelled by doctor",
            "slot_id": null,
            "updated_at": Utc::now().to_rfc3339()
        });

        let cancelled: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        Ok(cancelled.len())
    }

    fn representation_headers() -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );
        headers
    }
}
