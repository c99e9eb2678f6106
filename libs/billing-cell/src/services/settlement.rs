// libs/billing-cell/src/services/settlement.rs
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{BalanceRow, BillingError, SettleRequest, SettleableAppointment, SettlementRecord};

const COMPLETED_STATUS: &str = "completed";

/// Moves money from patient to doctor when a completed visit is paid.
/// Preconditions are checked here for a clean error before anything
/// moves, and then re-checked inside the `settle_appointment` Postgres
/// function under row locks, so a race between two settle calls (or a
/// settle racing a top-up spend) loses with a typed error instead of
/// double-transferring.
pub struct SettlementService {
    supabase: SupabaseClient,
}

impl SettlementService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn settle(
        &self,
        request: &SettleRequest,
        auth_token: &str,
    ) -> Result<SettlementRecord, BillingError> {
        let appointment = self
            .fetch_settleable(request.appointment_id, auth_token)
            .await?;

        if appointment.patient_id != request.payer_id {
            return Err(BillingError::Forbidden);
        }
        if appointment.status != COMPLETED_STATUS {
            return Err(BillingError::NotCompleted);
        }
        if appointment.paid_at.is_some() {
            return Err(BillingError::AlreadySettled);
        }

        let balance = self.get_balance(request.payer_id, auth_token).await?;
        if balance < appointment.price_due {
            debug!(
                "Payer {} has {} but appointment {} costs {}",
                request.payer_id, balance, appointment.id, appointment.price_due
            );
            return Err(BillingError::InsufficientFunds);
        }

        let receipt_url = self.supabase.get_public_url(&format!(
            "/storage/v1/object/public/receipts/{}.pdf",
            appointment.id
        ));

        // Debit, credit and payment-field stamp happen in one
        // transaction server-side; the function raises named errors
        // when its own re-checks fail.
        let settled: SettlementRecord = self
            .supabase
            .rpc(
                "settle_appointment",
                Some(auth_token),
                json!({
                    "p_appointment_id": request.appointment_id,
                    "p_payer_id": request.payer_id,
                    "p_method": request.method,
                    "p_receipt_url": receipt_url,
                }),
            )
            .await
            .map_err(map_rpc_error)?;

        info!(
            "Settled appointment {}: {} from {} to {}",
            settled.id, settled.paid_amount, settled.patient_id, settled.doctor_id
        );
        Ok(settled)
    }

    pub async fn get_balance(
        &self,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<i64, BillingError> {
        let path = format!("/rest/v1/profiles?id=eq.{}&select=id,balance", user_id);
        let rows: Vec<BalanceRow> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .next()
            .map(|row| row.balance)
            .ok_or(BillingError::NotFound)
    }

    async fn fetch_settleable(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<SettleableAppointment, BillingError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&select=id,patient_id,doctor_id,status,price_due,paid_at",
            appointment_id,
        );
        let rows: Vec<SettleableAppointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        rows.into_iter().next().ok_or(BillingError::NotFound)
    }
}

/// The settlement function signals its re-check failures through
/// Postgres exceptions whose text carries a stable code.
fn map_rpc_error(e: SupabaseError) -> BillingError {
    let message = e.to_string();
    if message.contains("insufficient_funds") {
        BillingError::InsufficientFunds
    } else if message.contains("already_settled") {
        BillingError::AlreadySettled
    } else if message.contains("not_found") {
        BillingError::NotFound
    } else {
        BillingError::DatabaseError(message)
    }
}
