// libs/billing-cell/src/services/invoices.rs
use reqwest::Method;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{BillingError, Invoice, PaymentRecord};

/// Read-only billing views over the appointment ledger.
pub struct InvoiceService {
    supabase: SupabaseClient,
}

impl InvoiceService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Completed but unpaid visits, oldest first, so the patient
    /// settles in visit order.
    pub async fn list_pending_invoices(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Invoice>, BillingError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&status=eq.completed&paid_at=is.null\
             &select=id,doctor_id,visit_type,reason,scheduled_start,scheduled_end,price_due\
             &order=scheduled_start.asc",
            patient_id,
        );
        let invoices: Vec<Invoice> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        debug!(
            "Patient {} has {} pending invoices",
            patient_id,
            invoices.len()
        );
        Ok(invoices)
    }

    /// Settled visits, most recent payment first.
    pub async fn list_payment_history(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<PaymentRecord>, BillingError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&paid_at=not.is.null\
             &select=id,doctor_id,scheduled_start,paid_amount,paid_at,payment_method,receipt_url\
             &order=paid_at.desc",
            patient_id,
        );
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))
    }
}
