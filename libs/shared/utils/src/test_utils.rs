use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            redis_url: None,
            visit_price: 30,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn with_id(id: Uuid, role: &str) -> Self {
        Self {
            id: id.to_string(),
            email: format!("{}@example.com", role),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned PostgREST rows for wiremock-backed tests.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn slot_row(
        slot_id: &Uuid,
        doctor_id: &Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> serde_json::Value {
        json!({
            "id": slot_id,
            "doctor_id": doctor_id,
            "start_time": start.to_rfc3339(),
            "end_time": end.to_rfc3339(),
            "created_at": Utc::now().to_rfc3339()
        })
    }

    pub fn appointment_row(
        appointment_id: &Uuid,
        slot_id: Option<&Uuid>,
        doctor_id: &Uuid,
        patient_id: &Uuid,
        status: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> serde_json::Value {
        json!({
            "id": appointment_id,
            "slot_id": slot_id,
            "doctor_id": doctor_id,
            "patient_id": patient_id,
            "visit_type": "new",
            "reason": "New Problem",
            "note": null,
            "status": status,
            "scheduled_start": start.to_rfc3339(),
            "scheduled_end": end.to_rfc3339(),
            "price_due": 30,
            "paid_amount": null,
            "paid_at": null,
            "payment_method": null,
            "receipt_url": null,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        })
    }

    pub fn settled_appointment_row(
        appointment_id: &Uuid,
        doctor_id: &Uuid,
        patient_id: &Uuid,
        amount: i64,
        method: &str,
    ) -> serde_json::Value {
        let now = Utc::now();
        json!({
            "id": appointment_id,
            "slot_id": null,
            "doctor_id": doctor_id,
            "patient_id": patient_id,
            "visit_type": "new",
            "reason": "New Problem",
            "note": null,
            "status": "completed",
            "scheduled_start": (now - Duration::hours(2)).to_rfc3339(),
            "scheduled_end": (now - Duration::hours(1)).to_rfc3339(),
            "price_due": amount,
            "paid_amount": amount,
            "paid_at": now.to_rfc3339(),
            "payment_method": method,
            "receipt_url": format!("http://localhost:54321/storage/v1/object/public/receipts/{}.pdf", appointment_id),
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        })
    }

    pub fn profile_row(user_id: &Uuid, role: &str, balance: i64) -> serde_json::Value {
        json!({
            "id": user_id,
            "role": role,
            "balance": balance
        })
    }

    pub fn doctor_row(doctor_id: &Uuid, full_name: &str, specialty: &str) -> serde_json::Value {
        json!({
            "id": doctor_id,
            "full_name": full_name,
            "specialty": specialty,
            "is_available": true
        })
    }
}
