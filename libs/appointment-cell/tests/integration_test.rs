use std::sync::Arc;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{Mock, MockServer, ResponseTemplate};
use wiremock::matchers::{body_partial_json, method, path, query_param};

use appointment_cell::router::appointment_routes;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

async fn create_test_app(config: &AppConfig) -> Router {
    appointment_routes(Arc::new(config.clone()))
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn book_body(slot_id: &Uuid, patient_id: &str) -> Value {
    json!({
        "slot_id": slot_id,
        "patient_id": patient_id,
        "visit_type": "new",
        "note": "first visit",
    })
}

#[tokio::test]
async fn booking_a_free_slot_succeeds() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let user = TestUser::with_id(patient_id, "patient");
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let app = create_test_app(&config).await;
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let start = Utc::now() + Duration::days(1);
    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_row(&slot_id, &doctor_id, start, start + Duration::minutes(30))
        ])))
        .mount(&mock_server)
        .await;

    // Slot currently unoccupied
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &Uuid::new_v4(),
                Some(&slot_id),
                &doctor_id,
                &patient_id,
                "scheduled",
                start,
                start + Duration::minutes(30)
            )
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(book_body(&slot_id, &user.id).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["appointment"]["status"], "scheduled");
    assert_eq!(json["appointment"]["slot_id"], json!(slot_id));
}

#[tokio::test]
async fn booking_an_occupied_slot_conflicts() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let user = TestUser::with_id(patient_id, "patient");
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let app = create_test_app(&config).await;
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let start = Utc::now() + Duration::days(1);
    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_row(&slot_id, &doctor_id, start, start + Duration::minutes(30))
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "id": Uuid::new_v4() }])),
        )
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(book_body(&slot_id, &user.id).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn losing_the_booking_race_conflicts() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let user = TestUser::with_id(patient_id, "patient");
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let app = create_test_app(&config).await;
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let start = Utc::now() + Duration::days(1);
    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_row(&slot_id, &doctor_id, start, start + Duration::minutes(30))
        ])))
        .mount(&mock_server)
        .await;

    // The occupancy read sees a free slot, but another booking lands
    // first and the unique index rejects the insert.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "duplicate key value violates unique constraint \"appointments_slot_id_active_key\""
        })))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(book_body(&slot_id, &user.id).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn booking_for_another_patient_is_forbidden() {
    let config = TestConfig::default().to_app_config();
    let app = create_test_app(&config).await;
    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let body = book_body(&Uuid::new_v4(), &Uuid::new_v4().to_string());
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_visit_type_is_rejected() {
    let config = TestConfig::default().to_app_config();
    let app = create_test_app(&config).await;
    let patient_id = Uuid::new_v4();
    let user = TestUser::with_id(patient_id, "patient");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let body = json!({
        "slot_id": Uuid::new_v4(),
        "patient_id": patient_id,
        "visit_type": "emergency",
        "note": null,
    });
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patient_cancel_deletes_the_appointment() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let user = TestUser::with_id(patient_id, "patient");
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let app = create_test_app(&config).await;
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let start = Utc::now() + Duration::days(1);
    let row = MockSupabaseResponses::appointment_row(
        &appointment_id,
        Some(&Uuid::new_v4()),
        &doctor_id,
        &patient_id,
        "scheduled",
        start,
        start + Duration::minutes(30),
    );

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri(&format!("/{}/cancel", appointment_id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["result"]["outcome"], "deleted");
}

#[tokio::test]
async fn doctor_cancel_keeps_an_audit_record() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let user = TestUser::with_id(doctor_id, "doctor");
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let app = create_test_app(&config).await;
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let start = Utc::now() + Duration::days(1);
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &appointment_id,
                Some(&Uuid::new_v4()),
                &doctor_id,
                &patient_id,
                "scheduled",
                start,
                start + Duration::minutes(30)
            )
        ])))
        .mount(&mock_server)
        .await;

    // The audit record must carry the reason and a detached slot
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({
            "status": "cancelled",
            "reason": "Cancelled by doctor",
            "slot_id": null,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &appointment_id,
                None,
                &doctor_id,
                &patient_id,
                "cancelled",
                start,
                start + Duration::minutes(30)
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri(&format!("/{}/cancel", appointment_id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["result"]["outcome"], "soft_cancelled");
}

#[tokio::test]
async fn cancelling_a_cancelled_appointment_conflicts() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let user = TestUser::with_id(patient_id, "patient");
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let app = create_test_app(&config).await;
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let start = Utc::now() - Duration::days(1);
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &appointment_id,
                None,
                &Uuid::new_v4(),
                &patient_id,
                "cancelled",
                start,
                start + Duration::minutes(30)
            )
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri(&format!("/{}/cancel", appointment_id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn stranger_cannot_cancel_an_appointment() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let user = TestUser::patient("stranger@example.com");
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let app = create_test_app(&config).await;
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let start = Utc::now() + Duration::days(1);
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &appointment_id,
                Some(&Uuid::new_v4()),
                &Uuid::new_v4(),
                &Uuid::new_v4(),
                "scheduled",
                start,
                start + Duration::minutes(30)
            )
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri(&format!("/{}/cancel", appointment_id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn reschedule_books_the_new_slot_and_removes_the_old_booking() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let new_appointment_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let new_slot_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let user = TestUser::with_id(patient_id, "patient");
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let app = create_test_app(&config).await;
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let old_start = Utc::now() + Duration::days(1);
    let new_start = Utc::now() + Duration::days(2);
    let old_row = MockSupabaseResponses::appointment_row(
        &appointment_id,
        Some(&Uuid::new_v4()),
        &doctor_id,
        &patient_id,
        "scheduled",
        old_start,
        old_start + Duration::minutes(30),
    );

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([old_row])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_row(
                &new_slot_id,
                &doctor_id,
                new_start,
                new_start + Duration::minutes(30)
            )
        ])))
        .mount(&mock_server)
        .await;

    // New slot is free
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("slot_id", format!("eq.{}", new_slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &new_appointment_id,
                Some(&new_slot_id),
                &doctor_id,
                &patient_id,
                "scheduled",
                new_start,
                new_start + Duration::minutes(30)
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([old_row])))
        .mount(&mock_server)
        .await;

    let body = json!({ "new_slot_id": new_slot_id });
    let request = Request::builder()
        .method("POST")
        .uri(&format!("/{}/reschedule", appointment_id))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["appointment"]["id"], json!(new_appointment_id));
    assert_eq!(json["appointment"]["slot_id"], json!(new_slot_id));
}

#[tokio::test]
async fn doctor_completes_a_scheduled_visit() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let user = TestUser::with_id(doctor_id, "doctor");
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let app = create_test_app(&config).await;
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let start = Utc::now() - Duration::hours(1);
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &appointment_id,
                Some(&Uuid::new_v4()),
                &doctor_id,
                &patient_id,
                "scheduled",
                start,
                start + Duration::minutes(30)
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &appointment_id,
                Some(&Uuid::new_v4()),
                &doctor_id,
                &patient_id,
                "completed",
                start,
                start + Duration::minutes(30)
            )
        ])))
        .mount(&mock_server)
        .await;

    let body = json!({ "review": "patient recovering well" });
    let request = Request::builder()
        .method("POST")
        .uri(&format!("/{}/complete", appointment_id))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["appointment"]["status"], "completed");
}

#[tokio::test]
async fn completing_twice_conflicts() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let user = TestUser::with_id(doctor_id, "doctor");
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let app = create_test_app(&config).await;
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let start = Utc::now() - Duration::hours(2);
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &appointment_id,
                Some(&Uuid::new_v4()),
                &doctor_id,
                &Uuid::new_v4(),
                "completed",
                start,
                start + Duration::minutes(30)
            )
        ])))
        .mount(&mock_server)
        .await;

    let body = json!({ "review": null });
    let request = Request::builder()
        .method("POST")
        .uri(&format!("/{}/complete", appointment_id))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn patient_lists_only_their_own_appointments() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4();
    let user = TestUser::with_id(patient_id, "patient");
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    let app = create_test_app(&config).await;
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let start = Utc::now() + Duration::days(1);
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &Uuid::new_v4(),
                Some(&Uuid::new_v4()),
                &Uuid::new_v4(),
                &patient_id,
                "scheduled",
                start,
                start + Duration::minutes(30)
            )
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri(&format!("/patients/{}", patient_id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["appointments"].as_array().unwrap().len(), 1);

    // And not another patient's
    let app = create_test_app(&config).await;
    let request = Request::builder()
        .method("GET")
        .uri(&format!("/patients/{}", Uuid::new_v4()))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
