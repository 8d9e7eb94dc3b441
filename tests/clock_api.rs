#[macro_use]
mod common;

use actix_web::{http::StatusCode, test};
use chrono::{Duration, Utc};
use serde_json::{Value, json};

use common::{MemoryBackend, a_worker, post};

#[actix_web::test]
async fn clock_alternates_between_in_and_out() {
    let backend = MemoryBackend::new();
    let worker = backend.insert_worker(a_worker().with_pin("4321").build_new());
    let app = test_app!(backend);

    let req = post("/api/clock").set_json(json!({ "pin": "4321" })).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["action"], "clock_in");
    assert_eq!(body["message"], "Welcome, Ada!");
    assert!(body["registration"]["clock_out"].is_null());
    assert!(body["worker"].get("pin").is_none());

    let req = post("/api/clock").set_json(json!({ "pin": "4321" })).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["action"], "clock_out");
    assert_eq!(body["message"], "Goodbye, Ada!");
    assert!(body["registration"]["clock_out"].is_string());

    let req = post("/api/clock").set_json(json!({ "pin": "4321" })).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["action"], "clock_in");

    let registrations = backend.registrations_of(worker.id);
    assert_eq!(registrations.len(), 2);
    assert_eq!(registrations.iter().filter(|r| r.is_open()).count(), 1);
}

#[actix_web::test]
async fn clock_out_closes_the_existing_registration() {
    let backend = MemoryBackend::new();
    let worker = backend.insert_worker(a_worker().build_new());
    let opened = backend.insert_registration(worker.id, Utc::now() - Duration::hours(8), None);
    let app = test_app!(backend);

    let req = post("/api/clock").set_json(json!({ "pin": "1234" })).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["action"], "clock_out");
    assert_eq!(body["registration"]["id"], opened.id);
}

#[actix_web::test]
async fn unknown_pin_is_404() {
    let backend = MemoryBackend::new();
    backend.insert_worker(a_worker().with_pin("1234").build_new());
    let app = test_app!(backend);

    let req = post("/api/clock").set_json(json!({ "pin": "0000" })).to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "error": "Invalid PIN" }));
}

#[actix_web::test]
async fn malformed_pin_is_400() {
    let backend = MemoryBackend::new();
    let app = test_app!(backend);

    for pin in ["", "123", "12345", "abcd"] {
        let req = post("/api/clock").set_json(json!({ "pin": pin })).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "pin {pin:?}");
    }
}

#[actix_web::test]
async fn inactive_worker_cannot_clock() {
    let backend = MemoryBackend::new();
    let worker = backend.insert_worker(a_worker().with_pin("5555").with_is_active(false).build_new());
    let app = test_app!(backend);

    let req = post("/api/clock").set_json(json!({ "pin": "5555" })).to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "error": "Worker is inactive" }));
    assert!(backend.registrations_of(worker.id).is_empty());
}
