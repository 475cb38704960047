mod common;
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde_json::json;

use crate::common::{
    Action, Flow, FlowContext, id_of, promote_action, setup_server, setup_test_db, signin_action,
    signin_admin_action, signup_action,
};

fn training_path(suffix: &'static str) -> impl Fn(&FlowContext) -> String {
    move |ctx| format!("/api/v1/live-trainings/{}{}", id_of(ctx, "training"), suffix)
}

fn registration(name: &'static str, action: &'static str) -> Action {
    Action::new(name, "POST", "dynamic")
        .with_dyn_path(training_path("/registration"))
        .with_body(json!({ "action": action }))
}

fn schedule(title: &str, starts_in_days: i64, max_participants: i32) -> serde_json::Value {
    let start = Utc::now() + Duration::days(starts_in_days);
    json!({
        "title": title,
        "platform": "zoom",
        "meeting_url": "https://meet.example.com/room",
        "scheduled_start": start,
        "scheduled_end": start + Duration::hours(1),
        "max_participants": max_participants,
    })
}

#[tokio::test]
async fn route_live_training_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("alice@example.com", "secret").with_save_cookies(false))
        .step(signup_action("bruno@example.com", "secret").with_save_cookies(false))
        .step(signup_action("host@example.com", "secret").with_save_as("host"))
        .step(
            Action::new("create_as_student", "POST", "/api/v1/live-trainings")
                .with_body(schedule("Not allowed", 1, 10))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(signin_admin_action())
        .step(promote_action("host", "instructor"))
        .step(signin_action("host@example.com", "secret"))
        .step(
            Action::new("create_backwards", "POST", "/api/v1/live-trainings")
                .with_body({
                    let start = Utc::now() + Duration::days(1);
                    json!({
                        "title": "Backwards",
                        "platform": "zoom",
                        "meeting_url": "https://meet.example.com/room",
                        "scheduled_start": start,
                        "scheduled_end": start - Duration::hours(1),
                    })
                })
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_body(|body| assert!(body.contains("End time must be after start time"))),
        )
        .step(
            Action::new("create_later", "POST", "/api/v1/live-trainings")
                .with_body(schedule("Async Rust deep dive", 7, 50)),
        )
        .step(
            Action::new("create", "POST", "/api/v1/live-trainings")
                .with_body(schedule("Office hours", 2, 2))
                .assert_json(|body, _| assert_eq!(body["status"], "scheduled"))
                .with_save_as("training"),
        )
        .step(
            Action::new("list", "GET", "/api/v1/live-trainings")
                .with_param("upcoming", "true")
                .assert_json(|body, _| {
                    assert_eq!(body["pagination"]["total"], 2);
                    // soonest first
                    assert_eq!(body["trainings"][0]["title"], "Office hours");
                    assert_eq!(body["trainings"][0]["instructor_name"], "host");
                }),
        )
        .step(signin_action("alice@example.com", "secret"))
        .step(
            registration("register", "register").assert_json(|body, _| {
                assert_eq!(body["is_registered"], true);
                assert_eq!(body["registered_count"], 1);
            }),
        )
        .step(registration("register_twice", "register").with_expect(StatusCode::CONFLICT))
        .step(registration("register_unknown", "subscribe").with_expect(StatusCode::BAD_REQUEST))
        .step(
            Action::new("details", "GET", "dynamic")
                .with_dyn_path(training_path(""))
                .assert_json(|body, _| {
                    assert_eq!(body["is_registered"], true);
                    assert_eq!(body["registered_count"], 1);
                }),
        )
        .step(
            Action::new("update_as_attendee", "PATCH", "dynamic")
                .with_dyn_path(training_path(""))
                .with_body(json!({ "title": "Mine now" }))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(signin_action("bruno@example.com", "secret"))
        .step(registration("register_second", "register"))
        .step(signin_action("host@example.com", "secret"))
        .step(
            registration("register_full", "register")
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_body(|body| assert!(body.contains("Training is full"))),
        )
        .step(
            Action::new("update_invalid", "PATCH", "dynamic")
                .with_dyn_path(training_path(""))
                .with_body(json!({ "status": "postponed" }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("update", "PATCH", "dynamic")
                .with_dyn_path(training_path(""))
                .with_body(json!({ "title": "Extended office hours", "max_participants": 3 }))
                .assert_json(|body, _| {
                    assert_eq!(body["title"], "Extended office hours");
                    assert_eq!(body["max_participants"], 3);
                }),
        )
        .step(signin_action("alice@example.com", "secret"))
        .step(
            registration("unregister", "unregister").assert_json(|body, _| {
                assert_eq!(body["is_registered"], false);
                assert_eq!(body["registered_count"], 1);
            }),
        )
        .step(signin_action("host@example.com", "secret"))
        .step(
            Action::new("cancel", "DELETE", "dynamic")
                .with_dyn_path(training_path(""))
                .assert_json(|body, _| assert_eq!(body["status"], "cancelled")),
        )
        .step(
            Action::new("list_after_cancel", "GET", "/api/v1/live-trainings")
                .assert_json(|body, _| assert_eq!(body["pagination"]["total"], 1)),
        )
        // cancelled trainings stay readable
        .step(
            Action::new("details_cancelled", "GET", "dynamic")
                .with_dyn_path(training_path(""))
                .with_clear_cookies(true)
                .assert_json(|body, _| {
                    assert_eq!(body["status"], "cancelled");
                    assert_eq!(body["is_registered"], false);
                }),
        )
        .step(signin_action("alice@example.com", "secret"))
        .step(
            registration("register_cancelled", "register")
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_body(|body| assert!(body.contains("closed"))),
        )
        .run(&mut server, pool)
        .await;
}
