mod common;
use reqwest::StatusCode;
use serde_json::json;

use crate::common::{
    Action, Flow, FlowContext, create_course_action, enroll_action, id_of, setup_server,
    setup_test_db, signin_action, signin_admin_action, signup_action,
};

fn thread_path(ctx: &FlowContext) -> String {
    format!("/api/v1/discussions/{}", id_of(ctx, "thread"))
}

fn reply_path(reply_key: &'static str) -> impl Fn(&FlowContext) -> String {
    move |ctx| format!("{}/replies/{}", thread_path(ctx), id_of(ctx, reply_key))
}

#[tokio::test]
async fn route_discussion_thread_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signin_admin_action())
        .step(create_course_action("course", "Community course", 0))
        .step(signup_action("asker@example.com", "secret"))
        .step(enroll_action("course"))
        .step(
            Action::new("thread_blank", "POST", "/api/v1/discussions")
                .with_dyn_body(|ctx| json!({ "course_id": id_of(ctx, "course"), "title": "", "content": "?" }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("thread_create", "POST", "/api/v1/discussions")
                .with_dyn_body(|ctx| {
                    json!({
                        "course_id": id_of(ctx, "course"),
                        "title": "Why does this not compile?",
                        "content": "cannot borrow as mutable",
                    })
                })
                .with_save_as("thread"),
        )
        .step(
            Action::new("thread_pin_by_author", "PATCH", "dynamic")
                .with_dyn_path(thread_path)
                .with_body(json!({ "is_pinned": true }))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(
            Action::new("thread_empty_update", "PATCH", "dynamic")
                .with_dyn_path(thread_path)
                .with_body(json!({}))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(signup_action("helper@example.com", "secret"))
        .step(
            Action::new("reply_unenrolled", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("{}/replies", thread_path(ctx)))
                .with_body(json!({ "content": "me too" }))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(enroll_action("course"))
        .step(
            Action::new("reply_create", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("{}/replies", thread_path(ctx)))
                .with_body(json!({ "content": "Use a scoped block" }))
                .assert_json(|body, _| assert_eq!(body["is_instructor_reply"], false))
                .with_save_as("reply"),
        )
        .step(
            Action::new("thread_edit_foreign", "PATCH", "dynamic")
                .with_dyn_path(thread_path)
                .with_body(json!({ "title": "Hijacked" }))
                .with_expect(StatusCode::FORBIDDEN),
        )
        // only the thread author or staff may accept an answer
        .step(
            Action::new("solution_by_helper", "PATCH", "dynamic")
                .with_dyn_path(reply_path("reply"))
                .with_body(json!({ "is_solution": true }))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(signin_action("asker@example.com", "secret"))
        .step(
            Action::new("reply_edit_foreign", "PATCH", "dynamic")
                .with_dyn_path(reply_path("reply"))
                .with_body(json!({ "content": "rewritten" }))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(
            Action::new("solution_accept", "PATCH", "dynamic")
                .with_dyn_path(reply_path("reply"))
                .with_body(json!({ "is_solution": true }))
                .assert_json(|body, _| assert_eq!(body["is_solution"], true)),
        )
        .step(
            Action::new("reply_delete_foreign", "DELETE", "dynamic")
                .with_dyn_path(reply_path("reply"))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(signin_admin_action())
        .step(
            Action::new("thread_pin", "PATCH", "dynamic")
                .with_dyn_path(thread_path)
                .with_body(json!({ "is_pinned": true }))
                .assert_json(|body, _| assert_eq!(body["is_pinned"], true)),
        )
        .step(
            Action::new("reply_staff", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("{}/replies", thread_path(ctx)))
                .with_body(json!({ "content": "Good answer above" }))
                .assert_json(|body, _| assert_eq!(body["is_instructor_reply"], true)),
        )
        .step(
            Action::new("thread_get", "GET", "dynamic")
                .with_dyn_path(thread_path)
                .assert_json(|body, ctx| {
                    assert_eq!(body["discussion"]["is_resolved"], true);
                    assert_eq!(body["discussion"]["reply_count"], 2);
                    assert_eq!(body["discussion"]["view_count"], 1);
                    // accepted answers come first
                    assert_eq!(body["replies"][0]["id"], ctx.get("reply")["id"]);
                    assert_eq!(body["replies"][0]["author_name"], "helper");
                }),
        )
        .step(
            Action::new("thread_list", "GET", "/api/v1/discussions")
                .with_dyn_param("course_id", |ctx| id_of(ctx, "course"))
                .assert_json(|body, _| {
                    assert_eq!(body["pagination"]["total"], 1);
                    assert_eq!(body["discussions"][0]["is_pinned"], true);
                }),
        )
        .step(
            Action::new("thread_list_no_course", "GET", "/api/v1/discussions")
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(signin_action("helper@example.com", "secret"))
        .step(Action::new("reply_delete_own", "DELETE", "dynamic").with_dyn_path(reply_path("reply")))
        .step(
            Action::new("thread_delete_foreign", "DELETE", "dynamic")
                .with_dyn_path(thread_path)
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(signin_action("asker@example.com", "secret"))
        .step(Action::new("thread_delete", "DELETE", "dynamic").with_dyn_path(thread_path))
        .step(
            Action::new("thread_gone", "GET", "dynamic")
                .with_dyn_path(thread_path)
                .with_expect(StatusCode::NOT_FOUND),
        )
        .run(&mut server, pool)
        .await;
}
