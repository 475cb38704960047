mod common;
use reqwest::StatusCode;
use serde_json::json;

use crate::common::{Action, Flow, FlowContext, setup_server, setup_test_db, signin_action, signup_action};

fn invite_to(team_key: &'static str, team_name: &'static str) -> [Action; 2] {
    [
        Action::new("team_create", "POST", "/api/v1/teams")
            .with_body(json!({ "name": team_name }))
            .with_save_as(team_key),
        Action::new("invite", "POST", "dynamic")
            .with_dyn_path(move |ctx| {
                format!("/api/v1/teams/{}/invitations", common::id_of(ctx, team_key))
            })
            .with_body(json!({ "email": "reader@example.com" })),
    ]
}

fn notification_id(ctx: &FlowContext, index: usize) -> String {
    ctx.get("inbox")["notifications"][index]["id"]
        .as_str()
        .expect("notification id")
        .to_string()
}

#[tokio::test]
async fn route_notifications_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    let mut flow = Flow::new()
        .step(signup_action("reader@example.com", "secret").with_save_cookies(false))
        .step(signup_action("sender@example.com", "secret"));
    for (key, name) in [("first", "First team"), ("second", "Second team"), ("third", "Third team")] {
        for action in invite_to(key, name) {
            flow = flow.step(action);
        }
    }

    flow.step(signin_action("reader@example.com", "secret"))
        .step(
            Action::new("inbox", "GET", "/api/v1/notifications")
                .assert_json(|body, _| {
                    assert_eq!(body["total"], 3);
                    assert_eq!(body["unread_count"], 3);
                    // newest first
                    assert!(body["notifications"][0]["message"].as_str().unwrap_or("").contains("Third team"));
                    assert_eq!(body["notifications"][0]["kind"], "team_invitation");
                })
                .with_save_as("inbox"),
        )
        .step(
            Action::new("page", "GET", "/api/v1/notifications")
                .with_param("limit", "1")
                .with_param("offset", "1")
                .assert_json(|body, _| {
                    assert_eq!(body["total"], 3);
                    assert_eq!(body["notifications"].as_array().map(Vec::len), Some(1));
                }),
        )
        .step(
            Action::new("update_nothing", "PATCH", "/api/v1/notifications")
                .with_body(json!({}))
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_body(|body| assert!(body.contains("No updates specified"))),
        )
        .step(
            Action::new("update_no_flags", "PATCH", "/api/v1/notifications")
                .with_dyn_body(|ctx| json!({ "notification_ids": [notification_id(ctx, 0)] }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("mark_read", "PATCH", "/api/v1/notifications")
                .with_dyn_body(|ctx| json!({ "notification_ids": [notification_id(ctx, 0)], "mark_read": true }))
                .assert_json(|body, _| assert_eq!(body["affected"], 1)),
        )
        .step(
            Action::new("unread_only", "GET", "/api/v1/notifications")
                .with_param("unread_only", "true")
                .assert_json(|body, _| {
                    assert_eq!(body["total"], 2);
                    assert_eq!(body["unread_count"], 2);
                }),
        )
        .step(
            Action::new("mark_all_read", "PATCH", "/api/v1/notifications")
                .with_body(json!({ "mark_all_read": true }))
                .assert_json(|body, _| assert_eq!(body["affected"], 2)),
        )
        .step(
            Action::new("archive", "PATCH", "/api/v1/notifications")
                .with_dyn_body(|ctx| json!({ "notification_ids": [notification_id(ctx, 1)], "mark_archived": true }))
                .assert_json(|body, _| assert_eq!(body["affected"], 1)),
        )
        .step(
            Action::new("after_archive", "GET", "/api/v1/notifications").assert_json(|body, _| {
                assert_eq!(body["total"], 2);
                assert_eq!(body["unread_count"], 0);
            }),
        )
        .step(
            Action::new("delete_nothing", "DELETE", "/api/v1/notifications")
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("delete_archived", "DELETE", "/api/v1/notifications")
                .with_param("delete_all", "true")
                .assert_json(|body, _| assert_eq!(body["affected"], 1)),
        )
        .step(
            Action::new("delete_one", "DELETE", "/api/v1/notifications")
                .with_dyn_param("id", |ctx| notification_id(ctx, 2))
                .assert_json(|body, _| assert_eq!(body["affected"], 1)),
        )
        // other users cannot touch the reader's notifications
        .step(signin_action("sender@example.com", "secret"))
        .step(
            Action::new("delete_foreign", "DELETE", "/api/v1/notifications")
                .with_dyn_param("id", |ctx| notification_id(ctx, 0))
                .assert_json(|body, _| assert_eq!(body["affected"], 0)),
        )
        .step(signin_action("reader@example.com", "secret"))
        .step(
            Action::new("remaining", "GET", "/api/v1/notifications")
                .assert_json(|body, _| assert_eq!(body["total"], 1)),
        )
        .step(
            Action::new("anonymous", "GET", "/api/v1/notifications")
                .with_clear_cookies(true)
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        .run(&mut server, pool)
        .await;
}
