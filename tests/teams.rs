mod common;
use reqwest::StatusCode;
use serde_json::json;
use uuid::Uuid;

use crate::common::{
    Action, Flow, FlowContext, id_of, setup_server, setup_test_db, signin_action, signup_action,
};

fn team_path(suffix: &'static str) -> impl Fn(&FlowContext) -> String {
    move |ctx| format!("/api/v1/teams/{}{}", id_of(ctx, "team"), suffix)
}

/// Invitation token taken from the link in the invitee's notification.
fn invitation_token(ctx: &FlowContext) -> String {
    let link = ctx.get("inbox")["notifications"][0]["action_url"]
        .as_str()
        .expect("invitation link");
    link.split("token=").nth(1).expect("token").to_string()
}

fn owner_member_id(ctx: &FlowContext) -> String {
    ctx.get("team_details")["members"]
        .as_array()
        .expect("members")
        .iter()
        .find(|m| m["role"] == "owner")
        .and_then(|m| m["id"].as_str())
        .expect("owner")
        .to_string()
}

fn join_action(name: &'static str) -> Action {
    Action::new(name, "POST", "/api/v1/teams/join").with_dyn_body(|ctx| json!({ "token": invitation_token(ctx) }))
}

#[tokio::test]
async fn route_team_membership_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("bob@example.com", "secret").with_save_cookies(false).with_save_as("bob"))
        .step(signup_action("carol@example.com", "secret").with_save_cookies(false))
        .step(signup_action("dave@example.com", "secret").with_save_cookies(false))
        .step(signup_action("owner@example.com", "secret"))
        .step(
            Action::new("team_unnamed", "POST", "/api/v1/teams")
                .with_body(json!({ "name": "  " }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("team_create", "POST", "/api/v1/teams")
                .with_body(json!({ "name": "Crab Club", "max_members": 3 }))
                .assert_json(|body, _| {
                    assert_eq!(body["slug"], "crab-club");
                    assert_eq!(body["max_members"], 3);
                })
                .with_save_as("team"),
        )
        .step(
            Action::new("member_add", "POST", "dynamic")
                .with_dyn_path(team_path("/members"))
                .with_dyn_body(|ctx| json!({ "user_id": id_of(ctx, "bob") }))
                .assert_json(|body, _| assert_eq!(body["role"], "member")),
        )
        .step(
            Action::new("member_add_twice", "POST", "dynamic")
                .with_dyn_path(team_path("/members"))
                .with_dyn_body(|ctx| json!({ "user_id": id_of(ctx, "bob") }))
                .with_expect(StatusCode::CONFLICT),
        )
        .step(
            Action::new("member_add_unknown", "POST", "dynamic")
                .with_dyn_path(team_path("/members"))
                .with_body(json!({ "user_id": Uuid::new_v4() }))
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(
            Action::new("invite_no_email", "POST", "dynamic")
                .with_dyn_path(team_path("/invitations"))
                .with_body(json!({ "role": "member" }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("invite_member", "POST", "dynamic")
                .with_dyn_path(team_path("/invitations"))
                .with_body(json!({ "email": "bob@example.com" }))
                .with_expect(StatusCode::CONFLICT),
        )
        .step(
            Action::new("invite", "POST", "dynamic")
                .with_dyn_path(team_path("/invitations"))
                .with_body(json!({ "email": " Carol@Example.com " }))
                .assert_json(|body, _| {
                    assert_eq!(body["email"], "carol@example.com");
                    assert_eq!(body["status"], "pending");
                    assert!(body.get("token").is_none());
                }),
        )
        .step(
            Action::new("invite_twice", "POST", "dynamic")
                .with_dyn_path(team_path("/invitations"))
                .with_body(json!({ "email": "carol@example.com" }))
                .with_expect(StatusCode::CONFLICT),
        )
        // two members and one pending invitation fill three seats
        .step(
            Action::new("invite_full", "POST", "dynamic")
                .with_dyn_path(team_path("/invitations"))
                .with_body(json!({ "email": "dave@example.com" }))
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_body(|body| assert!(body.contains("member limit"))),
        )
        .step(
            Action::new("invitations", "GET", "dynamic")
                .with_dyn_path(team_path("/invitations"))
                .assert_json(|body, _| assert_eq!(body.as_array().map(Vec::len), Some(1))),
        )
        .step(
            Action::new("team_get", "GET", "dynamic")
                .with_dyn_path(team_path(""))
                .assert_json(|body, _| {
                    assert_eq!(body["user_role"], "owner");
                    assert_eq!(body["members"].as_array().map(Vec::len), Some(2));
                })
                .with_save_as("team_details"),
        )
        .step(
            Action::new("role_self", "PATCH", "dynamic")
                .with_dyn_path(team_path("/members"))
                .with_dyn_body(|ctx| json!({ "member_id": owner_member_id(ctx), "role": "member" }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("role_owner", "PATCH", "dynamic")
                .with_dyn_path(team_path("/members"))
                .with_dyn_body(|ctx| {
                    let bob = ctx.get("team_details")["members"]
                        .as_array()
                        .expect("members")
                        .iter()
                        .find(|m| m["email"] == "bob@example.com")
                        .map(|m| m["id"].clone())
                        .expect("bob");
                    json!({ "member_id": bob, "role": "owner" })
                })
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("role_admin", "PATCH", "dynamic")
                .with_dyn_path(team_path("/members"))
                .with_dyn_body(|ctx| {
                    let bob = ctx.get("team_details")["members"]
                        .as_array()
                        .expect("members")
                        .iter()
                        .find(|m| m["email"] == "bob@example.com")
                        .map(|m| m["id"].clone())
                        .expect("bob");
                    json!({ "member_id": bob, "role": "admin" })
                })
                .assert_json(|body, _| assert_eq!(body["role"], "admin")),
        )
        .step(
            Action::new("remove_owner", "DELETE", "dynamic")
                .with_dyn_path(team_path("/members"))
                .with_dyn_param("member_id", owner_member_id)
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(signin_action("carol@example.com", "secret"))
        .step(Action::new("inbox", "GET", "/api/v1/notifications").with_save_as("inbox"))
        .step(
            Action::new("team_get_outsider", "GET", "dynamic")
                .with_dyn_path(team_path(""))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(
            Action::new("join_preview", "GET", "/api/v1/teams/join")
                .with_dyn_param("token", invitation_token)
                .assert_json(|body, _| {
                    assert_eq!(body["team_name"], "Crab Club");
                    assert_eq!(body["email_match"], true);
                    assert_eq!(body["role"], "member");
                }),
        )
        .step(
            Action::new("join_preview_anonymous", "GET", "/api/v1/teams/join")
                .with_clear_cookies(true)
                .with_dyn_param("token", invitation_token)
                .assert_json(|body, _| assert!(body["email_match"].is_null())),
        )
        .step(
            Action::new("join_preview_unknown", "GET", "/api/v1/teams/join")
                .with_param("token", "not-a-token")
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(signin_action("dave@example.com", "secret"))
        .step(join_action("join_wrong_email").with_expect(StatusCode::FORBIDDEN))
        .step(signin_action("carol@example.com", "secret"))
        .step(
            join_action("join")
                .assert_json(|body, ctx| {
                    assert_eq!(body["already_member"], false);
                    assert_eq!(body["team_id"], ctx.get("team")["id"]);
                    assert_eq!(body["member"]["role"], "member");
                })
                .with_save_as("joined"),
        )
        .step(
            join_action("join_again")
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_body(|body| assert!(body.contains("no longer valid"))),
        )
        .step(
            Action::new("team_list", "GET", "/api/v1/teams")
                .assert_json(|body, _| assert_eq!(body[0]["name"], "Crab Club")),
        )
        // team admins manage members but do not own the team
        .step(signin_action("bob@example.com", "secret"))
        .step(
            Action::new("remove_member", "DELETE", "dynamic")
                .with_dyn_path(team_path("/members"))
                .with_dyn_param("member_id", |ctx| {
                    ctx.get("joined")["member"]["id"].as_str().expect("member id").to_string()
                }),
        )
        .step(
            Action::new("delete_as_admin", "DELETE", "dynamic")
                .with_dyn_path(team_path(""))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(signin_action("owner@example.com", "secret"))
        .step(
            Action::new("members", "GET", "dynamic")
                .with_dyn_path(team_path("/members"))
                .assert_json(|body, _| assert_eq!(body.as_array().map(Vec::len), Some(2))),
        )
        .step(Action::new("team_delete", "DELETE", "dynamic").with_dyn_path(team_path("")))
        .step(
            Action::new("team_gone", "GET", "dynamic")
                .with_dyn_path(team_path(""))
                .with_expect(StatusCode::NOT_FOUND),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_team_invitation_revoke_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("lead@example.com", "secret"))
        .step(
            Action::new("team_create", "POST", "/api/v1/teams")
                .with_body(json!({ "name": "Reviewers" }))
                .with_save_as("team"),
        )
        .step(
            Action::new("invite", "POST", "dynamic")
                .with_dyn_path(team_path("/invitations"))
                .with_body(json!({ "email": "later@example.com", "role": "admin" }))
                .assert_json(|body, _| assert_eq!(body["role"], "admin"))
                .with_save_as("invitation"),
        )
        .step(
            Action::new("revoke_no_id", "DELETE", "dynamic")
                .with_dyn_path(team_path("/invitations"))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("revoke", "DELETE", "dynamic")
                .with_dyn_path(team_path("/invitations"))
                .with_dyn_param("invitation_id", |ctx| id_of(ctx, "invitation")),
        )
        .step(
            Action::new("revoke_again", "DELETE", "dynamic")
                .with_dyn_path(team_path("/invitations"))
                .with_dyn_param("invitation_id", |ctx| id_of(ctx, "invitation"))
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(
            Action::new("invitations", "GET", "dynamic")
                .with_dyn_path(team_path("/invitations"))
                .assert_json(|body, _| assert_eq!(body.as_array().map(Vec::len), Some(0))),
        )
        .run(&mut server, pool)
        .await;
}
