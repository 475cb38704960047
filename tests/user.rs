mod common;
use reqwest::StatusCode;
use academy::model::entity::UserEntity;
use academy::web::middlewares::AUTH_TOKEN;
use serde_json::json;
use tower_cookies::cookie::SameSite;

use crate::common::{
    Action, Flow, promote_action, setup_server, setup_test_db, signin_action, signin_admin_action,
    signup_action,
};

#[tokio::test]
async fn route_signup_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(
            signup_action("Foo.Bar@Example.com", "foobaz")
                .assert_cookie(AUTH_TOKEN, |cookie| {
                    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
                    assert_eq!(cookie.path(), Some("/"));
                    assert_eq!(cookie.http_only(), Some(true));
                })
                .assert_body(|body| {
                    let ent: UserEntity = serde_json::from_str(body).expect("Invalid body format");
                    assert_eq!(ent.email(), "foo.bar@example.com");
                    assert!(!body.contains("password"));
                })
                .with_expect(StatusCode::OK),
        )
        // same email, different case
        .step(signup_action("foo.bar@example.com", "foobaz").with_expect(StatusCode::CONFLICT))
        .step(signup_action("not-an-email", "foobaz").with_expect(StatusCode::BAD_REQUEST))
        .step(signup_action("empty@example.com", "").with_expect(StatusCode::BAD_REQUEST))
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_signin_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("signin@example.com", "SIGNINTEST").with_save_cookies(false))
        .step(
            signin_action("signin@example.com", "SIGNINTEST")
                .assert_cookie(AUTH_TOKEN, |cookie| {
                    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
                    assert_eq!(cookie.path(), Some("/"));
                    assert_eq!(cookie.http_only(), Some(true));
                })
                .assert_body(|body| {
                    let ent: UserEntity = serde_json::from_str(body).expect("Invalid JSON format");
                    assert_eq!(ent.email(), "signin@example.com");
                })
                .with_expect(StatusCode::OK)
                .with_clear_cookies(true),
        )
        .step(
            Action::new("me", "GET", "/api/v1/account/me")
                .assert_body(|body| assert!(body.contains("signin@example.com"))),
        )
        // wrong credentials
        .step(
            signin_action("signin@example.com", "WRONGPASSWORD")
                .with_save_cookies(false)
                .with_clear_cookies(true)
                .assert_body(|body| {
                    assert!(body.contains("Authentication error"));
                })
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        // non-existing account
        .step(
            signin_action("nobody@example.com", "nvm")
                .with_expect(StatusCode::UNAUTHORIZED)
                .assert_body(|body| assert!(body.contains("Authentication error"))),
        )
        .step(Action::new("me", "GET", "/api/v1/account/me").with_expect(StatusCode::UNAUTHORIZED))
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_signout_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("leaving@example.com", "secret"))
        .step(Action::new("me", "GET", "/api/v1/account/me"))
        .step(Action::new("signout", "POST", "/api/v1/account/signout"))
        .step(Action::new("me", "GET", "/api/v1/account/me").with_expect(StatusCode::UNAUTHORIZED))
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_user_list_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("student@example.com", "FOOBAZ").with_save_cookies(true))
        // try to request without admin perms
        .step(
            Action::new("user_list", "GET", "/api/v1/account/page")
                .assert_body(|body| {
                    assert!(body.contains("error"));
                })
                .with_param("limit", "5")
                .with_param("offset", "0")
                .with_expect(StatusCode::FORBIDDEN)
                .with_save_cookies(true),
        )
        // acquire admin account
        .step(signin_admin_action())
        .step(
            Action::new("user_list", "GET", "/api/v1/account/page")
                .with_param("limit", "5")
                .with_param("offset", "0")
                .assert_json(|body, _| {
                    assert_eq!(body["total"], 2);
                    assert_eq!(body["items"].as_array().map(Vec::len), Some(2));
                })
                .with_expect(StatusCode::OK),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_user_update_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        // create a pair of users and save their data to `first_user` and `second_user`
        .step(
            signup_action("first@example.com", "FOOBAZ")
                .with_save_cookies(false)
                .with_save_as("first_user"),
        )
        .step(
            signup_action("second@example.com", "FOOBAZ2")
                .with_save_cookies(true)
                .with_save_as("second_user"),
        )
        // try to update `first_user` without permissions
        .step(
            Action::new("user_update", "PUT", "dynamic")
                .with_dyn_path(|ctx| {
                    let user = ctx.get_json::<UserEntity>("first_user");
                    format!("/api/v1/account/{}", user.id())
                })
                .with_body(json!({
                    "email": "hijack@example.com",
                    "full_name": "should fail",
                }))
                .with_expect(StatusCode::FORBIDDEN)
                .assert_body(|body| {
                    assert!(body.contains("error"));
                }),
        )
        // try to update self, this one should work
        .step(
            Action::new("user_update", "PUT", "dynamic")
                .with_dyn_path(|ctx| {
                    let user = ctx.get_json::<UserEntity>("second_user");
                    format!("/api/v1/account/{}", user.id())
                })
                .with_expect(StatusCode::OK)
                .with_body(json!({
                    "email": "third@example.com",
                    "full_name": "Third",
                }))
                .assert_body(|body| {
                    assert!(body.contains("third@example.com"));
                }),
        )
        // login as admin to test admin perms
        .step(
            signin_admin_action()
                .with_save_cookies(true)
                .with_clear_cookies(true),
        )
        .step(
            Action::new("user_update", "PUT", "dynamic")
                .with_dyn_path(|ctx| {
                    let user = ctx.get_json::<UserEntity>("first_user");
                    format!("/api/v1/account/{}", user.id())
                })
                .with_body(json!({
                    "email": "fourth@example.com",
                    "full_name": "Fourth",
                }))
                .with_expect(StatusCode::OK)
                .assert_body(|body| {
                    assert!(body.contains("fourth@example.com"));
                }),
        )
        // an email that is already taken
        .step(
            Action::new("user_update", "PUT", "dynamic")
                .with_dyn_path(|ctx| {
                    let user = ctx.get_json::<UserEntity>("first_user");
                    format!("/api/v1/account/{}", user.id())
                })
                .with_body(json!({
                    "email": "third@example.com",
                    "full_name": "Fourth",
                }))
                .with_expect(StatusCode::CONFLICT)
                .assert_body(|body| {
                    assert!(body.contains("error"));
                }),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_user_role_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("mentor@example.com", "secret").with_save_as("mentor"))
        // students cannot promote themselves
        .step(promote_action("mentor", "instructor").with_expect(StatusCode::FORBIDDEN))
        .step(
            Action::new("course_create", "POST", "/api/v1/courses")
                .with_body(json!({ "title": "Not yet" }))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(signin_admin_action())
        .step(
            promote_action("mentor", "instructor")
                .assert_json(|body, _| assert_eq!(body["role"], "instructor")),
        )
        .step(signin_action("mentor@example.com", "secret"))
        .step(
            Action::new("course_create", "POST", "/api/v1/courses")
                .with_body(json!({ "title": "Now allowed" })),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_user_delete_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("one@example.com", "FOOBAZ").with_save_cookies(false).with_save_as("one"))
        .step(signup_action("two@example.com", "FOOBAR").with_save_cookies(true).with_save_as("two"))
        // we can't allow everybody to delete anybody
        .step(
            Action::new("user_delete", "DELETE", "dynamic")
                .with_dyn_path(|ctx| {
                    let one = ctx.get_json::<UserEntity>("one");
                    format!("/api/v1/account/{}", one.id())
                })
                .with_expect(StatusCode::FORBIDDEN)
                .assert_body(|body| {
                    assert!(body.contains("error"));
                })
        )
        // self deletion is allowed
        .step(
            Action::new("user_delete", "DELETE", "dynamic")
                .with_dyn_path(|ctx| {
                    let two = ctx.get_json::<UserEntity>("two");
                    format!("/api/v1/account/{}", two.id())
                })
                .with_expect(StatusCode::OK)
        )
        .step(signin_admin_action())
        // even admin cannot delete the user which doesn't exist
        .step(
            Action::new("user_delete", "DELETE", "dynamic")
                .with_dyn_path(|ctx| {
                    let two = ctx.get_json::<UserEntity>("two");
                    format!("/api/v1/account/{}", two.id())
                })
                .with_expect(StatusCode::NOT_FOUND)
        )
        .step(
            Action::new("user_delete", "DELETE", "dynamic")
                .with_dyn_path(|ctx| {
                    let one = ctx.get_json::<UserEntity>("one");
                    format!("/api/v1/account/{}", one.id())
                })
                .with_expect(StatusCode::OK)
        )
        .run(&mut server, pool)
        .await;
}
