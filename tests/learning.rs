mod common;
use reqwest::StatusCode;
use serde_json::json;

use crate::common::{
    Action, Flow, create_course_action, create_lesson_action, create_module_action, enroll_action,
    id_of, setup_server, setup_test_db, signin_action, signin_admin_action, signup_action,
};

fn lesson_path(key: &'static str, suffix: &'static str) -> impl Fn(&common::FlowContext) -> String {
    move |ctx| format!("/api/v1/lessons/{}{}", id_of(ctx, key), suffix)
}

/// Free course with one preview lesson and one regular lesson, plus a paid course.
fn catalog_setup(flow: Flow) -> Flow {
    flow.step(signin_admin_action())
        .step(create_course_action("course", "Rust Basics", 0))
        .step(create_course_action("paid", "Rust Advanced", 4900))
        .step(create_module_action("module", "course", "Getting started"))
        .step(create_lesson_action("lesson1", "course", "module", "Hello", true))
        .step(create_lesson_action("lesson2", "course", "module", "Ownership", false))
}

#[tokio::test]
async fn route_catalog_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    catalog_setup(Flow::new())
        .step(
            Action::new("draft", "POST", "/api/v1/courses")
                .with_body(json!({ "title": "Hidden", "status": "draft" }))
                .with_save_as("draft"),
        )
        .step(
            Action::new("catalog", "GET", "/api/v1/courses")
                .with_clear_cookies(true)
                .assert_json(|body, _| {
                    assert_eq!(body["total"], 2);
                    let titles: Vec<&str> = body["items"]
                        .as_array()
                        .expect("items")
                        .iter()
                        .filter_map(|c| c["title"].as_str())
                        .collect();
                    assert!(!titles.contains(&"Hidden"));
                }),
        )
        .step(
            Action::new("catalog_search", "GET", "/api/v1/courses")
                .with_param("search", "advanced")
                .assert_json(|body, _| {
                    assert_eq!(body["total"], 1);
                    assert_eq!(body["items"][0]["title"], "Rust Advanced");
                }),
        )
        .step(
            Action::new("details", "GET", "dynamic")
                .with_dyn_path(|ctx| {
                    let slug = ctx.get("course")["slug"].as_str().expect("slug").to_string();
                    format!("/api/v1/courses/{slug}")
                })
                .assert_json(|body, ctx| {
                    assert_eq!(body["course"]["id"], ctx.get("course")["id"]);
                    let lessons = body["modules"][0]["lessons"].as_array().expect("lessons");
                    assert_eq!(lessons.len(), 2);
                    assert!(body["enrollment"].is_null());
                }),
        )
        // drafts stay hidden from anonymous visitors
        .step(
            Action::new("draft_details", "GET", "dynamic")
                .with_dyn_path(|ctx| {
                    let slug = ctx.get("draft")["slug"].as_str().expect("slug").to_string();
                    format!("/api/v1/courses/{slug}")
                })
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(
            Action::new("invalid_course", "POST", "/api/v1/courses")
                .with_body(json!({ "title": "" }))
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        .step(signin_admin_action())
        .step(
            Action::new("invalid_course", "POST", "/api/v1/courses")
                .with_body(json!({ "title": "Bad level", "level": "expert" }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_lesson_access_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    catalog_setup(Flow::new())
        // previews are public
        .step(
            Action::new("preview", "GET", "dynamic")
                .with_clear_cookies(true)
                .with_dyn_path(lesson_path("lesson1", ""))
                .assert_json(|body, _| assert!(body.to_string().contains("Hello"))),
        )
        .step(
            Action::new("locked", "GET", "dynamic")
                .with_dyn_path(lesson_path("lesson2", ""))
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        .step(signup_action("student@example.com", "secret"))
        .step(
            Action::new("locked", "GET", "dynamic")
                .with_dyn_path(lesson_path("lesson2", ""))
                .with_expect(StatusCode::FORBIDDEN)
                .assert_body(|body| assert!(body.contains("Not enrolled in this course"))),
        )
        .step(
            Action::new("status", "GET", "/api/v1/enrollments")
                .with_dyn_param("course_id", |ctx| id_of(ctx, "course"))
                .assert_json(|body, _| assert_eq!(body["is_enrolled"], false)),
        )
        .step(enroll_action("course").with_save_as("enrollment"))
        .step(
            enroll_action("course")
                .with_expect(StatusCode::CONFLICT)
                .assert_json(|body, ctx| {
                    assert_eq!(body["enrollment_id"], ctx.get("enrollment")["id"]);
                }),
        )
        .step(
            enroll_action("paid")
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_body(|body| assert!(body.contains("requires payment"))),
        )
        .step(
            Action::new("status", "GET", "/api/v1/enrollments")
                .with_dyn_param("course_id", |ctx| id_of(ctx, "course"))
                .assert_json(|body, _| assert_eq!(body["is_enrolled"], true)),
        )
        .step(Action::new("unlocked", "GET", "dynamic").with_dyn_path(lesson_path("lesson2", "")))
        .step(
            Action::new("mine", "GET", "/api/v1/enrollments/mine")
                .assert_json(|body, _| assert_eq!(body.as_array().map(Vec::len), Some(1))),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_bookmarks_and_notes_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    catalog_setup(Flow::new())
        .step(signup_action("reader@example.com", "secret"))
        // enrollment is required to bookmark
        .step(
            Action::new("bookmark", "POST", "/api/v1/bookmarks")
                .with_dyn_body(|ctx| json!({ "lesson_id": id_of(ctx, "lesson2") }))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(enroll_action("course"))
        .step(
            Action::new("bookmark", "POST", "/api/v1/bookmarks")
                .with_dyn_body(|ctx| json!({ "lesson_id": id_of(ctx, "lesson2") })),
        )
        .step(
            Action::new("bookmark_again", "POST", "/api/v1/bookmarks")
                .with_dyn_body(|ctx| json!({ "lesson_id": id_of(ctx, "lesson2") }))
                .with_expect(StatusCode::CONFLICT),
        )
        .step(
            Action::new("bookmarks", "GET", "/api/v1/bookmarks")
                .assert_json(|body, _| assert_eq!(body.as_array().map(Vec::len), Some(1))),
        )
        .step(Action::new("unbookmark", "DELETE", "dynamic").with_dyn_path(|ctx| {
            format!("/api/v1/bookmarks/{}", id_of(ctx, "lesson2"))
        }))
        .step(
            Action::new("unbookmark_again", "DELETE", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/bookmarks/{}", id_of(ctx, "lesson2")))
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(
            Action::new("notes_empty", "GET", "dynamic")
                .with_dyn_path(lesson_path("lesson1", "/notes"))
                .assert_json(|body, _| assert!(body["notes"].is_null())),
        )
        .step(
            Action::new("notes_put", "PUT", "dynamic")
                .with_dyn_path(lesson_path("lesson1", "/notes"))
                .with_body(json!({ "notes": "borrow checker is a friend" })),
        )
        .step(
            Action::new("notes_get", "GET", "dynamic")
                .with_dyn_path(lesson_path("lesson1", "/notes"))
                .assert_json(|body, _| assert_eq!(body["notes"], "borrow checker is a friend")),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_course_completion_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    catalog_setup(Flow::new())
        .step(signup_action("finisher@example.com", "secret"))
        .step(enroll_action("course").with_save_as("enrollment"))
        .step(
            Action::new("watch", "POST", "/api/v1/progress")
                .with_dyn_body(|ctx| json!({ "lesson_id": id_of(ctx, "lesson1"), "watch_time_seconds": 90 }))
                .assert_json(|body, _| {
                    assert_eq!(body["watch_time_seconds"], 90);
                    assert_eq!(body["is_completed"], false);
                }),
        )
        .step(
            Action::new("complete_first", "POST", "dynamic")
                .with_dyn_path(lesson_path("lesson1", "/complete"))
                .assert_json(|body, _| {
                    assert_eq!(body["already_completed"], false);
                    assert_eq!(body["progress"]["completed_lessons"], 1);
                    assert_eq!(body["progress"]["total_lessons"], 2);
                    assert_eq!(body["progress"]["percentage"], 50);
                    assert_eq!(body["course_completed"], false);
                    assert!(body["certificate"].is_null());
                }),
        )
        .step(
            Action::new("issue_early", "POST", "/api/v1/certificates")
                .with_dyn_body(|ctx| json!({ "course_id": id_of(ctx, "course") }))
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_body(|body| assert!(body.contains("Course not completed yet"))),
        )
        .step(
            Action::new("complete_last", "POST", "/api/v1/progress")
                .with_dyn_body(|ctx| json!({ "lesson_id": id_of(ctx, "lesson2"), "completed": true }))
                .assert_json(|body, _| {
                    assert_eq!(body["progress"]["percentage"], 100);
                    assert_eq!(body["course_completed"], true);
                    let number = body["certificate"]["certificate_number"].as_str().expect("number");
                    assert!(number.starts_with("PHZR-"));
                })
                .with_save_as("completion"),
        )
        .step(
            Action::new("complete_again", "POST", "dynamic")
                .with_dyn_path(lesson_path("lesson2", "/complete"))
                .assert_json(|body, _| {
                    assert_eq!(body["already_completed"], true);
                    assert_eq!(body["progress"]["percentage"], 100);
                }),
        )
        .step(
            Action::new("course_progress", "GET", "/api/v1/progress")
                .with_dyn_param("course_id", |ctx| id_of(ctx, "course"))
                .assert_json(|body, _| {
                    assert_eq!(body["progress"]["completed_lessons"], 2);
                    assert_eq!(body["completed_lesson_ids"].as_array().map(Vec::len), Some(2));
                    assert_eq!(body["enrollment"]["status"], "completed");
                }),
        )
        .step(
            Action::new("overview", "GET", "/api/v1/progress").assert_json(|body, _| {
                assert_eq!(body["total_courses"], 1);
                assert_eq!(body["completed_courses"], 1);
                assert_eq!(body["average_progress"], 100);
            }),
        )
        .step(
            Action::new("issue", "POST", "/api/v1/certificates")
                .with_dyn_body(|ctx| json!({ "enrollment_id": id_of(ctx, "enrollment") }))
                .assert_json(|body, ctx| {
                    assert_eq!(body["message"], "Certificate already exists");
                    assert_eq!(
                        body["certificate"]["certificate_number"],
                        ctx.get("completion")["certificate"]["certificate_number"]
                    );
                }),
        )
        .step(
            Action::new("certificates", "GET", "/api/v1/certificates")
                .assert_json(|body, _| assert_eq!(body.as_array().map(Vec::len), Some(1))),
        )
        .step(
            Action::new("notifications", "GET", "/api/v1/notifications").assert_json(|body, _| {
                assert!(body["unread_count"].as_i64().unwrap_or(0) >= 1);
                let kinds: Vec<&str> = body["notifications"]
                    .as_array()
                    .expect("notifications")
                    .iter()
                    .filter_map(|n| n["kind"].as_str())
                    .collect();
                assert!(kinds.contains(&"course_completed"));
            }),
        )
        // verification is public
        .step(
            Action::new("verify", "GET", "dynamic")
                .with_clear_cookies(true)
                .with_dyn_path(|ctx| {
                    let number = ctx.get("completion")["certificate"]["certificate_number"]
                        .as_str()
                        .expect("number")
                        .to_string();
                    format!("/api/v1/certificates/verify/{number}")
                })
                .assert_json(|body, _| {
                    assert_eq!(body["valid"], true);
                    assert_eq!(body["certificate"]["course_title"], "Rust Basics");
                    assert_eq!(body["certificate"]["student_name"], "finisher");
                }),
        )
        .step(
            Action::new("verify_unknown", "GET", "/api/v1/certificates/verify/PHZR-0-000000")
                .with_expect(StatusCode::NOT_FOUND)
                .assert_json(|body, _| assert_eq!(body["valid"], false)),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_foreign_certificate_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    catalog_setup(Flow::new())
        .step(signup_action("owner@example.com", "secret"))
        .step(enroll_action("course").with_save_as("enrollment"))
        .step(signup_action("other@example.com", "secret").with_clear_cookies(true))
        // somebody else's enrollment is invisible
        .step(
            Action::new("issue_foreign", "POST", "/api/v1/certificates")
                .with_dyn_body(|ctx| json!({ "enrollment_id": id_of(ctx, "enrollment") }))
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(
            Action::new("issue_empty", "POST", "/api/v1/certificates")
                .with_body(json!({}))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(signin_action("owner@example.com", "secret"))
        .step(
            Action::new("progress_unenrolled", "GET", "/api/v1/progress")
                .with_dyn_param("course_id", |ctx| id_of(ctx, "paid"))
                .with_expect(StatusCode::NOT_FOUND),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_lesson_reorder_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    let reorder_path = |ctx: &common::FlowContext| {
        format!(
            "/api/v1/courses/{}/modules/{}/lessons/reorder",
            id_of(ctx, "course"),
            id_of(ctx, "module")
        )
    };

    catalog_setup(Flow::new())
        .step(create_lesson_action("lesson3", "course", "module", "Borrowing", false))
        .step(create_module_action("paid_module", "paid", "Elsewhere"))
        .step(create_lesson_action("foreign", "paid", "paid_module", "Lifetimes", false))
        .step(
            Action::new("reorder", "PUT", "dynamic")
                .with_dyn_path(reorder_path)
                .with_dyn_body(|ctx| json!({ "lesson_ids": [id_of(ctx, "lesson3"), id_of(ctx, "lesson1")] }))
                .assert_json(|body, ctx| {
                    let ids: Vec<&str> = body
                        .as_array()
                        .expect("lessons")
                        .iter()
                        .filter_map(|l| l["id"].as_str())
                        .collect();
                    // unlisted lessons follow the listed ones
                    assert_eq!(ids, [id_of(ctx, "lesson3"), id_of(ctx, "lesson1"), id_of(ctx, "lesson2")]);
                    assert_eq!(body[2]["order_index"], 2);
                }),
        )
        .step(
            Action::new("details", "GET", "dynamic")
                .with_dyn_path(|ctx| {
                    let slug = ctx.get("course")["slug"].as_str().expect("slug").to_string();
                    format!("/api/v1/courses/{slug}")
                })
                .assert_json(|body, ctx| {
                    let lessons = body["modules"][0]["lessons"].as_array().expect("lessons");
                    assert_eq!(lessons[0]["id"], id_of(ctx, "lesson3"));
                    assert_eq!(lessons[1]["id"], id_of(ctx, "lesson1"));
                }),
        )
        .step(
            Action::new("reorder_repeated", "PUT", "dynamic")
                .with_dyn_path(reorder_path)
                .with_dyn_body(|ctx| json!({ "lesson_ids": [id_of(ctx, "lesson1"), id_of(ctx, "lesson1")] }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("reorder_empty", "PUT", "dynamic")
                .with_dyn_path(reorder_path)
                .with_body(json!({ "lesson_ids": [] }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("reorder_foreign", "PUT", "dynamic")
                .with_dyn_path(reorder_path)
                .with_dyn_body(|ctx| json!({ "lesson_ids": [id_of(ctx, "foreign"), id_of(ctx, "lesson1")] }))
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_body(|body| assert!(body.contains("belong to this module"))),
        )
        .step(signup_action("shuffler@example.com", "secret"))
        .step(
            Action::new("reorder_as_student", "PUT", "dynamic")
                .with_dyn_path(reorder_path)
                .with_dyn_body(|ctx| json!({ "lesson_ids": [id_of(ctx, "lesson2")] }))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_student_dashboard_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    catalog_setup(Flow::new())
        .step(signup_action("dashing@example.com", "secret"))
        .step(
            Action::new("dashboard_empty", "GET", "/api/v1/progress/dashboard").assert_json(|body, _| {
                assert_eq!(body["courses"].as_array().map(Vec::len), Some(0));
                assert_eq!(body["stats"]["total_courses_enrolled"], 0);
                assert_eq!(body["stats"]["current_streak"], 0);
                assert_eq!(body["stats"]["learning_by_day"].as_array().map(Vec::len), Some(7));
            }),
        )
        .step(enroll_action("course"))
        .step(
            Action::new("watch", "POST", "/api/v1/progress")
                .with_dyn_body(|ctx| json!({ "lesson_id": id_of(ctx, "lesson1"), "watch_time_seconds": 1800 })),
        )
        .step(
            Action::new("complete", "POST", "dynamic").with_dyn_path(lesson_path("lesson1", "/complete")),
        )
        .step(
            Action::new("dashboard", "GET", "/api/v1/progress/dashboard").assert_json(|body, ctx| {
                let course = &body["courses"][0];
                assert_eq!(course["course_id"], id_of(ctx, "course"));
                assert_eq!(course["completed_lessons"], 1);
                assert_eq!(course["total_lessons"], 2);
                assert_eq!(course["progress_percentage"], 50);

                let stats = &body["stats"];
                assert_eq!(stats["total_courses_enrolled"], 1);
                assert_eq!(stats["courses_completed"], 0);
                assert_eq!(stats["certificates_earned"], 0);
                assert_eq!(stats["total_hours_learned"], 0.5);
                assert_eq!(stats["current_streak"], 1);
                assert_eq!(stats["average_quiz_score"], 0);
                assert_eq!(stats["category_distribution"].as_array().map(Vec::len), Some(1));
            }),
        )
        .step(
            Action::new("dashboard_anonymous", "GET", "/api/v1/progress/dashboard")
                .with_clear_cookies(true)
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        .run(&mut server, pool)
        .await;
}
