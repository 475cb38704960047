mod common;
use reqwest::StatusCode;
use serde_json::json;

use uuid::Uuid;

use crate::common::{
    Action, Flow, create_course_action, create_lesson_action, create_module_action, enroll_action,
    id_of, setup_server, setup_test_db, signin_action, signin_admin_action, signup_action,
};

fn grade_action(submission_key: &'static str) -> Action {
    Action::new("grade", "PATCH", "dynamic").with_dyn_path(move |ctx| {
        format!("/api/v1/assignments/submissions/{}/grade", id_of(ctx, submission_key))
    })
}

fn submit_action(text: &str) -> Action {
    Action::new("submit", "POST", "dynamic")
        .with_dyn_path(|ctx| format!("/api/v1/assignments/{}/submit", id_of(ctx, "assignment")))
        .with_body(json!({ "submission_type": "text", "text_content": text }))
}

#[tokio::test]
async fn route_assignment_submission_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signin_admin_action())
        .step(create_course_action("course", "Essays", 0))
        .step(
            Action::new("assignment_create", "POST", "/api/v1/assignments")
                .with_dyn_body(|ctx| {
                    json!({
                        "course_id": id_of(ctx, "course"),
                        "title": "Write about lifetimes",
                        "max_score": 50,
                        "submission_types": ["text", "url"],
                    })
                })
                .with_save_as("assignment"),
        )
        .step(signup_action("writer@example.com", "secret"))
        .step(submit_action("draft").with_expect(StatusCode::FORBIDDEN))
        .step(enroll_action("course"))
        .step(
            Action::new("submit_file", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/assignments/{}/submit", id_of(ctx, "assignment")))
                .with_body(json!({ "submission_type": "file", "file_url": "https://files.example.com/a.pdf" }))
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_body(|body| assert!(body.contains("not accepted"))),
        )
        .step(
            Action::new("submit_blank", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/assignments/{}/submit", id_of(ctx, "assignment")))
                .with_body(json!({ "submission_type": "text", "text_content": "   " }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            submit_action("first draft")
                .assert_json(|body, _| {
                    assert_eq!(body["attempt_number"], 1);
                    assert_eq!(body["status"], "submitted");
                })
                .with_save_as("first"),
        )
        // an unreviewed submission is replaced in place
        .step(submit_action("second draft").assert_json(|body, ctx| {
            assert_eq!(body["id"], ctx.get("first")["id"]);
            assert_eq!(body["attempt_number"], 1);
            assert_eq!(body["text_content"], "second draft");
        }))
        .step(grade_action("first").with_body(json!({ "score": 40 })).with_expect(StatusCode::FORBIDDEN))
        .step(signin_admin_action())
        .step(
            grade_action("first")
                .with_body(json!({ "score": 51 }))
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_body(|body| assert!(body.contains("between 0 and 50"))),
        )
        .step(
            grade_action("first")
                .with_body(json!({ "score": 20, "feedback": "Needs examples", "status": "resubmit" }))
                .assert_json(|body, _| {
                    assert_eq!(body["status"], "resubmit");
                    assert_eq!(body["score"], 20);
                }),
        )
        .step(signin_action("writer@example.com", "secret"))
        .step(
            submit_action("third draft")
                .assert_json(|body, ctx| {
                    assert_ne!(body["id"], ctx.get("first")["id"]);
                    assert_eq!(body["attempt_number"], 2);
                    assert_eq!(body["previous_submission_id"], ctx.get("first")["id"]);
                })
                .with_save_as("second"),
        )
        .step(
            Action::new("assignment_details", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/assignments/{}", id_of(ctx, "assignment")))
                .assert_json(|body, _| {
                    assert_eq!(body["assignment"]["max_score"], 50);
                    assert_eq!(body["submissions"].as_array().map(Vec::len), Some(2));
                }),
        )
        .step(
            Action::new("assignment_list", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/assignments/course/{}", id_of(ctx, "course")))
                .assert_json(|body, _| {
                    assert_eq!(body[0]["submission_status"], "submitted");
                    assert_eq!(body[0]["attempt_number"], 2);
                }),
        )
        .step(
            Action::new("notifications", "GET", "/api/v1/notifications")
                .with_param("kind", "assignment_graded")
                .assert_json(|body, _| assert_eq!(body["total"], 1)),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_assignment_authoring_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signin_admin_action())
        .step(create_course_action("course", "Essays", 0))
        .step(
            Action::new("assignment_untitled", "POST", "/api/v1/assignments")
                .with_dyn_body(|ctx| json!({ "course_id": id_of(ctx, "course"), "title": " " }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("assignment_unknown_lesson", "POST", "/api/v1/assignments")
                .with_dyn_body(|ctx| {
                    json!({ "course_id": id_of(ctx, "course"), "title": "Lost", "lesson_id": Uuid::new_v4() })
                })
                .with_expect(StatusCode::NOT_FOUND),
        )
        // lessons must belong to the assignment's course
        .step(create_course_action("other", "Other essays", 0))
        .step(create_module_action("other_module", "other", "Elsewhere"))
        .step(create_lesson_action("other_lesson", "other", "other_module", "Foreign lesson", false))
        .step(
            Action::new("assignment_foreign_lesson", "POST", "/api/v1/assignments")
                .with_dyn_body(|ctx| {
                    json!({
                        "course_id": id_of(ctx, "course"),
                        "title": "Borrowed",
                        "lesson_id": id_of(ctx, "other_lesson"),
                    })
                })
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(create_module_action("module", "course", "Writing"))
        .step(create_lesson_action("lesson", "course", "module", "Essay basics", false))
        .step(
            Action::new("assignment_with_lesson", "POST", "/api/v1/assignments")
                .with_dyn_body(|ctx| {
                    json!({
                        "course_id": id_of(ctx, "course"),
                        "title": "Essay basics homework",
                        "lesson_id": id_of(ctx, "lesson"),
                    })
                })
                .assert_json(|body, ctx| assert_eq!(body["lesson_id"], ctx.get("lesson")["id"])),
        )
        .step(signup_action("student@example.com", "secret"))
        .step(
            Action::new("assignment_student", "POST", "/api/v1/assignments")
                .with_dyn_body(|ctx| json!({ "course_id": id_of(ctx, "course"), "title": "Mine" }))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(
            Action::new("assignment_list", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/assignments/course/{}", id_of(ctx, "course")))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_assignment_concurrent_submit_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signin_admin_action())
        .step(create_course_action("course", "Essays", 0))
        .step(
            Action::new("assignment_create", "POST", "/api/v1/assignments")
                .with_dyn_body(|ctx| {
                    json!({ "course_id": id_of(ctx, "course"), "title": "Race", "submission_types": ["text"] })
                })
                .with_save_as("assignment"),
        )
        .step(signup_action("racer@example.com", "secret"))
        .step(enroll_action("course"))
        // both first submissions land on attempt 1, never on a server error
        .step(submit_action("double click").with_concurrent_twin(&[StatusCode::OK, StatusCode::CONFLICT]))
        .step(
            Action::new("assignment_details", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/assignments/{}", id_of(ctx, "assignment")))
                .assert_json(|body, _| {
                    let submissions = body["submissions"].as_array().expect("submissions");
                    assert_eq!(submissions.len(), 1);
                    assert_eq!(submissions[0]["attempt_number"], 1);
                }),
        )
        .run(&mut server, pool)
        .await;
}
