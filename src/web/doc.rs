use utoipa::{Modify, OpenApi};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};


pub struct CookieAuthModifier;

impl Modify for CookieAuthModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(schema) = openapi.components.as_mut() {
            schema.add_security_scheme("cookie", SecurityScheme::ApiKey(
                    ApiKey::Cookie(ApiKeyValue::with_description("SID", "JWT token for current user"))
            ));
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "academy", description = "Online courses, progress tracking and community API"),
    paths(
        crate::web::routes::account::user_signup_handler,
        crate::web::routes::account::user_signin_handler,
        crate::web::routes::account::user_signout_handler,
        crate::web::routes::account::user_me_handler,
        crate::web::routes::account::user_list_handler,
        crate::web::routes::account::user_update_handler,
        crate::web::routes::account::user_role_handler,
        crate::web::routes::account::user_delete_handler,

        crate::web::routes::courses::catalog_handler,
        crate::web::routes::courses::course_mine_handler,
        crate::web::routes::courses::course_details_handler,
        crate::web::routes::courses::course_create_handler,
        crate::web::routes::courses::course_update_handler,
        crate::web::routes::courses::course_delete_handler,
        crate::web::routes::courses::module_create_handler,
        crate::web::routes::courses::module_update_handler,
        crate::web::routes::courses::module_delete_handler,
        crate::web::routes::courses::lesson_create_handler,
        crate::web::routes::courses::lesson_update_handler,
        crate::web::routes::courses::lesson_delete_handler,
        crate::web::routes::courses::lesson_reorder_handler,

        crate::web::routes::enrollments::enrollment_status_handler,
        crate::web::routes::enrollments::enrollment_mine_handler,
        crate::web::routes::enrollments::enroll_handler,

        crate::web::routes::lessons::lesson_get_handler,
        crate::web::routes::lessons::lesson_complete_handler,
        crate::web::routes::lessons::notes_get_handler,
        crate::web::routes::lessons::notes_put_handler,
        crate::web::routes::lessons::notes_delete_handler,

        crate::web::routes::progress::progress_get_handler,
        crate::web::routes::progress::progress_post_handler,
        crate::web::routes::progress::dashboard_handler,

        crate::web::routes::bookmarks::bookmark_list_handler,
        crate::web::routes::bookmarks::bookmark_create_handler,
        crate::web::routes::bookmarks::bookmark_delete_handler,

        crate::web::routes::certificates::certificate_list_handler,
        crate::web::routes::certificates::certificate_get_handler,
        crate::web::routes::certificates::certificate_verify_handler,
        crate::web::routes::certificates::certificate_issue_handler,

        crate::web::routes::quizzes::quiz_list_handler,
        crate::web::routes::quizzes::quiz_get_handler,
        crate::web::routes::quizzes::quiz_create_handler,
        crate::web::routes::quizzes::attempt_list_handler,
        crate::web::routes::quizzes::attempt_submit_handler,

        crate::web::routes::assignments::assignment_list_handler,
        crate::web::routes::assignments::assignment_get_handler,
        crate::web::routes::assignments::assignment_create_handler,
        crate::web::routes::assignments::assignment_submit_handler,
        crate::web::routes::assignments::submission_grade_handler,

        crate::web::routes::discussions::discussion_list_handler,
        crate::web::routes::discussions::discussion_create_handler,
        crate::web::routes::discussions::discussion_get_handler,
        crate::web::routes::discussions::discussion_update_handler,
        crate::web::routes::discussions::discussion_delete_handler,
        crate::web::routes::discussions::reply_create_handler,
        crate::web::routes::discussions::reply_update_handler,
        crate::web::routes::discussions::reply_delete_handler,

        crate::web::routes::teams::team_list_handler,
        crate::web::routes::teams::team_create_handler,
        crate::web::routes::teams::team_get_handler,
        crate::web::routes::teams::team_update_handler,
        crate::web::routes::teams::team_delete_handler,
        crate::web::routes::teams::member_list_handler,
        crate::web::routes::teams::member_add_handler,
        crate::web::routes::teams::member_role_handler,
        crate::web::routes::teams::member_remove_handler,
        crate::web::routes::teams::invitation_list_handler,
        crate::web::routes::teams::invitation_create_handler,
        crate::web::routes::teams::invitation_revoke_handler,
        crate::web::routes::teams::join_preview_handler,
        crate::web::routes::teams::join_accept_handler,

        crate::web::routes::notifications::notification_list_handler,
        crate::web::routes::notifications::notification_update_handler,
        crate::web::routes::notifications::notification_delete_handler,

        crate::web::routes::payments::checkout_handler,
        crate::web::routes::payments::payment_history_handler,
        crate::web::routes::webhooks::stripe_webhook_handler,

        crate::web::routes::live_trainings::training_list_handler,
        crate::web::routes::live_trainings::training_get_handler,
        crate::web::routes::live_trainings::training_create_handler,
        crate::web::routes::live_trainings::training_update_handler,
        crate::web::routes::live_trainings::training_cancel_handler,
        crate::web::routes::live_trainings::training_registration_handler,
    ),
    modifiers(&CookieAuthModifier),
)]
pub struct ApiDoc;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn openapi_lists_paths_test() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/courses"));
        assert!(doc.paths.paths.contains_key("/api/v1/webhooks/stripe"));
        assert!(doc.paths.paths.contains_key("/api/v1/teams/{id}/invitations"));
        assert!(doc.paths.paths.contains_key("/api/v1/progress/dashboard"));
        assert!(
            doc.paths
                .paths
                .contains_key("/api/v1/courses/{id}/modules/{module_id}/lessons/reorder")
        );
    }
}
