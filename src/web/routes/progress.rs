use axum::{
    Json, Router,
    extract::{Query, State},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    model::{
        ResourceTyped,
        completion::{self, ProgressSummary},
        dashboard::{self, StudentDashboard},
        entity::{Enrollment, EnrollmentWithCourseRow, LessonProgress},
    },
    web::{AppState, RequestContext, WebError, WebResult, error::ErrorResponse, middlewares, routes::lessons::enrolled_lesson},
};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ProgressQuery {
    course_id: Option<Uuid>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CourseProgress {
    enrollment: Enrollment,
    progress: ProgressSummary,
    completed_lesson_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProgressOverview {
    enrollments: Vec<EnrollmentWithCourseRow>,
    total_courses: usize,
    completed_courses: usize,
    average_progress: i32,
}

impl ProgressOverview {
    fn new(enrollments: Vec<EnrollmentWithCourseRow>) -> Self {
        let total_courses = enrollments.len();
        let completed_courses = enrollments
            .iter()
            .filter(|e| e.progress_percentage >= 100)
            .count();
        let average_progress = if total_courses == 0 {
            0
        } else {
            let sum: i64 = enrollments.iter().map(|e| e.progress_percentage as i64).sum();
            (sum / total_courses as i64) as i32
        };

        Self {
            enrollments,
            total_courses,
            completed_courses,
            average_progress,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ProgressBody {
    pub lesson_id: Uuid,
    pub watch_time_seconds: Option<i32>,
    #[serde(default)]
    pub completed: bool,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(progress_get_handler).post(progress_post_handler))
        .route("/dashboard", get(dashboard_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/v1/progress",
    params(ProgressQuery),
    description = "Progress in one course, or an overview over all enrollments",
    responses(
        (status = 200, description = "Course progress (with course_id) or overview", body = ProgressOverview),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 404, description = "Not enrolled in the course", body = ErrorResponse),
    ),
    tag = "progress",
    security(("cookie" = []))
)]
async fn progress_get_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> WebResult<Response> {
    let user = ctx.user()?;

    let Some(course_id) = query.course_id else {
        let rows = EnrollmentWithCourseRow::all_for_user(state.pool(), user.user_id())
            .await
            .map_err(|e| WebError::resource_fetch_error(Enrollment::get_resource_type(), e))?;
        return Ok(Json(ProgressOverview::new(rows)).into_response());
    };

    let enrollment = Enrollment::find(state.pool(), user.user_id(), course_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Enrollment::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(Enrollment::get_resource_type()))?;

    let (progress, lessons) = tokio::try_join!(
        completion::summarize(state.pool(), &enrollment),
        LessonProgress::all_for_course(state.pool(), user.user_id(), course_id),
    )
    .map_err(|e| WebError::resource_fetch_error(LessonProgress::get_resource_type(), e))?;

    let completed_lesson_ids = lessons
        .iter()
        .filter(|p| p.is_completed())
        .map(LessonProgress::lesson_id)
        .collect();

    Ok(Json(CourseProgress {
        enrollment,
        progress,
        completed_lesson_ids,
    })
    .into_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/progress/dashboard",
    description = "Enrolled courses with lesson counters, certificates and learning statistics",
    responses(
        (status = 200, description = "Student dashboard", body = StudentDashboard),
        (status = 401, description = "Not signed in", body = ErrorResponse),
    ),
    tag = "progress",
    security(("cookie" = []))
)]
async fn dashboard_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let dashboard = dashboard::student_dashboard(state.pool(), user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Enrollment::get_resource_type(), e))?;

    Ok(Json(dashboard))
}

#[utoipa::path(
    post,
    path = "/api/v1/progress",
    request_body = ProgressBody,
    description = "Reports watch time for a lesson and optionally completes it",
    responses(
        (status = 200, description = "Stored progress, or the completion outcome when completed", body = LessonProgress),
        (status = 403, description = "Not enrolled in this course", body = ErrorResponse),
        (status = 404, description = "Lesson not found", body = ErrorResponse),
    ),
    tag = "progress",
    security(("cookie" = []))
)]
async fn progress_post_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<ProgressBody>,
) -> WebResult<Response> {
    let user = ctx.user()?;
    let (lesson, enrollment) = enrolled_lesson(&state, user, payload.lesson_id).await?;

    let mut recorded = None;
    if let Some(seconds) = payload.watch_time_seconds {
        let progress = LessonProgress::record_watch_time(state.pool(), &enrollment, &lesson, seconds)
            .await
            .map_err(|e| WebError::resource_fetch_error(LessonProgress::get_resource_type(), e))?;
        recorded = Some(progress);
    }

    if payload.completed {
        let outcome = completion::complete_lesson(state.pool(), state.issuer(), enrollment, &lesson)
            .await
            .map_err(|e| WebError::resource_fetch_error(LessonProgress::get_resource_type(), e))?;
        return Ok(Json(outcome).into_response());
    }

    let progress = match recorded {
        Some(progress) => Some(progress),
        None => LessonProgress::find(state.pool(), user.user_id(), lesson.id())
            .await
            .map_err(|e| WebError::resource_fetch_error(LessonProgress::get_resource_type(), e))?,
    };

    enrollment
        .touch(state.pool())
        .await
        .map_err(|e| WebError::resource_fetch_error(Enrollment::get_resource_type(), e))?;

    Ok(Json(progress).into_response())
}
