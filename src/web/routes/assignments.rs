use axum::{
    Json, Router,
    extract::{Path, State},
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    model::{
        CourseAccess, DatabaseResult, ResourceTyped,
        entity::{
            Assignment, AssignmentCreate, AssignmentWithStatusRow, Course, Enrollment, Lesson,
            NewNotification, Notification, NotificationKind, Submission, SubmissionPayload,
            SubmissionType, plan_submission,
        },
    },
    web::{AppState, AuthenticatedUser, RequestContext, WebError, WebResult, error::ErrorResponse, middlewares},
};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct GradeBody {
    pub score: Option<i32>,
    pub feedback: Option<String>,
    /// `resubmit` asks the student for another attempt.
    pub status: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AssignmentDetails {
    assignment: Assignment,
    submissions: Vec<Submission>,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", post(assignment_create_handler))
        .route("/course/{course_id}", get(assignment_list_handler))
        .route("/{id}", get(assignment_get_handler))
        .route("/{id}/submit", post(assignment_submit_handler))
        .route("/submissions/{id}/grade", patch(submission_grade_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

async fn find_course(state: &AppState, id: Uuid) -> WebResult<Course> {
    Course::find(state.pool(), id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(Course::get_resource_type()))
}

async fn find_assignment(state: &AppState, id: Uuid) -> WebResult<Assignment> {
    Assignment::find_by_id(state.pool(), id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Assignment::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(Assignment::get_resource_type()))
}

async fn course_access(
    state: &AppState,
    user: &AuthenticatedUser,
    course: &Course,
) -> WebResult<CourseAccess> {
    CourseAccess::resolve(state.pool(), user, course)
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))
}

#[utoipa::path(
    get,
    path = "/api/v1/assignments/course/{course_id}",
    params(("course_id" = Uuid, Path, description = "ID of the course")),
    responses(
        (status = 200, description = "Assignments with the caller's latest submission", body = Vec<AssignmentWithStatusRow>),
        (status = 403, description = "Not enrolled in this course", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
    ),
    tag = "assignments",
    security(("cookie" = []))
)]
async fn assignment_list_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let course = find_course(&state, course_id).await?;
    if !course_access(&state, user, &course).await?.can_participate() {
        return Err(WebError::resource_forbidden(Assignment::get_resource_type()));
    }

    let rows = AssignmentWithStatusRow::all_by_course(state.pool(), course.id(), user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Assignment::get_resource_type(), e))?;

    Ok(Json(rows))
}

#[utoipa::path(
    get,
    path = "/api/v1/assignments/{id}",
    params(("id" = Uuid, Path, description = "ID of the assignment")),
    responses(
        (status = 200, description = "Assignment with the caller's submissions", body = AssignmentDetails),
        (status = 403, description = "Not enrolled in this course", body = ErrorResponse),
        (status = 404, description = "Assignment not found", body = ErrorResponse),
    ),
    tag = "assignments",
    security(("cookie" = []))
)]
async fn assignment_get_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let assignment = find_assignment(&state, id).await?;
    let course = find_course(&state, assignment.course_id()).await?;
    if !course_access(&state, user, &course).await?.can_participate() {
        return Err(WebError::resource_forbidden(Assignment::get_resource_type()));
    }

    let submissions = Submission::all_for_user(state.pool(), assignment.id(), user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Submission::get_resource_type(), e))?;

    Ok(Json(AssignmentDetails {
        assignment,
        submissions,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/assignments",
    request_body = AssignmentCreate,
    responses(
        (status = 200, description = "Assignment created", body = Assignment),
        (status = 400, description = "Invalid assignment", body = ErrorResponse),
        (status = 403, description = "Not the course instructor", body = ErrorResponse),
        (status = 404, description = "Course or lesson not found", body = ErrorResponse),
    ),
    tag = "assignments",
    security(("cookie" = []))
)]
async fn assignment_create_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<AssignmentCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    if !payload.is_valid() {
        return Err(WebError::resource_bad_request(Assignment::get_resource_type()));
    }

    let course = find_course(&state, payload.course_id).await?;
    if !course_access(&state, user, &course).await?.is_instructor() {
        return Err(WebError::resource_forbidden(Assignment::get_resource_type()));
    }

    if let Some(lesson_id) = payload.lesson_id {
        Lesson::find(state.pool(), lesson_id)
            .await
            .map_err(|e| WebError::resource_fetch_error(Lesson::get_resource_type(), e))?
            .filter(|l| l.course_id() == course.id())
            .ok_or(WebError::resource_not_found(Lesson::get_resource_type()))?;
    }

    let assignment = Assignment::create(state.pool(), payload)
        .await
        .map_err(|e| WebError::resource_fetch_error(Assignment::get_resource_type(), e))?;

    Ok(Json(assignment))
}

#[utoipa::path(
    post,
    path = "/api/v1/assignments/{id}/submit",
    description = "Submits work. A reviewed submission starts a new attempt, a pending one is replaced",
    params(("id" = Uuid, Path, description = "ID of the assignment")),
    request_body = SubmissionPayload,
    responses(
        (status = 200, description = "Submission stored", body = Submission),
        (status = 400, description = "Missing content or type not accepted", body = ErrorResponse),
        (status = 403, description = "Not enrolled in this course", body = ErrorResponse),
        (status = 404, description = "Assignment not found", body = ErrorResponse),
    ),
    tag = "assignments",
    security(("cookie" = []))
)]
async fn assignment_submit_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmissionPayload>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let kind = payload
        .validate()
        .map_err(|reason| WebError::resource_bad_request_because(Submission::get_resource_type(), reason))?;

    let assignment = find_assignment(&state, id).await?;
    if !assignment.accepts(kind) {
        return Err(WebError::resource_bad_request_because(
            Submission::get_resource_type(),
            "Submission type not accepted for this assignment",
        ));
    }

    let enrollment = Enrollment::find_active(state.pool(), user.user_id(), assignment.course_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Enrollment::get_resource_type(), e))?
        .ok_or(WebError::resource_forbidden_because(
            Submission::get_resource_type(),
            "Not enrolled in this course",
        ))?;

    let submission = match submit_planned(&state, &assignment, &enrollment, kind, &payload).await {
        // a concurrent submit took the attempt number, plan again on top of it
        Err(e) if e.is_unique_violation() => {
            submit_planned(&state, &assignment, &enrollment, kind, &payload).await
        }
        other => other,
    }
    .map_err(|e| {
        WebError::resource_write_error(
            Submission::get_resource_type(),
            e,
            "Another submission for this assignment is in progress",
        )
    })?;

    tracing::info!(
        "submission {} for assignment {} (attempt {})",
        submission.id(),
        assignment.id(),
        submission.attempt_number()
    );
    Ok(Json(submission))
}

async fn submit_planned(
    state: &AppState,
    assignment: &Assignment,
    enrollment: &Enrollment,
    kind: SubmissionType,
    payload: &SubmissionPayload,
) -> DatabaseResult<Submission> {
    let latest = Submission::latest(state.pool(), assignment.id(), enrollment.user_id()).await?;
    let plan = plan_submission(latest.as_ref());
    Submission::submit(state.pool(), assignment, enrollment, kind, payload, plan).await
}

#[utoipa::path(
    patch,
    path = "/api/v1/assignments/submissions/{id}/grade",
    params(("id" = Uuid, Path, description = "ID of the submission")),
    request_body = GradeBody,
    responses(
        (status = 200, description = "Submission reviewed", body = Submission),
        (status = 400, description = "Score out of range", body = ErrorResponse),
        (status = 403, description = "Not the course instructor", body = ErrorResponse),
        (status = 404, description = "Submission not found", body = ErrorResponse),
    ),
    tag = "assignments",
    security(("cookie" = []))
)]
async fn submission_grade_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<GradeBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let submission = Submission::find_by_id(state.pool(), id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Submission::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(Submission::get_resource_type()))?;
    let assignment = find_assignment(&state, submission.assignment_id()).await?;
    let course = find_course(&state, assignment.course_id()).await?;

    if !course_access(&state, user, &course).await?.is_instructor() {
        return Err(WebError::resource_forbidden(Submission::get_resource_type()));
    }

    if payload
        .score
        .is_some_and(|s| !(0..=assignment.max_score()).contains(&s))
    {
        return Err(WebError::resource_bad_request_because(
            Submission::get_resource_type(),
            format!("Score must be between 0 and {}", assignment.max_score()),
        ));
    }

    let request_resubmit = payload.status.as_deref() == Some("resubmit");
    let graded = submission
        .grade(
            state.pool(),
            user.user_id(),
            payload.score,
            payload.feedback.as_deref(),
            request_resubmit,
        )
        .await
        .map_err(|e| WebError::resource_fetch_error(Submission::get_resource_type(), e))?;

    let message = if request_resubmit {
        format!("Please resubmit your work for \"{}\".", assignment.title())
    } else {
        format!("Your submission for \"{}\" has been graded.", assignment.title())
    };
    Notification::push_quietly(
        state.pool(),
        graded.user_id(),
        NewNotification {
            kind: NotificationKind::AssignmentGraded,
            title: String::from("Assignment reviewed"),
            message,
            action_url: None,
        },
    )
    .await;

    Ok(Json(graded))
}
