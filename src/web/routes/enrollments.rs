use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    model::{
        CrudRepository, ResourceTyped,
        entity::{Course, Enrollment, EnrollmentWithCourseRow},
    },
    web::{AppState, AuthenticatedUser, RequestContext, WebError, WebResult, error::ErrorResponse, middlewares},
};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct EnrollmentQuery {
    course_id: Option<Uuid>,
    course_slug: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct EnrollmentStatus {
    enrollment: Option<Enrollment>,
    is_enrolled: bool,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct EnrollBody {
    pub course_id: Uuid,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct EnrollmentConflict {
    error: String,
    enrollment_id: Uuid,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(enrollment_status_handler).post(enroll_handler))
        .route("/mine", get(enrollment_mine_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/v1/enrollments",
    params(EnrollmentQuery),
    description = "Enrollment of the caller in a course given by id or slug",
    responses(
        (status = 200, description = "Enrollment status", body = EnrollmentStatus),
        (status = 400, description = "Neither course_id nor course_slug given", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
    ),
    tag = "enrollments"
)]
async fn enrollment_status_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(query): Query<EnrollmentQuery>,
) -> WebResult<impl IntoResponse> {
    let course_id = match (query.course_id, query.course_slug) {
        (Some(id), _) => id,
        (None, Some(slug)) => Course::find_by_slug(state.pool(), &slug)
            .await
            .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?
            .ok_or(WebError::resource_not_found(Course::get_resource_type()))?
            .id(),
        (None, None) => {
            return Err(WebError::resource_bad_request_because(
                Enrollment::get_resource_type(),
                "Course ID or slug is required",
            ));
        }
    };

    let Some(user) = ctx.maybe_user() else {
        return Ok(Json(EnrollmentStatus {
            enrollment: None,
            is_enrolled: false,
        }));
    };

    let enrollment = Enrollment::find_active(state.pool(), user.user_id(), course_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Enrollment::get_resource_type(), e))?;

    Ok(Json(EnrollmentStatus {
        is_enrolled: enrollment.is_some(),
        enrollment,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/enrollments/mine",
    responses(
        (status = 200, description = "Caller's enrollments", body = Vec<EnrollmentWithCourseRow>),
        (status = 401, description = "Not signed in", body = ErrorResponse),
    ),
    tag = "enrollments",
    security(("cookie" = []))
)]
async fn enrollment_mine_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let rows = EnrollmentWithCourseRow::all_for_user(state.pool(), user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Enrollment::get_resource_type(), e))?;

    Ok(Json(rows))
}

#[utoipa::path(
    post,
    path = "/api/v1/enrollments",
    request_body = EnrollBody,
    description = "Enrolls the caller into a free course",
    responses(
        (status = 200, description = "Enrolled", body = Enrollment),
        (status = 400, description = "Course requires payment", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 409, description = "Already enrolled", body = EnrollmentConflict),
    ),
    tag = "enrollments",
    security(("cookie" = []))
)]
async fn enroll_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<EnrollBody>,
) -> WebResult<Response> {
    let user = ctx.user()?;

    let course = Course::find_by_id(state.pool(), user, payload.course_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?
        .filter(|c| c.visible_to(Some(user)))
        .ok_or(WebError::resource_not_found(Course::get_resource_type()))?;

    if !course.is_free_to_enroll() {
        return Err(WebError::resource_bad_request_because(
            Enrollment::get_resource_type(),
            "This course requires payment",
        ));
    }

    if let Some(existing) = existing_enrollment(&state, user, course.id()).await? {
        return Ok(already_enrolled(existing.id()));
    }

    let created = Enrollment::create_free(state.pool(), user.user_id(), course.id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Enrollment::get_resource_type(), e))?;

    match created {
        Some(enrollment) => {
            tracing::info!("user {} enrolled into {}", user.user_id(), course.id());
            Ok(Json(enrollment).into_response())
        }
        // lost a race with a concurrent enrollment
        None => {
            let existing = existing_enrollment(&state, user, course.id())
                .await?
                .ok_or(WebError::resource_not_found(Enrollment::get_resource_type()))?;
            Ok(already_enrolled(existing.id()))
        }
    }
}

async fn existing_enrollment(
    state: &AppState,
    user: &AuthenticatedUser,
    course_id: Uuid,
) -> WebResult<Option<Enrollment>> {
    Enrollment::find_active(state.pool(), user.user_id(), course_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Enrollment::get_resource_type(), e))
}

fn already_enrolled(enrollment_id: Uuid) -> Response {
    let body = EnrollmentConflict {
        error: String::from("Already enrolled in this course"),
        enrollment_id,
    };
    (StatusCode::CONFLICT, Json(body)).into_response()
}
