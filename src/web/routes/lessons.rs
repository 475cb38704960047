use axum::{
    Json, Router,
    extract::{Path, State},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    model::{
        CourseAccess, ResourceTyped,
        completion::{self, CompletionOutcome},
        entity::{Course, Enrollment, Lesson, LessonProgress},
    },
    web::{
        AppState, AuthenticatedUser, RequestContext, WebError, WebResult,
        dto::lessons::{LessonNotes, LessonResponse},
        error::ErrorResponse,
        middlewares,
    },
};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct NotesBody {
    pub notes: String,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/{id}", get(lesson_get_handler))
        .route("/{id}/complete", post(lesson_complete_handler))
        .route(
            "/{id}/notes",
            get(notes_get_handler)
                .put(notes_put_handler)
                .delete(notes_delete_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

async fn lesson_with_course(state: &AppState, id: Uuid) -> WebResult<(Lesson, Course)> {
    let lesson = Lesson::find(state.pool(), id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Lesson::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(Lesson::get_resource_type()))?;

    let course = Course::find(state.pool(), lesson.course_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(Lesson::get_resource_type()))?;

    Ok((lesson, course))
}

/// Loads a lesson together with the caller's active enrollment in its course.
/// 404 for an unknown lesson, 403 when the caller is not enrolled.
pub(crate) async fn enrolled_lesson(
    state: &AppState,
    user: &AuthenticatedUser,
    id: Uuid,
) -> WebResult<(Lesson, Enrollment)> {
    let (lesson, _) = lesson_with_course(state, id).await?;

    let enrollment = Enrollment::find_active(state.pool(), user.user_id(), lesson.course_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Enrollment::get_resource_type(), e))?
        .ok_or(WebError::resource_forbidden_because(
            Lesson::get_resource_type(),
            "Not enrolled in this course",
        ))?;

    Ok((lesson, enrollment))
}

#[utoipa::path(
    get,
    path = "/api/v1/lessons/{id}",
    description = "Lesson content with the caller's progress. Free previews are public",
    params(("id" = Uuid, Path, description = "ID of the lesson")),
    responses(
        (status = 200, description = "Lesson found", body = LessonResponse),
        (status = 401, description = "Sign in required for this lesson", body = ErrorResponse),
        (status = 403, description = "Not enrolled in this course", body = ErrorResponse),
        (status = 404, description = "Lesson not found", body = ErrorResponse),
    ),
    tag = "lessons",
    security(("cookie" = []))
)]
async fn lesson_get_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let (lesson, course) = lesson_with_course(&state, id).await?;
    if !course.visible_to(ctx.maybe_user()) {
        return Err(WebError::resource_not_found(Lesson::get_resource_type()));
    }

    let Some(user) = ctx.maybe_user() else {
        if lesson.is_free_preview() {
            return Ok(Json(LessonResponse::new(lesson, None)));
        }
        return Err(WebError::auth_required());
    };

    let access = CourseAccess::resolve(state.pool(), user, &course)
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?;

    if !access.can_participate() && !lesson.is_free_preview() {
        return Err(WebError::resource_forbidden_because(
            Lesson::get_resource_type(),
            "Not enrolled in this course",
        ));
    }

    let progress = match access.enrollment() {
        Some(enrollment) => {
            enrollment
                .touch(state.pool())
                .await
                .map_err(|e| WebError::resource_fetch_error(Enrollment::get_resource_type(), e))?;
            LessonProgress::find(state.pool(), user.user_id(), lesson.id())
                .await
                .map_err(|e| WebError::resource_fetch_error(LessonProgress::get_resource_type(), e))?
        }
        None => None,
    };

    Ok(Json(LessonResponse::new(lesson, progress)))
}

#[utoipa::path(
    post,
    path = "/api/v1/lessons/{id}/complete",
    description = "Marks the lesson completed and recomputes course progress",
    params(("id" = Uuid, Path, description = "ID of the lesson")),
    responses(
        (status = 200, description = "Completion outcome", body = CompletionOutcome),
        (status = 403, description = "Not enrolled in this course", body = ErrorResponse),
        (status = 404, description = "Lesson not found", body = ErrorResponse),
    ),
    tag = "lessons",
    security(("cookie" = []))
)]
async fn lesson_complete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let (lesson, enrollment) = enrolled_lesson(&state, user, id).await?;

    let outcome = completion::complete_lesson(state.pool(), state.issuer(), enrollment, &lesson)
        .await
        .map_err(|e| WebError::resource_fetch_error(LessonProgress::get_resource_type(), e))?;

    Ok(Json(outcome))
}

#[utoipa::path(
    get,
    path = "/api/v1/lessons/{id}/notes",
    params(("id" = Uuid, Path, description = "ID of the lesson")),
    responses(
        (status = 200, description = "Caller's note for the lesson", body = LessonNotes),
        (status = 403, description = "Not enrolled in this course", body = ErrorResponse),
    ),
    tag = "lessons",
    security(("cookie" = []))
)]
async fn notes_get_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let (lesson, _) = enrolled_lesson(&state, user, id).await?;

    let progress = LessonProgress::find(state.pool(), user.user_id(), lesson.id())
        .await
        .map_err(|e| WebError::resource_fetch_error(LessonProgress::get_resource_type(), e))?;

    Ok(Json(LessonNotes::from(progress.as_ref())))
}

#[utoipa::path(
    put,
    path = "/api/v1/lessons/{id}/notes",
    params(("id" = Uuid, Path, description = "ID of the lesson")),
    request_body = NotesBody,
    responses(
        (status = 200, description = "Note saved", body = LessonNotes),
        (status = 403, description = "Not enrolled in this course", body = ErrorResponse),
    ),
    tag = "lessons",
    security(("cookie" = []))
)]
async fn notes_put_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<NotesBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let (lesson, enrollment) = enrolled_lesson(&state, user, id).await?;

    let progress = LessonProgress::set_notes(state.pool(), &enrollment, &lesson, Some(&payload.notes))
        .await
        .map_err(|e| WebError::resource_fetch_error(LessonProgress::get_resource_type(), e))?;

    Ok(Json(LessonNotes::from(Some(&progress))))
}

#[utoipa::path(
    delete,
    path = "/api/v1/lessons/{id}/notes",
    params(("id" = Uuid, Path, description = "ID of the lesson")),
    responses(
        (status = 200, description = "Note cleared", body = LessonNotes),
        (status = 403, description = "Not enrolled in this course", body = ErrorResponse),
    ),
    tag = "lessons",
    security(("cookie" = []))
)]
async fn notes_delete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let (lesson, enrollment) = enrolled_lesson(&state, user, id).await?;

    let progress = LessonProgress::set_notes(state.pool(), &enrollment, &lesson, None)
        .await
        .map_err(|e| WebError::resource_fetch_error(LessonProgress::get_resource_type(), e))?;

    Ok(Json(LessonNotes::from(Some(&progress))))
}
