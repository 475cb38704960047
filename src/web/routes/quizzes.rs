use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    middleware,
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    model::{
        CourseAccess, ResourceTyped,
        completion::{self, CompletionOutcome},
        entity::{
            Course, Enrollment, Lesson, Quiz, QuizAttempt, QuizCreate, QuizScore, SubmittedAnswer,
            score_attempt,
        },
    },
    web::{
        AppState, AuthenticatedUser, RequestContext, WebError, WebResult,
        dto::quizzes::{AttemptHistory, QuizView},
        error::ErrorResponse,
        middlewares,
    },
};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct QuizQuery {
    course_id: Option<Uuid>,
    lesson_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AttemptBody {
    /// Answers keyed by question id.
    #[serde(default)]
    pub answers: HashMap<Uuid, SubmittedAnswer>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AttemptResult {
    attempt: QuizAttempt,
    result: QuizScore,
    /// Present when a passing attempt completed the quiz's lesson.
    #[serde(skip_serializing_if = "Option::is_none")]
    lesson_completion: Option<CompletionOutcome>,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(quiz_list_handler).post(quiz_create_handler))
        .route("/{id}", get(quiz_get_handler))
        .route(
            "/{id}/attempts",
            get(attempt_list_handler).post(attempt_submit_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

async fn quiz_course(state: &AppState, quiz: &Quiz) -> WebResult<Course> {
    Course::find(state.pool(), quiz.course_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(Quiz::get_resource_type()))
}

async fn find_quiz(state: &AppState, id: Uuid) -> WebResult<Quiz> {
    Quiz::find_by_id(state.pool(), id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Quiz::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(Quiz::get_resource_type()))
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
    path = "/api/v1/quizzes",
    params(QuizQuery),
    responses(
        (status = 200, description = "Published quizzes", body = Vec<Quiz>),
    ),
    tag = "quizzes"
)]
async fn quiz_list_handler(
    State(state): State<AppState>,
    Query(query): Query<QuizQuery>,
) -> WebResult<impl IntoResponse> {
    let quizzes = Quiz::list_published(state.pool(), query.course_id, query.lesson_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Quiz::get_resource_type(), e))?;

    Ok(Json(quizzes))
}

#[utoipa::path(
    get,
    path = "/api/v1/quizzes/{id}",
    description = "Quiz with its questions. The answer key is only shown to course staff",
    params(("id" = Uuid, Path, description = "ID of the quiz")),
    responses(
        (status = 200, description = "Quiz found", body = QuizView),
        (status = 404, description = "Quiz not found or unpublished", body = ErrorResponse),
    ),
    tag = "quizzes"
)]
async fn quiz_get_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let quiz = find_quiz(&state, id).await?;
    let course = quiz_course(&state, &quiz).await?;

    let is_staff = match ctx.maybe_user() {
        Some(user) => course_access(&state, user, &course).await?.is_instructor(),
        None => false,
    };

    if !quiz.is_published() && !is_staff {
        return Err(WebError::resource_not_found(Quiz::get_resource_type()));
    }

    let questions = quiz
        .questions(state.pool())
        .await
        .map_err(|e| WebError::resource_fetch_error(Quiz::get_resource_type(), e))?;

    let shuffle = quiz.shuffle_questions() && !is_staff;
    let mut view = QuizView::new(quiz, questions, is_staff);
    if shuffle {
        view.shuffle(&mut rand::rng());
    }

    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/api/v1/quizzes",
    request_body = QuizCreate,
    responses(
        (status = 200, description = "Quiz created", body = Quiz),
        (status = 400, description = "Invalid quiz", body = ErrorResponse),
        (status = 403, description = "Not the course instructor", body = ErrorResponse),
        (status = 404, description = "Course or lesson not found", body = ErrorResponse),
    ),
    tag = "quizzes",
    security(("cookie" = []))
)]
async fn quiz_create_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<QuizCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    if !payload.is_valid() {
        return Err(WebError::resource_bad_request(Quiz::get_resource_type()));
    }

    let course = Course::find(state.pool(), payload.course_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(Course::get_resource_type()))?;

    if !course_access(&state, user, &course).await?.is_instructor() {
        return Err(WebError::resource_forbidden(Quiz::get_resource_type()));
    }

    if let Some(lesson_id) = payload.lesson_id {
        Lesson::find(state.pool(), lesson_id)
            .await
            .map_err(|e| WebError::resource_fetch_error(Lesson::get_resource_type(), e))?
            .filter(|l| l.course_id() == course.id())
            .ok_or(WebError::resource_not_found(Lesson::get_resource_type()))?;
    }

    let quiz = Quiz::create(state.pool(), payload)
        .await
        .map_err(|e| WebError::resource_fetch_error(Quiz::get_resource_type(), e))?;

    Ok(Json(quiz))
}

#[utoipa::path(
    get,
    path = "/api/v1/quizzes/{id}/attempts",
    params(("id" = Uuid, Path, description = "ID of the quiz")),
    responses(
        (status = 200, description = "Caller's attempts, latest first", body = AttemptHistory),
        (status = 404, description = "Quiz not found", body = ErrorResponse),
    ),
    tag = "quizzes",
    security(("cookie" = []))
)]
async fn attempt_list_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let quiz = find_quiz(&state, id).await?;

    let attempts = QuizAttempt::all_for_user(state.pool(), quiz.id(), user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(QuizAttempt::get_resource_type(), e))?;

    Ok(Json(AttemptHistory::from(attempts)))
}

#[utoipa::path(
    post,
    path = "/api/v1/quizzes/{id}/attempts",
    description = "Scores submitted answers. A passing attempt on a lesson quiz completes the lesson",
    params(("id" = Uuid, Path, description = "ID of the quiz")),
    request_body = AttemptBody,
    responses(
        (status = 200, description = "Attempt recorded", body = AttemptResult),
        (status = 400, description = "No answers, or already passed a quiz without retries", body = ErrorResponse),
        (status = 403, description = "Not enrolled in this course", body = ErrorResponse),
        (status = 404, description = "Quiz not found or unpublished", body = ErrorResponse),
    ),
    tag = "quizzes",
    security(("cookie" = []))
)]
async fn attempt_submit_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AttemptBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    if payload.answers.is_empty() {
        return Err(WebError::resource_bad_request_because(
            QuizAttempt::get_resource_type(),
            "Answers are required",
        ));
    }

    let quiz = find_quiz(&state, id).await?;
    if !quiz.is_published() {
        return Err(WebError::resource_not_found(Quiz::get_resource_type()));
    }

    let enrollment = Enrollment::find_active(state.pool(), user.user_id(), quiz.course_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Enrollment::get_resource_type(), e))?
        .ok_or(WebError::resource_forbidden_because(
            Quiz::get_resource_type(),
            "Not enrolled in this course",
        ))?;

    let (previous, questions) = tokio::try_join!(
        QuizAttempt::all_for_user(state.pool(), quiz.id(), user.user_id()),
        quiz.questions(state.pool()),
    )
    .map_err(|e| WebError::resource_fetch_error(QuizAttempt::get_resource_type(), e))?;

    if !quiz.allow_retry() && previous.iter().any(QuizAttempt::passed) {
        return Err(WebError::resource_bad_request_because(
            QuizAttempt::get_resource_type(),
            "Quiz already passed and retries are not allowed",
        ));
    }

    let result = score_attempt(&questions, &payload.answers, quiz.passing_score());
    let record = || {
        QuizAttempt::record(
            state.pool(),
            quiz.id(),
            user.user_id(),
            &payload.answers,
            result,
            payload.started_at,
        )
    };
    let attempt = match record().await {
        // numbering raced with a concurrent attempt, the retry picks the next free number
        Err(e) if e.is_unique_violation() => record().await,
        other => other,
    }
    .map_err(|e| {
        WebError::resource_write_error(
            QuizAttempt::get_resource_type(),
            e,
            "Another attempt for this quiz is in progress",
        )
    })?;

    tracing::debug!("quiz {} attempt scored {}", quiz.id(), result.score);

    let lesson_completion = match quiz.lesson_id().filter(|_| result.passed) {
        Some(lesson_id) => {
            let lesson = Lesson::find(state.pool(), lesson_id)
                .await
                .map_err(|e| WebError::resource_fetch_error(Lesson::get_resource_type(), e))?;
            match lesson {
                Some(lesson) => Some(
                    completion::complete_lesson(state.pool(), state.issuer(), enrollment, &lesson)
                        .await
                        .map_err(|e| WebError::resource_fetch_error(Lesson::get_resource_type(), e))?,
                ),
                None => None,
            }
        }
        None => None,
    };

    Ok(Json(AttemptResult {
        attempt,
        result,
        lesson_completion,
    }))
}
