use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    model::{
        ResourceTyped,
        entity::{Bookmark, BookmarkRow},
    },
    web::{AppState, RequestContext, WebError, WebResult, error::ErrorResponse, middlewares, routes::lessons::enrolled_lesson},
};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct BookmarkQuery {
    course_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct BookmarkBody {
    pub lesson_id: Uuid,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(bookmark_list_handler).post(bookmark_create_handler))
        .route("/{lesson_id}", delete(bookmark_delete_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/v1/bookmarks",
    params(BookmarkQuery),
    responses(
        (status = 200, description = "Caller's bookmarks, newest first", body = Vec<BookmarkRow>),
        (status = 401, description = "Not signed in", body = ErrorResponse),
    ),
    tag = "bookmarks",
    security(("cookie" = []))
)]
async fn bookmark_list_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(query): Query<BookmarkQuery>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let rows = BookmarkRow::all_for_user(state.pool(), user.user_id(), query.course_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Bookmark::get_resource_type(), e))?;

    Ok(Json(rows))
}

#[utoipa::path(
    post,
    path = "/api/v1/bookmarks",
    request_body = BookmarkBody,
    responses(
        (status = 200, description = "Bookmark created", body = Bookmark),
        (status = 403, description = "Not enrolled in this course", body = ErrorResponse),
        (status = 404, description = "Lesson not found", body = ErrorResponse),
        (status = 409, description = "Lesson already bookmarked", body = ErrorResponse),
    ),
    tag = "bookmarks",
    security(("cookie" = []))
)]
async fn bookmark_create_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<BookmarkBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let (lesson, _) = enrolled_lesson(&state, user, payload.lesson_id).await?;

    let bookmark = Bookmark::create(state.pool(), user.user_id(), &lesson)
        .await
        .map_err(|e| {
            WebError::resource_write_error(Bookmark::get_resource_type(), e, "Lesson already bookmarked")
        })?;

    Ok(Json(bookmark))
}

#[utoipa::path(
    delete,
    path = "/api/v1/bookmarks/{lesson_id}",
    params(("lesson_id" = Uuid, Path, description = "Bookmarked lesson")),
    responses(
        (status = 200, description = "Bookmark removed"),
        (status = 404, description = "Bookmark not found", body = ErrorResponse),
    ),
    tag = "bookmarks",
    security(("cookie" = []))
)]
async fn bookmark_delete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(lesson_id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let removed = Bookmark::delete(state.pool(), user.user_id(), lesson_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Bookmark::get_resource_type(), e))?;

    if removed == 0 {
        return Err(WebError::resource_not_found(Bookmark::get_resource_type()));
    }

    Ok(StatusCode::OK)
}
