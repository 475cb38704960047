use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    model::{
        CourseAccess, PageInfo, ResourceTyped,
        entity::{
            Course, Discussion, DiscussionCreate, DiscussionRow, DiscussionUpdate, Reply, ReplyRow,
        },
    },
    web::{AppState, AuthenticatedUser, RequestContext, WebError, WebResult, error::ErrorResponse, middlewares},
};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct DiscussionQuery {
    course_id: Option<Uuid>,
    lesson_id: Option<Uuid>,
    page: Option<i64>,
    limit: Option<i64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DiscussionPage {
    discussions: Vec<DiscussionRow>,
    pagination: PageInfo,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DiscussionThread {
    discussion: DiscussionRow,
    replies: Vec<ReplyRow>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ReplyBody {
    pub content: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ReplyUpdateBody {
    pub content: Option<String>,
    pub is_solution: Option<bool>,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(discussion_list_handler).post(discussion_create_handler))
        .route(
            "/{id}",
            get(discussion_get_handler)
                .patch(discussion_update_handler)
                .delete(discussion_delete_handler),
        )
        .route("/{id}/replies", post(reply_create_handler))
        .route(
            "/{id}/replies/{reply_id}",
            patch(reply_update_handler).delete(reply_delete_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

async fn course_access(state: &AppState, user: &AuthenticatedUser, course_id: Uuid) -> WebResult<CourseAccess> {
    let course = Course::find(state.pool(), course_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(Course::get_resource_type()))?;

    CourseAccess::resolve(state.pool(), user, &course)
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))
}

async fn find_discussion(state: &AppState, id: Uuid) -> WebResult<Discussion> {
    Discussion::find_by_id(state.pool(), id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Discussion::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(Discussion::get_resource_type()))
}

async fn find_reply(state: &AppState, discussion: &Discussion, id: Uuid) -> WebResult<Reply> {
    Reply::find_by_id(state.pool(), id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Reply::get_resource_type(), e))?
        .filter(|r| r.discussion_id() == discussion.id())
        .ok_or(WebError::resource_not_found(Reply::get_resource_type()))
}

#[utoipa::path(
    get,
    path = "/api/v1/discussions",
    params(DiscussionQuery),
    description = "Threads of a course, pinned first then newest",
    responses(
        (status = 200, description = "Page of threads", body = DiscussionPage),
        (status = 400, description = "course_id missing", body = ErrorResponse),
    ),
    tag = "discussions",
    security(("cookie" = []))
)]
async fn discussion_list_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(query): Query<DiscussionQuery>,
) -> WebResult<impl IntoResponse> {
    ctx.user()?;
    let course_id = query.course_id.ok_or(WebError::resource_bad_request_because(
        Discussion::get_resource_type(),
        "Course ID is required",
    ))?;

    let (page, limit, offset) = PageInfo::window(query.page, query.limit);
    let (discussions, total) = DiscussionRow::page(state.pool(), course_id, query.lesson_id, limit, offset)
        .await
        .map_err(|e| WebError::resource_fetch_error(Discussion::get_resource_type(), e))?;

    Ok(Json(DiscussionPage {
        discussions,
        pagination: PageInfo::new(page, limit, total),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/discussions",
    request_body = DiscussionCreate,
    responses(
        (status = 200, description = "Thread created", body = Discussion),
        (status = 400, description = "Title or content missing", body = ErrorResponse),
        (status = 403, description = "Not enrolled in this course", body = ErrorResponse),
    ),
    tag = "discussions",
    security(("cookie" = []))
)]
async fn discussion_create_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<DiscussionCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    if !payload.is_valid() {
        return Err(WebError::resource_bad_request_because(
            Discussion::get_resource_type(),
            "Title and content are required",
        ));
    }

    if !course_access(&state, user, payload.course_id).await?.can_participate() {
        return Err(WebError::resource_forbidden_because(
            Discussion::get_resource_type(),
            "Must be enrolled to post discussions",
        ));
    }

    let discussion = Discussion::create(state.pool(), user.user_id(), payload)
        .await
        .map_err(|e| WebError::resource_fetch_error(Discussion::get_resource_type(), e))?;

    Ok(Json(discussion))
}

#[utoipa::path(
    get,
    path = "/api/v1/discussions/{id}",
    params(("id" = Uuid, Path, description = "ID of the thread")),
    responses(
        (status = 200, description = "Thread with replies, solutions first", body = DiscussionThread),
        (status = 404, description = "Thread not found", body = ErrorResponse),
    ),
    tag = "discussions",
    security(("cookie" = []))
)]
async fn discussion_get_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    ctx.user()?;
    let discussion = find_discussion(&state, id).await?;

    discussion
        .increment_views(state.pool())
        .await
        .map_err(|e| WebError::resource_fetch_error(Discussion::get_resource_type(), e))?;

    let (row, replies) = tokio::try_join!(
        DiscussionRow::find_by_id(state.pool(), discussion.id()),
        ReplyRow::all_for_discussion(state.pool(), discussion.id()),
    )
    .map_err(|e| WebError::resource_fetch_error(Discussion::get_resource_type(), e))?;

    let row = row.ok_or(WebError::resource_not_found(Discussion::get_resource_type()))?;
    Ok(Json(DiscussionThread {
        discussion: row,
        replies,
    }))
}

#[utoipa::path(
    patch,
    path = "/api/v1/discussions/{id}",
    params(("id" = Uuid, Path, description = "ID of the thread")),
    request_body = DiscussionUpdate,
    responses(
        (status = 200, description = "Thread updated", body = Discussion),
        (status = 400, description = "Nothing to update", body = ErrorResponse),
        (status = 403, description = "Neither author nor course staff", body = ErrorResponse),
    ),
    tag = "discussions",
    security(("cookie" = []))
)]
async fn discussion_update_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DiscussionUpdate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    if payload.is_empty() {
        return Err(WebError::resource_bad_request_because(
            Discussion::get_resource_type(),
            "No updates specified",
        ));
    }

    let discussion = find_discussion(&state, id).await?;
    let is_staff = course_access(&state, user, discussion.course_id()).await?.is_instructor();
    let is_author = discussion.user_id() == user.user_id();

    if !(is_author || is_staff) || (payload.touches_moderation() && !is_staff) {
        return Err(WebError::resource_forbidden(Discussion::get_resource_type()));
    }

    let updated = discussion
        .update(state.pool(), payload)
        .await
        .map_err(|e| WebError::resource_fetch_error(Discussion::get_resource_type(), e))?;

    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/discussions/{id}",
    params(("id" = Uuid, Path, description = "ID of the thread")),
    responses(
        (status = 200, description = "Thread deleted"),
        (status = 403, description = "Neither author nor course staff", body = ErrorResponse),
        (status = 404, description = "Thread not found", body = ErrorResponse),
    ),
    tag = "discussions",
    security(("cookie" = []))
)]
async fn discussion_delete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let discussion = find_discussion(&state, id).await?;

    if discussion.user_id() != user.user_id()
        && !course_access(&state, user, discussion.course_id()).await?.is_instructor()
    {
        return Err(WebError::resource_forbidden(Discussion::get_resource_type()));
    }

    discussion
        .delete(state.pool())
        .await
        .map_err(|e| WebError::resource_fetch_error(Discussion::get_resource_type(), e))?;

    Ok(StatusCode::OK)
}

#[utoipa::path(
    post,
    path = "/api/v1/discussions/{id}/replies",
    params(("id" = Uuid, Path, description = "ID of the thread")),
    request_body = ReplyBody,
    responses(
        (status = 200, description = "Reply posted", body = Reply),
        (status = 400, description = "Content missing", body = ErrorResponse),
        (status = 403, description = "Not enrolled in this course", body = ErrorResponse),
    ),
    tag = "discussions",
    security(("cookie" = []))
)]
async fn reply_create_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReplyBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    if payload.content.trim().is_empty() {
        return Err(WebError::resource_bad_request_because(
            Reply::get_resource_type(),
            "Content is required",
        ));
    }

    let discussion = find_discussion(&state, id).await?;
    let access = course_access(&state, user, discussion.course_id()).await?;
    if !access.can_participate() {
        return Err(WebError::resource_forbidden_because(
            Reply::get_resource_type(),
            "Must be enrolled to reply",
        ));
    }

    let reply = Reply::create(
        state.pool(),
        &discussion,
        user.user_id(),
        &payload.content,
        access.is_instructor(),
    )
    .await
    .map_err(|e| WebError::resource_fetch_error(Reply::get_resource_type(), e))?;

    Ok(Json(reply))
}

#[utoipa::path(
    patch,
    path = "/api/v1/discussions/{id}/replies/{reply_id}",
    params(
        ("id" = Uuid, Path, description = "ID of the thread"),
        ("reply_id" = Uuid, Path, description = "ID of the reply"),
    ),
    request_body = ReplyUpdateBody,
    description = "Edits a reply, or marks it as the accepted solution of the thread",
    responses(
        (status = 200, description = "Reply updated", body = Reply),
        (status = 400, description = "Nothing to update", body = ErrorResponse),
        (status = 403, description = "Not allowed to change this field", body = ErrorResponse),
        (status = 404, description = "Reply not found", body = ErrorResponse),
    ),
    tag = "discussions",
    security(("cookie" = []))
)]
async fn reply_update_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path((id, reply_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<ReplyUpdateBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    if payload.content.is_none() && payload.is_solution.is_none() {
        return Err(WebError::resource_bad_request_because(
            Reply::get_resource_type(),
            "No updates specified",
        ));
    }

    let discussion = find_discussion(&state, id).await?;
    let mut reply = find_reply(&state, &discussion, reply_id).await?;

    if let Some(content) = payload.content.as_deref() {
        if reply.user_id() != user.user_id() {
            return Err(WebError::resource_forbidden_because(
                Reply::get_resource_type(),
                "Only the author can edit a reply",
            ));
        }
        if content.trim().is_empty() {
            return Err(WebError::resource_bad_request_because(
                Reply::get_resource_type(),
                "Content is required",
            ));
        }
        reply = reply
            .update_content(state.pool(), content)
            .await
            .map_err(|e| WebError::resource_fetch_error(Reply::get_resource_type(), e))?;
    }

    if let Some(is_solution) = payload.is_solution {
        let may_accept = discussion.user_id() == user.user_id()
            || course_access(&state, user, discussion.course_id()).await?.is_instructor();
        if !may_accept {
            return Err(WebError::resource_forbidden_because(
                Reply::get_resource_type(),
                "Only the thread author or an instructor can mark solutions",
            ));
        }
        reply = reply
            .set_solution(state.pool(), is_solution)
            .await
            .map_err(|e| WebError::resource_fetch_error(Reply::get_resource_type(), e))?;
    }

    Ok(Json(reply))
}

#[utoipa::path(
    delete,
    path = "/api/v1/discussions/{id}/replies/{reply_id}",
    params(
        ("id" = Uuid, Path, description = "ID of the thread"),
        ("reply_id" = Uuid, Path, description = "ID of the reply"),
    ),
    responses(
        (status = 200, description = "Reply deleted"),
        (status = 403, description = "Neither author nor course staff", body = ErrorResponse),
        (status = 404, description = "Reply not found", body = ErrorResponse),
    ),
    tag = "discussions",
    security(("cookie" = []))
)]
async fn reply_delete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path((id, reply_id)): Path<(Uuid, Uuid)>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let discussion = find_discussion(&state, id).await?;
    let reply = find_reply(&state, &discussion, reply_id).await?;

    if reply.user_id() != user.user_id()
        && !course_access(&state, user, discussion.course_id()).await?.is_instructor()
    {
        return Err(WebError::resource_forbidden(Reply::get_resource_type()));
    }

    reply
        .delete(state.pool())
        .await
        .map_err(|e| WebError::resource_fetch_error(Reply::get_resource_type(), e))?;

    Ok(StatusCode::OK)
}
