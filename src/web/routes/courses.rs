use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use std::collections::HashSet;

use serde::Deserialize;
use uuid::Uuid;

use crate::{
    model::{
        CrudRepository, Page, PaginatableRepository, ResourceTyped, check_access,
        entity::{
            CatalogFilter, CatalogRow, Course, CourseCreate, CourseModule, CourseModuleCreate,
            Enrollment, Lesson, LessonCreate,
        },
    },
    web::{
        AppState, AuthenticatedUser, RequestContext, WebError, WebResult,
        dto::courses::CourseDetailsResponse, error::ErrorResponse, middlewares,
        routes::PaginationQuery,
    },
};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct CatalogQuery {
    category: Option<String>,
    level: Option<String>,
    search: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ModuleBody {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub order_index: Option<i32>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LessonBody {
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub content_type: Option<String>,
    pub video_url: Option<String>,
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub is_free_preview: bool,
    pub order_index: Option<i32>,
    /// Moves the lesson to another module of the same course on update.
    pub module_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LessonOrderBody {
    /// Lesson ids of the module in their new order.
    pub lesson_ids: Vec<Uuid>,
}

impl LessonBody {
    fn into_create(self, course_id: Uuid, module_id: Uuid) -> LessonCreate {
        LessonCreate {
            course_id,
            module_id: self.module_id.unwrap_or(module_id),
            title: self.title,
            content: self.content,
            content_type: self.content_type,
            video_url: self.video_url,
            duration_minutes: self.duration_minutes,
            is_free_preview: self.is_free_preview,
            order_index: self.order_index,
        }
    }
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(catalog_handler).post(course_create_handler))
        .route("/mine", get(course_mine_handler))
        .route(
            "/{id}",
            get(course_details_handler)
                .put(course_update_handler)
                .delete(course_delete_handler),
        )
        .route("/{id}/modules", post(module_create_handler))
        .route(
            "/{id}/modules/{module_id}",
            put(module_update_handler).delete(module_delete_handler),
        )
        .route("/{id}/modules/{module_id}/lessons", post(lesson_create_handler))
        .route(
            "/{id}/modules/{module_id}/lessons/reorder",
            put(lesson_reorder_handler),
        )
        .route(
            "/{id}/lessons/{lesson_id}",
            put(lesson_update_handler).delete(lesson_delete_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

/// Loads a course the actor may edit: its instructor or an admin.
async fn editable_course(state: &AppState, user: &AuthenticatedUser, id: Uuid) -> WebResult<Course> {
    let course = Course::find_by_id(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(Course::get_resource_type()))?;

    check_access(state.pool(), user, &course, Some(user.user_id()))
        .await
        .map_err(|e| WebError::resource_access_error(Course::get_resource_type(), e))?;

    Ok(course)
}

#[utoipa::path(
    get,
    path = "/api/v1/courses",
    params(CatalogQuery),
    description = "Published courses with instructor and aggregate statistics",
    responses(
        (status = 200, description = "Catalog page", body = Page<CatalogRow>),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "courses"
)]
async fn catalog_handler(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> WebResult<impl IntoResponse> {
    let (limit, offset) = PaginationQuery {
        limit: query.limit,
        offset: query.offset,
    }
    .window();
    let filter = CatalogFilter {
        category: query.category,
        level: query.level,
        search: query.search,
    };

    let (rows, total) = CatalogRow::search(state.pool(), &filter, limit, offset)
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?;

    Ok(Json(Page::new(rows, total, limit, offset)))
}

#[utoipa::path(
    get,
    path = "/api/v1/courses/mine",
    params(PaginationQuery),
    description = "Courses authored by the caller, all courses for admins",
    responses(
        (status = 200, description = "Authored courses", body = Page<Course>),
        (status = 401, description = "Not signed in", body = ErrorResponse),
    ),
    tag = "courses",
    security(("cookie" = []))
)]
async fn course_mine_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(page): Query<PaginationQuery>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let (limit, offset) = page.window();
    let courses = Course::page(state.pool(), user, limit, offset)
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?;

    Ok(Json(courses))
}

#[utoipa::path(
    get,
    path = "/api/v1/courses/{slug}",
    description = "Course with ordered modules and lessons, plus the caller's enrollment",
    responses(
        (status = 200, description = "Course details", body = CourseDetailsResponse),
        (status = 404, description = "Course not found or not published", body = ErrorResponse),
    ),
    tag = "courses"
)]
async fn course_details_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> WebResult<impl IntoResponse> {
    let course = Course::find_by_slug(state.pool(), &slug)
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?
        .filter(|c| c.visible_to(ctx.maybe_user()))
        .ok_or(WebError::resource_not_found(Course::get_resource_type()))?;

    let (modules, lessons) = tokio::try_join!(
        CourseModule::all_by_course(state.pool(), course.id()),
        Lesson::all_by_course(state.pool(), course.id()),
    )
    .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?;

    let enrollment = match ctx.maybe_user() {
        Some(user) => Enrollment::find_active(state.pool(), user.user_id(), course.id())
            .await
            .map_err(|e| WebError::resource_fetch_error(Enrollment::get_resource_type(), e))?,
        None => None,
    };

    Ok(Json(CourseDetailsResponse::new(course, modules, &lessons, enrollment)))
}

#[utoipa::path(
    post,
    path = "/api/v1/courses",
    request_body = CourseCreate,
    responses(
        (status = 200, description = "Course created", body = Course),
        (status = 400, description = "Invalid course", body = ErrorResponse),
        (status = 403, description = "Only instructors may create courses", body = ErrorResponse),
    ),
    tag = "courses",
    security(("cookie" = []))
)]
async fn course_create_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<CourseCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    if !user.can_author() {
        return Err(WebError::resource_forbidden(Course::get_resource_type()));
    }
    if !payload.is_valid() {
        return Err(WebError::resource_bad_request(Course::get_resource_type()));
    }

    let course = Course::create(state.pool(), user, payload)
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?;

    tracing::info!("course {} created as `{}`", course.id(), course.slug());
    Ok(Json(course))
}

#[utoipa::path(
    put,
    path = "/api/v1/courses/{id}",
    request_body = CourseCreate,
    responses(
        (status = 200, description = "Course updated", body = Course),
        (status = 403, description = "Not the course instructor", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
    ),
    tag = "courses",
    security(("cookie" = []))
)]
async fn course_update_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CourseCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    if !payload.is_valid() {
        return Err(WebError::resource_bad_request(Course::get_resource_type()));
    }
    let course = editable_course(&state, user, id).await?;

    let updated = course
        .update(state.pool(), user, payload)
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?;

    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/courses/{id}",
    responses(
        (status = 200, description = "Course deleted"),
        (status = 403, description = "Not the course instructor", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
    ),
    tag = "courses",
    security(("cookie" = []))
)]
async fn course_delete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let course = editable_course(&state, user, id).await?;

    course
        .delete(state.pool(), user)
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?;

    Ok(StatusCode::OK)
}

#[utoipa::path(
    post,
    path = "/api/v1/courses/{id}/modules",
    request_body = ModuleBody,
    responses(
        (status = 200, description = "Module created", body = CourseModule),
        (status = 400, description = "Title missing", body = ErrorResponse),
        (status = 403, description = "Not the course instructor", body = ErrorResponse),
    ),
    tag = "courses",
    security(("cookie" = []))
)]
async fn module_create_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ModuleBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    if payload.title.trim().is_empty() {
        return Err(WebError::resource_bad_request(CourseModule::get_resource_type()));
    }
    let course = editable_course(&state, user, id).await?;

    let module = CourseModule::create(
        state.pool(),
        user,
        CourseModuleCreate {
            course_id: course.id(),
            title: payload.title,
            description: payload.description,
            order_index: payload.order_index,
        },
    )
    .await
    .map_err(|e| WebError::resource_fetch_error(CourseModule::get_resource_type(), e))?;

    Ok(Json(module))
}

async fn course_module(
    state: &AppState,
    user: &AuthenticatedUser,
    course: &Course,
    module_id: Uuid,
) -> WebResult<CourseModule> {
    CourseModule::find_by_id(state.pool(), user, module_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(CourseModule::get_resource_type(), e))?
        .filter(|m| m.course_id() == course.id())
        .ok_or(WebError::resource_not_found(CourseModule::get_resource_type()))
}

#[utoipa::path(
    put,
    path = "/api/v1/courses/{id}/modules/{module_id}",
    request_body = ModuleBody,
    responses(
        (status = 200, description = "Module updated", body = CourseModule),
        (status = 404, description = "Module not found", body = ErrorResponse),
    ),
    tag = "courses",
    security(("cookie" = []))
)]
async fn module_update_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path((id, module_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<ModuleBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    if payload.title.trim().is_empty() {
        return Err(WebError::resource_bad_request(CourseModule::get_resource_type()));
    }
    let course = editable_course(&state, user, id).await?;
    let module = course_module(&state, user, &course, module_id).await?;

    let updated = module
        .update(
            state.pool(),
            user,
            CourseModuleCreate {
                course_id: course.id(),
                title: payload.title,
                description: payload.description,
                order_index: payload.order_index,
            },
        )
        .await
        .map_err(|e| WebError::resource_fetch_error(CourseModule::get_resource_type(), e))?;

    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/courses/{id}/modules/{module_id}",
    responses(
        (status = 200, description = "Module and its lessons deleted"),
        (status = 404, description = "Module not found", body = ErrorResponse),
    ),
    tag = "courses",
    security(("cookie" = []))
)]
async fn module_delete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path((id, module_id)): Path<(Uuid, Uuid)>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let course = editable_course(&state, user, id).await?;
    let module = course_module(&state, user, &course, module_id).await?;

    module
        .delete(state.pool(), user)
        .await
        .map_err(|e| WebError::resource_fetch_error(CourseModule::get_resource_type(), e))?;

    Ok(StatusCode::OK)
}

#[utoipa::path(
    post,
    path = "/api/v1/courses/{id}/modules/{module_id}/lessons",
    request_body = LessonBody,
    responses(
        (status = 200, description = "Lesson created", body = Lesson),
        (status = 400, description = "Invalid lesson", body = ErrorResponse),
        (status = 404, description = "Module not found", body = ErrorResponse),
    ),
    tag = "courses",
    security(("cookie" = []))
)]
async fn lesson_create_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path((id, module_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<LessonBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let course = editable_course(&state, user, id).await?;
    let module = course_module(&state, user, &course, module_id).await?;

    let data = LessonBody {
        module_id: None,
        ..payload
    }
    .into_create(course.id(), module.id());
    if !data.is_valid() {
        return Err(WebError::resource_bad_request(Lesson::get_resource_type()));
    }

    let lesson = Lesson::create(state.pool(), user, data)
        .await
        .map_err(|e| WebError::resource_fetch_error(Lesson::get_resource_type(), e))?;

    Ok(Json(lesson))
}

async fn course_lesson(
    state: &AppState,
    user: &AuthenticatedUser,
    course: &Course,
    lesson_id: Uuid,
) -> WebResult<Lesson> {
    Lesson::find_by_id(state.pool(), user, lesson_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Lesson::get_resource_type(), e))?
        .filter(|l| l.course_id() == course.id())
        .ok_or(WebError::resource_not_found(Lesson::get_resource_type()))
}

#[utoipa::path(
    put,
    path = "/api/v1/courses/{id}/lessons/{lesson_id}",
    request_body = LessonBody,
    responses(
        (status = 200, description = "Lesson updated", body = Lesson),
        (status = 400, description = "Invalid lesson", body = ErrorResponse),
        (status = 404, description = "Lesson or target module not found", body = ErrorResponse),
    ),
    tag = "courses",
    security(("cookie" = []))
)]
async fn lesson_update_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path((id, lesson_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<LessonBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let course = editable_course(&state, user, id).await?;
    let lesson = course_lesson(&state, user, &course, lesson_id).await?;

    if let Some(target) = payload.module_id {
        course_module(&state, user, &course, target).await?;
    }

    let data = payload.into_create(course.id(), lesson.module_id());
    if !data.is_valid() {
        return Err(WebError::resource_bad_request(Lesson::get_resource_type()));
    }

    let updated = lesson
        .update(state.pool(), user, data)
        .await
        .map_err(|e| WebError::resource_fetch_error(Lesson::get_resource_type(), e))?;

    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/courses/{id}/lessons/{lesson_id}",
    responses(
        (status = 200, description = "Lesson deleted"),
        (status = 404, description = "Lesson not found", body = ErrorResponse),
    ),
    tag = "courses",
    security(("cookie" = []))
)]
async fn lesson_delete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path((id, lesson_id)): Path<(Uuid, Uuid)>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let course = editable_course(&state, user, id).await?;
    let lesson = course_lesson(&state, user, &course, lesson_id).await?;

    lesson
        .delete(state.pool(), user)
        .await
        .map_err(|e| WebError::resource_fetch_error(Lesson::get_resource_type(), e))?;

    Ok(StatusCode::OK)
}

#[utoipa::path(
    put,
    path = "/api/v1/courses/{id}/modules/{module_id}/lessons/reorder",
    request_body = LessonOrderBody,
    responses(
        (status = 200, description = "Lessons of the module in their new order", body = Vec<Lesson>),
        (status = 400, description = "Empty or repeated ids, or a lesson from another module", body = ErrorResponse),
        (status = 404, description = "Module not found", body = ErrorResponse),
    ),
    tag = "courses",
    security(("cookie" = []))
)]
async fn lesson_reorder_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path((id, module_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<LessonOrderBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let course = editable_course(&state, user, id).await?;
    let module = course_module(&state, user, &course, module_id).await?;

    let unique: HashSet<Uuid> = payload.lesson_ids.iter().copied().collect();
    if unique.is_empty() || unique.len() != payload.lesson_ids.len() {
        return Err(WebError::resource_bad_request_because(
            Lesson::get_resource_type(),
            "lesson_ids must list each lesson once",
        ));
    }

    let current = Lesson::all_by_module(state.pool(), module.id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Lesson::get_resource_type(), e))?;
    let known: HashSet<Uuid> = current.iter().map(Lesson::id).collect();
    if !unique.is_subset(&known) {
        return Err(WebError::resource_bad_request_because(
            Lesson::get_resource_type(),
            "Every lesson must belong to this module",
        ));
    }

    let lessons = Lesson::reorder(state.pool(), module.id(), &payload.lesson_ids)
        .await
        .map_err(|e| WebError::resource_fetch_error(Lesson::get_resource_type(), e))?;
    tracing::debug!("module {} reordered {} lessons", module.id(), lessons.len());

    Ok(Json(lessons))
}
