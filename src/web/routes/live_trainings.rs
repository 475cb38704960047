use axum::{
    Json, Router,
    extract::{Path, Query, State},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    model::{
        PageInfo, ResourceTyped,
        entity::{LiveTraining, LiveTrainingCreate, LiveTrainingFilter, LiveTrainingRow, LiveTrainingUpdate},
    },
    web::{AppState, AuthenticatedUser, RequestContext, WebError, WebResult, error::ErrorResponse, middlewares},
};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct LiveTrainingQuery {
    course_id: Option<Uuid>,
    status: Option<String>,
    #[serde(default)]
    upcoming: bool,
    page: Option<i64>,
    limit: Option<i64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LiveTrainingPage {
    trainings: Vec<LiveTrainingRow>,
    pagination: PageInfo,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LiveTrainingDetails {
    #[serde(flatten)]
    training: LiveTrainingRow,
    is_registered: bool,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegistrationBody {
    /// `register` or `unregister`
    pub action: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RegistrationStatus {
    is_registered: bool,
    registered_count: i64,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(training_list_handler).post(training_create_handler))
        .route(
            "/{id}",
            get(training_get_handler)
                .patch(training_update_handler)
                .delete(training_cancel_handler),
        )
        .route("/{id}/registration", post(training_registration_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

async fn find_training(state: &AppState, id: Uuid) -> WebResult<LiveTraining> {
    LiveTraining::find_by_id(state.pool(), id)
        .await
        .map_err(|e| WebError::resource_fetch_error(LiveTraining::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(LiveTraining::get_resource_type()))
}

fn hosted_training(user: &AuthenticatedUser, training: &LiveTraining) -> WebResult<()> {
    if user.is_admin() || training.instructor_id() == user.user_id() {
        Ok(())
    } else {
        Err(WebError::resource_forbidden(LiveTraining::get_resource_type()))
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/live-trainings",
    params(LiveTrainingQuery),
    responses(
        (status = 200, description = "Non-cancelled trainings, soonest first", body = LiveTrainingPage),
    ),
    tag = "live-trainings"
)]
async fn training_list_handler(
    State(state): State<AppState>,
    Query(query): Query<LiveTrainingQuery>,
) -> WebResult<impl IntoResponse> {
    let (page, limit, offset) = PageInfo::window(query.page, query.limit);
    let filter = LiveTrainingFilter {
        course_id: query.course_id,
        status: query.status,
        upcoming: query.upcoming,
    };

    let (trainings, total) = LiveTrainingRow::page(state.pool(), &filter, limit, offset)
        .await
        .map_err(|e| WebError::resource_fetch_error(LiveTraining::get_resource_type(), e))?;

    Ok(Json(LiveTrainingPage {
        trainings,
        pagination: PageInfo::new(page, limit, total),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/live-trainings/{id}",
    params(("id" = Uuid, Path, description = "ID of the training")),
    responses(
        (status = 200, description = "Training with registration state", body = LiveTrainingDetails),
        (status = 404, description = "Training not found", body = ErrorResponse),
    ),
    tag = "live-trainings"
)]
async fn training_get_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let training = LiveTrainingRow::find_by_id(state.pool(), id)
        .await
        .map_err(|e| WebError::resource_fetch_error(LiveTraining::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(LiveTraining::get_resource_type()))?;

    let is_registered = match ctx.maybe_user() {
        Some(user) => LiveTraining::is_registered(state.pool(), id, user.user_id())
            .await
            .map_err(|e| WebError::resource_fetch_error(LiveTraining::get_resource_type(), e))?,
        None => false,
    };

    Ok(Json(LiveTrainingDetails {
        training,
        is_registered,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/live-trainings",
    request_body = LiveTrainingCreate,
    responses(
        (status = 200, description = "Training scheduled", body = LiveTraining),
        (status = 400, description = "Missing fields or end before start", body = ErrorResponse),
        (status = 403, description = "Not an instructor", body = ErrorResponse),
    ),
    tag = "live-trainings",
    security(("cookie" = []))
)]
async fn training_create_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<LiveTrainingCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    if !user.can_author() {
        return Err(WebError::resource_forbidden(LiveTraining::get_resource_type()));
    }
    payload
        .validate()
        .map_err(|reason| WebError::resource_bad_request_because(LiveTraining::get_resource_type(), reason))?;

    let training = LiveTraining::create(state.pool(), user.user_id(), payload)
        .await
        .map_err(|e| WebError::resource_fetch_error(LiveTraining::get_resource_type(), e))?;

    tracing::info!("live training {} scheduled", training.id());
    Ok(Json(training))
}

#[utoipa::path(
    patch,
    path = "/api/v1/live-trainings/{id}",
    params(("id" = Uuid, Path, description = "ID of the training")),
    request_body = LiveTrainingUpdate,
    responses(
        (status = 200, description = "Training updated", body = LiveTraining),
        (status = 400, description = "Invalid values", body = ErrorResponse),
        (status = 403, description = "Not the host", body = ErrorResponse),
        (status = 404, description = "Training not found", body = ErrorResponse),
    ),
    tag = "live-trainings",
    security(("cookie" = []))
)]
async fn training_update_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LiveTrainingUpdate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let training = find_training(&state, id).await?;
    hosted_training(user, &training)?;

    payload
        .validate(&training)
        .map_err(|reason| WebError::resource_bad_request_because(LiveTraining::get_resource_type(), reason))?;

    let training = training
        .update(state.pool(), payload)
        .await
        .map_err(|e| WebError::resource_fetch_error(LiveTraining::get_resource_type(), e))?;

    Ok(Json(training))
}

#[utoipa::path(
    delete,
    path = "/api/v1/live-trainings/{id}",
    params(("id" = Uuid, Path, description = "ID of the training")),
    description = "Cancels the training. It stays readable by id",
    responses(
        (status = 200, description = "Training cancelled", body = LiveTraining),
        (status = 403, description = "Not the host", body = ErrorResponse),
        (status = 404, description = "Training not found", body = ErrorResponse),
    ),
    tag = "live-trainings",
    security(("cookie" = []))
)]
async fn training_cancel_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let training = find_training(&state, id).await?;
    hosted_training(user, &training)?;

    let training = training
        .cancel(state.pool())
        .await
        .map_err(|e| WebError::resource_fetch_error(LiveTraining::get_resource_type(), e))?;

    Ok(Json(training))
}

#[utoipa::path(
    post,
    path = "/api/v1/live-trainings/{id}/registration",
    params(("id" = Uuid, Path, description = "ID of the training")),
    request_body = RegistrationBody,
    responses(
        (status = 200, description = "Registration changed", body = RegistrationStatus),
        (status = 400, description = "Unknown action, closed or full", body = ErrorResponse),
        (status = 404, description = "Training not found", body = ErrorResponse),
        (status = 409, description = "Already registered", body = ErrorResponse),
    ),
    tag = "live-trainings",
    security(("cookie" = []))
)]
async fn training_registration_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RegistrationBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let training = find_training(&state, id).await?;
    let resource = LiveTraining::get_resource_type();

    let is_registered = match payload.action.as_str() {
        "register" => {
            if !training.accepts_registrations() {
                return Err(WebError::resource_bad_request_because(
                    resource,
                    "Registration is closed for this training",
                ));
            }
            let registered = training
                .registered_count(state.pool())
                .await
                .map_err(|e| WebError::resource_fetch_error(resource, e))?;
            if registered >= i64::from(training.max_participants()) {
                return Err(WebError::resource_bad_request_because(resource, "Training is full"));
            }
            training
                .register(state.pool(), user.user_id())
                .await
                .map_err(|e| WebError::resource_write_error(resource, e, "Already registered"))?;
            true
        }
        "unregister" => {
            training
                .unregister(state.pool(), user.user_id())
                .await
                .map_err(|e| WebError::resource_fetch_error(resource, e))?;
            false
        }
        _ => {
            return Err(WebError::resource_bad_request_because(resource, "Unknown action"));
        }
    };

    let registered_count = training
        .registered_count(state.pool())
        .await
        .map_err(|e| WebError::resource_fetch_error(resource, e))?;

    Ok(Json(RegistrationStatus {
        is_registered,
        registered_count,
    }))
}
