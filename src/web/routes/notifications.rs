use axum::{
    Json, Router,
    extract::{Query, State},
    middleware,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    model::{
        ResourceTyped,
        entity::{Notification, NotificationFilter},
    },
    web::{AppState, RequestContext, WebError, WebResult, error::ErrorResponse, middlewares},
};

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 50;

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct NotificationQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    #[serde(default)]
    unread_only: bool,
    kind: Option<String>,
}

impl NotificationQuery {
    fn window(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        (limit, self.offset.unwrap_or(0).max(0))
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct NotificationList {
    notifications: Vec<Notification>,
    total: i64,
    unread_count: i64,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct NotificationUpdateBody {
    #[serde(default)]
    pub mark_all_read: bool,
    pub notification_ids: Option<Vec<Uuid>>,
    pub mark_read: Option<bool>,
    pub mark_archived: Option<bool>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct NotificationDeleteQuery {
    id: Option<Uuid>,
    #[serde(default)]
    delete_all: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct Affected {
    affected: u64,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route(
            "/",
            get(notification_list_handler)
                .patch(notification_update_handler)
                .delete(notification_delete_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

fn no_updates() -> WebError {
    WebError::resource_bad_request_because(Notification::get_resource_type(), "No updates specified")
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    params(NotificationQuery),
    responses(
        (status = 200, description = "Non-archived notifications, newest first", body = NotificationList),
        (status = 401, description = "Not signed in", body = ErrorResponse),
    ),
    tag = "notifications",
    security(("cookie" = []))
)]
async fn notification_list_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let (limit, offset) = query.window();
    let filter = NotificationFilter {
        unread_only: query.unread_only,
        kind: query.kind,
    };

    let ((notifications, total), unread_count) = tokio::try_join!(
        Notification::list(state.pool(), user.user_id(), &filter, limit, offset),
        Notification::unread_count(state.pool(), user.user_id()),
    )
    .map_err(|e| WebError::resource_fetch_error(Notification::get_resource_type(), e))?;

    Ok(Json(NotificationList {
        notifications,
        total,
        unread_count,
    }))
}

#[utoipa::path(
    patch,
    path = "/api/v1/notifications",
    request_body = NotificationUpdateBody,
    description = "Marks all as read, or applies read/archive flags to the listed notifications",
    responses(
        (status = 200, description = "Number of notifications changed", body = Affected),
        (status = 400, description = "No updates specified", body = ErrorResponse),
    ),
    tag = "notifications",
    security(("cookie" = []))
)]
async fn notification_update_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<NotificationUpdateBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let affected = if payload.mark_all_read {
        Notification::mark_all_read(state.pool(), user.user_id()).await
    } else {
        let ids = payload
            .notification_ids
            .filter(|ids| !ids.is_empty())
            .ok_or_else(no_updates)?;
        if payload.mark_read.is_none() && payload.mark_archived.is_none() {
            return Err(no_updates());
        }
        Notification::update_many(
            state.pool(),
            user.user_id(),
            &ids,
            payload.mark_read,
            payload.mark_archived,
        )
        .await
    }
    .map_err(|e| WebError::resource_fetch_error(Notification::get_resource_type(), e))?;

    Ok(Json(Affected { affected }))
}

#[utoipa::path(
    delete,
    path = "/api/v1/notifications",
    params(NotificationDeleteQuery),
    description = "Deletes one notification, or every archived one with `delete_all=true`",
    responses(
        (status = 200, description = "Number of notifications removed", body = Affected),
        (status = 400, description = "Neither id nor delete_all given", body = ErrorResponse),
    ),
    tag = "notifications",
    security(("cookie" = []))
)]
async fn notification_delete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(query): Query<NotificationDeleteQuery>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let affected = match (query.id, query.delete_all) {
        (Some(id), _) => Notification::delete_one(state.pool(), user.user_id(), id).await,
        (None, true) => Notification::delete_archived(state.pool(), user.user_id()).await,
        (None, false) => {
            return Err(WebError::resource_bad_request_because(
                Notification::get_resource_type(),
                "Notification ID or delete_all is required",
            ));
        }
    }
    .map_err(|e| WebError::resource_fetch_error(Notification::get_resource_type(), e))?;

    Ok(Json(Affected { affected }))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn notification_window_test() {
        let query = NotificationQuery {
            limit: Some(500),
            offset: None,
            unread_only: false,
            kind: None,
        };
        assert_eq!(query.window(), (50, 0));

        let query = NotificationQuery {
            limit: None,
            offset: Some(40),
            unread_only: true,
            kind: None,
        };
        assert_eq!(query.window(), (20, 40));
    }
}
