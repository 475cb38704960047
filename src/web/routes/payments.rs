use axum::{
    Json, Router,
    extract::State,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    model::{
        CrudRepository, ResourceTyped,
        entity::{Course, Enrollment, Payment, PaymentHistoryRow, UserEntity},
    },
    payments::{CheckoutItem, CheckoutRequest, CheckoutSession},
    web::{AppState, RequestContext, WebError, WebResult, error::ErrorResponse, middlewares},
};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CheckoutBody {
    #[serde(default)]
    pub course_ids: Vec<Uuid>,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(payment_history_handler))
        .route("/checkout", post(checkout_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

/// Distinct ids, first occurrence wins.
fn dedup_ids(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/checkout",
    request_body = CheckoutBody,
    description = "Starts a hosted checkout for paid courses. Prices are taken from the catalog",
    responses(
        (status = 200, description = "Checkout session", body = CheckoutSession),
        (status = 400, description = "No courses, or a free course in the list", body = ErrorResponse),
        (status = 404, description = "Unknown course", body = ErrorResponse),
        (status = 409, description = "Already enrolled in one of the courses", body = ErrorResponse),
        (status = 502, description = "Payment provider error", body = ErrorResponse),
    ),
    tag = "payments",
    security(("cookie" = []))
)]
async fn checkout_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<CheckoutBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let course_ids = dedup_ids(payload.course_ids);
    if course_ids.is_empty() {
        return Err(WebError::resource_bad_request_because(
            Payment::get_resource_type(),
            "No courses selected",
        ));
    }

    let found = Course::find_many(state.pool(), &course_ids)
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?;

    // keep the requested order for line items
    let mut courses = Vec::with_capacity(course_ids.len());
    for id in &course_ids {
        let course = found
            .iter()
            .find(|c| c.id() == *id && c.is_published())
            .ok_or(WebError::resource_not_found(Course::get_resource_type()))?;
        if course.is_free_to_enroll() {
            return Err(WebError::resource_bad_request_because(
                Payment::get_resource_type(),
                format!("\"{}\" is free, enroll directly", course.title()),
            ));
        }
        courses.push(course.clone());
    }

    let owned = Enrollment::owned_course_ids(state.pool(), user.user_id(), &course_ids)
        .await
        .map_err(|e| WebError::resource_fetch_error(Enrollment::get_resource_type(), e))?;
    if !owned.is_empty() {
        return Err(WebError::resource_conflict(
            Enrollment::get_resource_type(),
            "Already enrolled in one of the selected courses",
        ));
    }

    let customer = UserEntity::find_by_id(state.pool(), user, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?
        .ok_or(WebError::auth_required())?;

    let request = CheckoutRequest {
        user_id: user.user_id(),
        customer_email: customer.email().to_string(),
        items: courses
            .iter()
            .map(|course| CheckoutItem {
                course_id: course.id(),
                name: course.title().to_string(),
                unit_amount_cents: course.price_cents(),
                currency: course.currency().to_lowercase(),
            })
            .collect(),
    };

    let session = state
        .payments()
        .create_checkout_session(&request)
        .await
        .map_err(WebError::server_payment_error)?;

    Payment::create_pending(state.pool(), user.user_id(), &courses, &session.id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Payment::get_resource_type(), e))?;

    tracing::info!(
        "checkout session {} opened for {} course(s)",
        session.id,
        courses.len()
    );
    Ok(Json(session))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments",
    responses(
        (status = 200, description = "Caller's payments, newest first", body = Vec<PaymentHistoryRow>),
        (status = 401, description = "Not signed in", body = ErrorResponse),
    ),
    tag = "payments",
    security(("cookie" = []))
)]
async fn payment_history_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let rows = PaymentHistoryRow::all_for_user(state.pool(), user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Payment::get_resource_type(), e))?;

    Ok(Json(rows))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dedup_ids_test() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(dedup_ids(vec![a, b, a, a]), vec![a, b]);
        assert!(dedup_ids(Vec::new()).is_empty());
    }
}
