use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
};
use chrono::Utc;
use serde::Serialize;

use crate::{
    model::{
        DatabaseResult, ModelManager, ResourceType,
        entity::{
            Course, Enrollment, NewNotification, Notification, NotificationKind, Payment,
            PaymentStatus,
        },
    },
    payments::webhook::{CompletedSession, SIGNATURE_HEADER, WebhookEvent, verify_signature},
    web::{AppState, WebError, WebResult, error::ErrorResponse},
};

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct WebhookAck {
    received: bool,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/stripe", post(stripe_webhook_handler))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/api/v1/webhooks/stripe",
    description = "Stripe event receiver. The raw body is verified against the `stripe-signature` header",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Signature missing or invalid", body = ErrorResponse),
        (status = 500, description = "Webhook secret not configured, or handling failed", body = ErrorResponse),
    ),
    tag = "webhooks"
)]
async fn stripe_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebResult<impl IntoResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebError::resource_bad_request_because(
            ResourceType::Webhook,
            "Missing stripe-signature header",
        ))?;

    let stripe = state.config().stripe();
    let secret = stripe
        .webhook_secret()
        .ok_or(WebError::server_misconfigured("the webhook secret"))?;

    verify_signature(signature, &body, secret, stripe.tolerance_secs(), Utc::now().timestamp())
        .map_err(|e| {
            tracing::warn!("webhook signature rejected: {e}");
            WebError::resource_bad_request_because(ResourceType::Webhook, "Invalid signature")
        })?;

    let (event_id, event) = WebhookEvent::parse(&body).map_err(|e| {
        tracing::warn!("webhook payload rejected: {e}");
        WebError::resource_bad_request_because(ResourceType::Webhook, "Invalid payload")
    })?;

    tracing::info!("webhook event {event_id} received");
    handle_event(state.pool(), event)
        .await
        .map_err(|e| WebError::resource_fetch_error(ResourceType::Webhook, e))?;

    Ok(Json(WebhookAck { received: true }))
}

async fn handle_event(mm: &ModelManager, event: WebhookEvent) -> DatabaseResult<()> {
    match event {
        WebhookEvent::CheckoutCompleted(session) => complete_checkout(mm, session).await,
        WebhookEvent::PaymentSucceeded(intent) => {
            Payment::set_status_by_intent(mm, &intent.id, PaymentStatus::Completed).await?;
            Ok(())
        }
        WebhookEvent::PaymentFailed(intent) => {
            Payment::set_status_by_intent(mm, &intent.id, PaymentStatus::Failed).await?;
            Ok(())
        }
        WebhookEvent::ChargeRefunded(charge) => {
            let Some(intent) = charge.payment_intent else {
                tracing::debug!("refunded charge without payment intent");
                return Ok(());
            };
            let refunded = Payment::set_status_by_intent(mm, &intent, PaymentStatus::Refunded).await?;
            let expired = Enrollment::expire_by_payments(mm, &refunded).await?;
            tracing::info!("refund of {intent}: {} payment(s), {expired} enrollment(s) expired", refunded.len());
            Ok(())
        }
        WebhookEvent::Other(kind) => {
            tracing::debug!("ignoring webhook event {kind}");
            Ok(())
        }
    }
}

async fn complete_checkout(mm: &ModelManager, session: CompletedSession) -> DatabaseResult<()> {
    let (Some(user_id), course_ids) = (session.user_id(), session.course_ids()) else {
        tracing::warn!("checkout session {} carries no user metadata", session.id);
        return Ok(());
    };
    if course_ids.is_empty() {
        tracing::warn!("checkout session {} carries no courses", session.id);
        return Ok(());
    }

    Payment::complete_session(mm, &session.id, session.payment_intent.as_deref()).await?;
    let payments = Payment::all_for_session(mm, &session.id).await?;
    let courses = Course::find_many(mm, &course_ids).await?;

    let mut granted = Vec::new();
    for course_id in &course_ids {
        let payment_id = payments
            .iter()
            .find(|p| p.course_id() == *course_id)
            .map(Payment::id);
        if Enrollment::create_for_payment(mm, user_id, *course_id, payment_id)
            .await?
            .is_some()
        {
            granted.push(*course_id);
        }
    }

    for course in courses.iter().filter(|c| granted.contains(&c.id())) {
        Notification::push_quietly(
            mm,
            user_id,
            NewNotification {
                kind: NotificationKind::Enrollment,
                title: String::from("Enrollment confirmed"),
                message: format!("Your payment went through. You now have access to \"{}\".", course.title()),
                action_url: Some(format!("/courses/{}", course.slug())),
            },
        )
        .await;
    }

    tracing::info!(
        "checkout session {} completed, {} enrollment(s) granted",
        session.id,
        granted.len()
    );
    Ok(())
}
