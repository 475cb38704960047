use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    model::{
        ResourceTyped, check_access,
        entity::{Certificate, CertificateDetailsRow, Enrollment},
    },
    web::{AppState, RequestContext, WebError, WebResult, error::ErrorResponse, middlewares},
};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct IssueBody {
    pub enrollment_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct IssueResponse {
    certificate: Certificate,
    message: &'static str,
}

/// Public view of a certificate, as shown on the verification page.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct VerifiedCertificate {
    number: String,
    course_title: String,
    student_name: String,
    issued_at: DateTime<Utc>,
    verification_url: String,
    grade: String,
}

impl From<CertificateDetailsRow> for VerifiedCertificate {
    fn from(row: CertificateDetailsRow) -> Self {
        Self {
            number: row.certificate_number,
            course_title: row.course_title,
            student_name: row.student_name,
            issued_at: row.issued_at,
            verification_url: row.verification_url,
            grade: row.grade,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct VerificationResponse {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    certificate: Option<VerifiedCertificate>,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(certificate_list_handler).post(certificate_issue_handler))
        .route("/{id}", get(certificate_get_handler))
        .route("/verify/{number}", get(certificate_verify_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/v1/certificates",
    responses(
        (status = 200, description = "Caller's certificates, newest first", body = Vec<CertificateDetailsRow>),
        (status = 401, description = "Not signed in", body = ErrorResponse),
    ),
    tag = "certificates",
    security(("cookie" = []))
)]
async fn certificate_list_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let rows = CertificateDetailsRow::all_for_user(state.pool(), user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Certificate::get_resource_type(), e))?;

    Ok(Json(rows))
}

#[utoipa::path(
    get,
    path = "/api/v1/certificates/{id}",
    params(("id" = Uuid, Path, description = "ID of the certificate")),
    responses(
        (status = 200, description = "Certificate found", body = CertificateDetailsRow),
        (status = 404, description = "Certificate not found", body = ErrorResponse),
    ),
    tag = "certificates",
    security(("cookie" = []))
)]
async fn certificate_get_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let certificate = Certificate::find_by_id(state.pool(), id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Certificate::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(Certificate::get_resource_type()))?;

    // someone else's certificate is reported as missing
    check_access(state.pool(), user, &certificate, user.user_id())
        .await
        .map_err(|_| WebError::resource_not_found(Certificate::get_resource_type()))?;

    let details = CertificateDetailsRow::find_by_id(state.pool(), certificate.id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Certificate::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(Certificate::get_resource_type()))?;

    Ok(Json(details))
}

#[utoipa::path(
    get,
    path = "/api/v1/certificates/verify/{number}",
    description = "Public certificate verification",
    params(("number" = String, Path, description = "Certificate number")),
    responses(
        (status = 200, description = "Certificate is valid", body = VerificationResponse),
        (status = 404, description = "No such certificate", body = VerificationResponse),
    ),
    tag = "certificates"
)]
async fn certificate_verify_handler(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> WebResult<Response> {
    let found = CertificateDetailsRow::find_by_number(state.pool(), number.trim())
        .await
        .map_err(|e| WebError::resource_fetch_error(Certificate::get_resource_type(), e))?;

    let response = match found {
        Some(row) => (
            StatusCode::OK,
            Json(VerificationResponse {
                valid: true,
                certificate: Some(row.into()),
            }),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(VerificationResponse {
                valid: false,
                certificate: None,
            }),
        ),
    };

    Ok(response.into_response())
}

#[utoipa::path(
    post,
    path = "/api/v1/certificates",
    request_body = IssueBody,
    description = "Issues the certificate for a completed enrollment. Idempotent",
    responses(
        (status = 200, description = "Issued or already existing certificate", body = IssueResponse),
        (status = 400, description = "No key given or course not completed", body = ErrorResponse),
        (status = 404, description = "Enrollment not found", body = ErrorResponse),
    ),
    tag = "certificates",
    security(("cookie" = []))
)]
async fn certificate_issue_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<IssueBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let enrollment = match (payload.enrollment_id, payload.course_id) {
        (Some(id), _) => Enrollment::find_by_id(state.pool(), id).await,
        (None, Some(course_id)) => Enrollment::find_active(state.pool(), user.user_id(), course_id).await,
        (None, None) => {
            return Err(WebError::resource_bad_request_because(
                Certificate::get_resource_type(),
                "Enrollment ID or course ID is required",
            ));
        }
    }
    .map_err(|e| WebError::resource_fetch_error(Enrollment::get_resource_type(), e))?
    .filter(|e| e.user_id() == user.user_id() && e.grants_access())
    .ok_or(WebError::resource_not_found(Enrollment::get_resource_type()))?;

    if !enrollment.is_complete() {
        return Err(WebError::resource_bad_request_because(
            Certificate::get_resource_type(),
            "Course not completed yet",
        ));
    }

    let (certificate, created) = Certificate::issue_once(state.pool(), state.issuer(), &enrollment)
        .await
        .map_err(|e| WebError::resource_fetch_error(Certificate::get_resource_type(), e))?;

    let message = if created {
        tracing::info!("certificate {} issued", certificate.certificate_number());
        "Certificate issued"
    } else {
        "Certificate already exists"
    };

    Ok(Json(IssueResponse { certificate, message }))
}
