use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use crate::{
    auth::AuthError,
    error::log_error,
    model::{DatabaseError, ResourceType},
    payments::PaymentError,
};

pub type WebResult<T> = std::result::Result<T, WebError>;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("RegistrationUserConflict")]
    RegistrationUserConflict,

    #[error("RegistrationInvalid: {reason}")]
    RegistrationInvalid { reason: &'static str },
}

#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("AuthenticationRequired")]
    AuthenticationRequired,

    #[error("AuthenticationInvalidCredentials")]
    AuthenticationInvalidCredentials,
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("ResourceNotFound: {resource_type:?}")]
    ResourceNotFound { resource_type: ResourceType },

    #[error("ResourceForbidden: {resource_type:?}")]
    ResourceForbidden {
        resource_type: ResourceType,
        reason: Option<String>,
    },

    #[error("ResourceFetchError: {resource_type:?}. Error: {error}")]
    ResourceFetchError {
        resource_type: ResourceType,
        error: DatabaseError,
    },

    #[error("ResourceBadRequest: {resource_type:?}, {reason:?}")]
    ResourceBadRequest {
        resource_type: ResourceType,
        reason: Option<String>,
    },

    #[error("ResourceConflict: {resource_type:?}, {reason}")]
    ResourceConflict {
        resource_type: ResourceType,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("ServerAuthError: {0}")]
    ServerAuthError(#[from] AuthError),

    #[error("ServerPaymentError: {0}")]
    ServerPaymentError(#[from] PaymentError),

    #[error("ServerMisconfigured: {0}")]
    ServerMisconfigured(&'static str),
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ServerPaymentError(PaymentError::Api { .. } | PaymentError::Http(_)) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn client_display(&self) -> String {
        match self {
            Self::ServerMisconfigured(what) => format!("Server error, {what} is not configured."),
            Self::ServerPaymentError(PaymentError::MissingSecret) => {
                String::from("Server error, payments are not configured.")
            }
            Self::ServerPaymentError(_) => String::from("Payment provider error."),
            Self::ServerAuthError(_) => String::from("Internal server error."),
        }
    }
}

impl RegistrationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RegistrationUserConflict => StatusCode::CONFLICT,
            Self::RegistrationInvalid { .. } => StatusCode::BAD_REQUEST,
        }
    }

    pub fn client_display(&self) -> String {
        match self {
            Self::RegistrationUserConflict => {
                String::from("Registration error, user already exists.")
            }
            Self::RegistrationInvalid { reason } => format!("Registration error, {reason}."),
        }
    }
}

impl AuthenticationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::AuthenticationInvalidCredentials => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn client_display(&self) -> String {
        match self {
            Self::AuthenticationRequired => String::from("Authentication required."),
            Self::AuthenticationInvalidCredentials => {
                String::from("Authentication error, user not found or password is invalid.")
            }
        }
    }
}

impl ResourceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ResourceNotFound { .. } => StatusCode::NOT_FOUND,
            Self::ResourceForbidden { .. } => StatusCode::FORBIDDEN,
            Self::ResourceFetchError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ResourceBadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::ResourceConflict { .. } => StatusCode::CONFLICT,
        }
    }

    pub fn client_display(&self) -> String {
        match self {
            Self::ResourceNotFound { resource_type } => {
                format!("Resource error, {resource_type:?} not found.")
            }
            Self::ResourceForbidden { reason: Some(reason), .. } => reason.clone(),
            Self::ResourceForbidden { .. } => String::from("Resource error, resource forbidden."),
            Self::ResourceFetchError { .. } => {
                String::from("Resource error, unable to fetch resource.")
            }
            Self::ResourceBadRequest { reason: Some(reason), .. } => reason.clone(),
            Self::ResourceBadRequest { .. } => String::from("Resource error, bad request."),
            Self::ResourceConflict { reason, .. } => reason.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("ResourceError - {0}")]
    ResourceError(#[from] ResourceError),
    #[error("AuthenticationError - {0}")]
    AuthenticationError(#[from] AuthenticationError),
    #[error("RegistrationError - {0}")]
    RegistrationError(#[from] RegistrationError),
    #[error("ServerError - {0}")]
    ServerError(#[from] ServerError),
}

impl WebError {
    pub fn resource_not_found(r#type: ResourceType) -> Self {
        Self::ResourceError(ResourceError::ResourceNotFound {
            resource_type: r#type,
        })
    }

    pub fn resource_forbidden(r#type: ResourceType) -> Self {
        Self::ResourceError(ResourceError::ResourceForbidden {
            resource_type: r#type,
            reason: None,
        })
    }

    pub fn resource_forbidden_because<S: Into<String>>(r#type: ResourceType, reason: S) -> Self {
        Self::ResourceError(ResourceError::ResourceForbidden {
            resource_type: r#type,
            reason: Some(reason.into()),
        })
    }

    pub fn resource_fetch_error(r#type: ResourceType, error: DatabaseError) -> Self {
        Self::ResourceError(ResourceError::ResourceFetchError {
            resource_type: r#type,
            error,
        })
    }

    /// `Forbidden` from an ownership check becomes 403, everything else a fetch error.
    pub fn resource_access_error(r#type: ResourceType, error: DatabaseError) -> Self {
        match error {
            DatabaseError::Forbidden => Self::resource_forbidden(r#type),
            error => Self::resource_fetch_error(r#type, error),
        }
    }

    /// Unique violations become 409 with `reason`, everything else a fetch error.
    pub fn resource_write_error<S: Into<String>>(
        r#type: ResourceType,
        error: DatabaseError,
        reason: S,
    ) -> Self {
        if error.is_unique_violation() {
            Self::resource_conflict(r#type, reason)
        } else {
            Self::resource_fetch_error(r#type, error)
        }
    }

    pub fn resource_bad_request(r#type: ResourceType) -> Self {
        Self::ResourceError(ResourceError::ResourceBadRequest {
            resource_type: r#type,
            reason: None,
        })
    }

    pub fn resource_bad_request_because<S: Into<String>>(r#type: ResourceType, reason: S) -> Self {
        Self::ResourceError(ResourceError::ResourceBadRequest {
            resource_type: r#type,
            reason: Some(reason.into()),
        })
    }

    pub fn resource_conflict<S: Into<String>>(r#type: ResourceType, reason: S) -> Self {
        Self::ResourceError(ResourceError::ResourceConflict {
            resource_type: r#type,
            reason: reason.into(),
        })
    }

    pub fn auth_required() -> Self {
        Self::AuthenticationError(AuthenticationError::AuthenticationRequired)
    }

    pub fn auth_invalid_credentials() -> Self {
        Self::AuthenticationError(AuthenticationError::AuthenticationInvalidCredentials)
    }

    pub fn registration_conflict() -> Self {
        Self::RegistrationError(RegistrationError::RegistrationUserConflict)
    }

    pub fn registration_invalid(reason: &'static str) -> Self {
        Self::RegistrationError(RegistrationError::RegistrationInvalid { reason })
    }

    pub fn server_auth_error(e: AuthError) -> Self {
        Self::ServerError(ServerError::ServerAuthError(e))
    }

    pub fn server_payment_error(e: PaymentError) -> Self {
        Self::ServerError(ServerError::ServerPaymentError(e))
    }

    pub fn server_misconfigured(what: &'static str) -> Self {
        Self::ServerError(ServerError::ServerMisconfigured(what))
    }

    pub fn status_code(&self) -> axum::http::StatusCode {
        match self {
            Self::ResourceError(e) => e.status_code(),
            Self::RegistrationError(e) => e.status_code(),
            Self::AuthenticationError(e) => e.status_code(),
            Self::ServerError(e) => e.status_code(),
        }
    }

    pub fn client_display(&self) -> String {
        match self {
            Self::ResourceError(e) => e.client_display(),
            Self::RegistrationError(e) => e.client_display(),
            Self::AuthenticationError(e) => e.client_display(),
            Self::ServerError(e) => e.client_display(),
        }
    }
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Human-readable message for the client
    pub error: String,
    /// HTTP status code (stringified)
    pub status_code: String,
    /// Optional debug details (only in debug mode)
    pub details: Option<String>,
}

impl IntoResponse for WebError {
    fn into_response(self) -> axum::response::Response {
        if self.status_code().is_server_error() {
            log_error(&self);
        } else {
            tracing::debug!("{}", self);
        }

        let status_code = self.status_code();
        let display = self.client_display();

        let body = ErrorResponse {
            error: display,
            status_code: status_code.as_str().to_string(),
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        };

        (status_code, Json(body)).into_response()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_codes_test() {
        assert_eq!(
            WebError::resource_conflict(ResourceType::Bookmark, "Lesson already bookmarked").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            WebError::resource_access_error(ResourceType::Course, DatabaseError::Forbidden).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            WebError::server_misconfigured("webhook secret").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(WebError::auth_required().status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn client_display_uses_reason_test() {
        let err = WebError::resource_bad_request_because(ResourceType::Quiz, "Maximum attempts reached");
        assert_eq!(err.client_display(), "Maximum attempts reached");
        assert_eq!(
            WebError::resource_not_found(ResourceType::Course).client_display(),
            "Resource error, Course not found."
        );
    }
}
