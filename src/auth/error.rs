use thiserror::Error;

pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Failures while hashing credentials or handling session tokens.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),
    #[error("session token rejected: {0}")]
    SessionToken(#[from] jsonwebtoken::errors::Error),
    #[error("session subject is not a user id: {0}")]
    SessionSubject(String),
}

impl AuthError {
    /// True when the failure comes from the client's token rather than the server.
    pub fn is_client_fault(&self) -> bool {
        matches!(self, Self::SessionToken(_) | Self::SessionSubject(_))
    }
}
