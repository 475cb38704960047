use thiserror::Error;

pub type PaymentResult<T> = std::result::Result<T, PaymentError>;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway answered {status}: {message}")]
    Api { status: u16, message: String },

    #[error("payment secret is not configured")]
    MissingSecret,

    #[error("webhook signature rejected: {0}")]
    Signature(#[from] SignatureError),

    #[error("webhook payload invalid: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("header is malformed")]
    MalformedHeader,
    #[error("timestamp outside tolerance")]
    TimestampOutOfTolerance,
    #[error("no matching signature")]
    NoMatch,
}
