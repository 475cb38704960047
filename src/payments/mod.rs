mod error;
pub use error::{PaymentError, PaymentResult, SignatureError};

mod gateway;
pub use gateway::{CheckoutItem, CheckoutRequest, CheckoutSession, PaymentGateway, StripeClient};

pub mod webhook;
