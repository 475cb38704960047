mod password;
pub use password::{hash_password, verify_password};
mod jwt;
pub use jwt::{SESSION_TTL_HOURS, UserClaims, generate_token, process_token};
mod error;
pub use error::{AuthError, AuthResult};
mod token;
pub use token::random_token;
