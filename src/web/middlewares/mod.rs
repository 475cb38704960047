mod auth;
pub use auth::{AUTH_TOKEN, end_session, extract_context_fn, session_cookie, start_session};
