use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tower_cookies::{Cookie, Cookies, cookie::SameSite};

use crate::{
    auth,
    model::{CrudRepository, ResourceTyped, entity::UserEntity},
    web::{AppState, RequestContext, context::AuthenticatedUser, error::WebError},
};

pub static AUTH_TOKEN: &str = "SID";

/// Session cookie carrying the JWT.
pub fn session_cookie(token: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(AUTH_TOKEN, token);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie
}

/// Issues a fresh session for `user_id` on the response cookies.
pub fn start_session(state: &AppState, cookies: &Cookies, user_id: uuid::Uuid) -> Result<(), WebError> {
    let token = auth::generate_token(auth::UserClaims::for_user(user_id), state.config().app().jwt())
        .map_err(WebError::server_auth_error)?;
    cookies.add(session_cookie(token));
    Ok(())
}

pub fn end_session(cookies: &Cookies) {
    let mut cookie = Cookie::from(AUTH_TOKEN);
    cookie.set_path("/");
    cookies.remove(cookie);
}

pub async fn extract_context_fn(
    State(state): State<AppState>,
    cookies: Cookies,
    mut req: Request,
    next: Next,
) -> Result<Response, WebError> {
    let token = match cookies.get(AUTH_TOKEN) {
        Some(token) => token,
        None => {
            req.extensions_mut().insert(RequestContext::new(None));
            return Ok(next.run(req).await);
        }
    };

    // expired or forged sessions are treated as anonymous
    let id = match auth::process_token(token.value(), state.config().app().jwt()) {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::debug!("rejected session cookie: {}", e);
            None
        }
    };

    let Some(id) = id else {
        req.extensions_mut().insert(RequestContext::new(None));
        return Ok(next.run(req).await);
    };

    let user = UserEntity::find_by_id(state.pool(), &AuthenticatedUser::admin(), id)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;

    let ctx = match user {
        Some(user) => RequestContext::new(Some(AuthenticatedUser::new(id, user.role()))),
        None => RequestContext::new(None),
    };
    req.extensions_mut().insert(ctx);

    Ok(next.run(req).await)
}
