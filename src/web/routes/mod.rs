use crate::{
    Config,
    web::{AppState, doc::ApiDoc},
};
use axum::Router;
use serde::Deserialize;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod account;
pub mod assignments;
pub mod bookmarks;
pub mod certificates;
pub mod courses;
pub mod discussions;
pub mod enrollments;
pub mod lessons;
pub mod live_trainings;
pub mod notifications;
pub mod payments;
pub mod progress;
pub mod quizzes;
pub mod teams;
pub mod webhooks;

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema, utoipa::IntoParams)]
pub struct PaginationQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

impl PaginationQuery {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    /// `(limit, offset)` clamped to sane values.
    pub fn window(&self) -> (i64, i64) {
        let limit = self
            .limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        (limit, self.offset.unwrap_or(0).max(0))
    }
}

pub fn build_app<S: Send + Sync + Clone + 'static>(state: AppState, config: &'static Config) -> Router<S> {
    let mut router = Router::new()
        .nest("/api/v1/account", account::routes(state.clone()))
        .nest("/api/v1/courses", courses::routes(state.clone()))
        .nest("/api/v1/enrollments", enrollments::routes(state.clone()))
        .nest("/api/v1/lessons", lessons::routes(state.clone()))
        .nest("/api/v1/progress", progress::routes(state.clone()))
        .nest("/api/v1/bookmarks", bookmarks::routes(state.clone()))
        .nest("/api/v1/certificates", certificates::routes(state.clone()))
        .nest("/api/v1/quizzes", quizzes::routes(state.clone()))
        .nest("/api/v1/assignments", assignments::routes(state.clone()))
        .nest("/api/v1/discussions", discussions::routes(state.clone()))
        .nest("/api/v1/teams", teams::routes(state.clone()))
        .nest("/api/v1/notifications", notifications::routes(state.clone()))
        .nest("/api/v1/payments", payments::routes(state.clone()))
        .nest("/api/v1/webhooks", webhooks::routes(state.clone()))
        .nest("/api/v1/live-trainings", live_trainings::routes(state.clone()))
        .layer(CookieManagerLayer::default())
        .layer(CorsLayer::very_permissive())
        .with_state(state);

    if config.app().docs() {
        let openapi = ApiDoc::openapi();

        router = router.merge(SwaggerUi::new("/api/v1/docs").url("/api-doc/openapi.json", openapi));
    }

    router
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pagination_window_test() {
        let query = PaginationQuery {
            limit: None,
            offset: None,
        };
        assert_eq!(query.window(), (20, 0));

        let query = PaginationQuery {
            limit: Some(500),
            offset: Some(-3),
        };
        assert_eq!(query.window(), (100, 0));
    }
}
