use serde::{Deserialize, Serialize};

use crate::{
    model::{ModelManager, error::DatabaseResult},
    web::AuthenticatedUser,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResourceType {
    User,
    Course,
    Module,
    Lesson,
    Enrollment,
    LessonProgress,
    Bookmark,
    Certificate,
    Quiz,
    QuizAttempt,
    Assignment,
    Submission,
    Discussion,
    Reply,
    Team,
    TeamMember,
    TeamInvitation,
    Notification,
    Payment,
    LiveTraining,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, limit: i64, offset: i64) -> Self {
        Self {
            items,
            total,
            limit,
            offset,
        }
    }
}

/// Page-number pagination used by the listing endpoints that expose `page`/`limit`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PageInfo {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl PageInfo {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    /// Normalizes raw query values into `(page, limit, offset)`; pages start at 1.
    pub fn window(page: Option<i64>, limit: Option<i64>) -> (i64, i64, i64) {
        let page = page.unwrap_or(1).max(1);
        let limit = limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        (page, limit, (page - 1) * limit)
    }

    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

pub trait ResourceTyped {
    fn get_resource_type() -> ResourceType;
}

#[async_trait::async_trait]
pub trait CrudRepository<T, CreateUpdate, V>
where
    T: ResourceTyped,
    V: Clone + Copy,
{
    async fn create(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        data: CreateUpdate,
    ) -> DatabaseResult<T>;
    async fn update(
        self,
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        data: CreateUpdate,
    ) -> DatabaseResult<T>
    where
        Self: Sized;

    async fn delete(self, mm: &ModelManager, actor: &AuthenticatedUser) -> DatabaseResult<()>
    where
        Self: Sized;

    async fn find_by_id(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        id: V,
    ) -> DatabaseResult<Option<T>>;
    async fn list(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<T>>;
    async fn count(mm: &ModelManager, actor: &AuthenticatedUser) -> DatabaseResult<i64>;
}

#[async_trait::async_trait]
pub trait PaginatableRepository<T, CreateUpdate, V>
where
    T: ResourceTyped + CrudRepository<T, CreateUpdate, V>,
    V: Clone + Copy,
{
    async fn page(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Page<T>>;
}

#[macro_export]
macro_rules! impl_paginatable_for {
    ($ent:ident, $ent_create:ident, $ent_id:ident) => {
        #[async_trait::async_trait]
        impl $crate::model::PaginatableRepository<$ent, $ent_create, $ent_id> for $ent {
            async fn page(
                mm: &ModelManager,
                actor: &AuthenticatedUser,
                limit: i64,
                offset: i64,
            ) -> DatabaseResult<$crate::model::Page<$ent>> {
                let (items, count) = tokio::try_join!(
                    $ent::list(mm, actor, limit, offset),
                    $ent::count(mm, actor),
                )?;
                Ok($crate::model::Page::new(items, count, limit, offset))
            }
        }
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn page_window_test() {
        assert_eq!(PageInfo::window(None, None), (1, 20, 0));
        assert_eq!(PageInfo::window(Some(3), Some(10)), (3, 10, 20));
        assert_eq!(PageInfo::window(Some(0), Some(0)), (1, 1, 0));
        assert_eq!(PageInfo::window(Some(2), Some(1000)), (2, 100, 100));
    }

    #[test]
    fn page_info_total_pages_test() {
        assert_eq!(PageInfo::new(1, 20, 0).total_pages, 0);
        assert_eq!(PageInfo::new(1, 20, 20).total_pages, 1);
        assert_eq!(PageInfo::new(1, 20, 21).total_pages, 2);
    }
}
