use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::access::HasOwner;
use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult, repo::CrudRepository};
use crate::web::AuthenticatedUser;

use super::unique_slug;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Course {
    id: Uuid,
    slug: String,
    title: String,
    subtitle: Option<String>,
    description: String,
    thumbnail_url: Option<String>,
    category: Option<String>,
    level: String,
    price_cents: i64,
    currency: String,
    is_free: bool,
    status: String,
    instructor_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseStatus {
    Draft,
    Published,
    Archived,
}

impl From<&str> for CourseStatus {
    fn from(value: &str) -> Self {
        match value {
            "published" => Self::Published,
            "archived" => Self::Archived,
            _ => Self::Draft,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CourseCreate {
    pub title: String,
    pub subtitle: Option<String>,
    #[serde(default)]
    pub description: String,
    pub thumbnail_url: Option<String>,
    pub category: Option<String>,
    /// `beginner`, `intermediate` or `advanced`
    pub level: Option<String>,
    #[serde(default)]
    pub price_cents: i64,
    pub currency: Option<String>,
    #[serde(default)]
    pub is_free: bool,
    /// `draft`, `published` or `archived`
    pub status: Option<String>,
}

impl CourseCreate {
    pub fn is_valid(&self) -> bool {
        let level_ok = self
            .level
            .as_deref()
            .is_none_or(|l| matches!(l, "beginner" | "intermediate" | "advanced"));
        let status_ok = self
            .status
            .as_deref()
            .is_none_or(|s| matches!(s, "draft" | "published" | "archived"));
        !self.title.trim().is_empty() && self.price_cents >= 0 && level_ok && status_ok
    }
}

impl ResourceTyped for Course {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Course
    }
}

impl Course {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn price_cents(&self) -> i64 {
        self.price_cents
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn instructor_id(&self) -> Option<Uuid> {
        self.instructor_id
    }

    pub fn status(&self) -> CourseStatus {
        CourseStatus::from(self.status.as_str())
    }

    pub fn is_published(&self) -> bool {
        self.status() == CourseStatus::Published
    }

    /// Free courses can be enrolled into without a payment.
    pub fn is_free_to_enroll(&self) -> bool {
        self.is_free || self.price_cents == 0
    }

    /// Drafts are visible to their instructor and admins only.
    pub fn visible_to(&self, actor: Option<&AuthenticatedUser>) -> bool {
        self.is_published()
            || actor.is_some_and(|a| a.is_admin() || self.instructor_id == Some(a.user_id()))
    }
}

#[async_trait]
impl CrudRepository<Course, CourseCreate, Uuid> for Course {
    async fn create(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        data: CourseCreate,
    ) -> DatabaseResult<Self> {
        let slug = unique_slug(mm, "courses", &data.title, "course").await?;
        let course = sqlx::query_as(
            r#"
            INSERT INTO courses
                (id, slug, title, subtitle, description, thumbnail_url, category, level,
                 price_cents, currency, is_free, status, instructor_id)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&slug)
        .bind(data.title.trim())
        .bind(&data.subtitle)
        .bind(&data.description)
        .bind(&data.thumbnail_url)
        .bind(&data.category)
        .bind(data.level.as_deref().unwrap_or("beginner"))
        .bind(data.price_cents)
        .bind(data.currency.as_deref().unwrap_or("usd"))
        .bind(data.is_free)
        .bind(data.status.as_deref().unwrap_or("draft"))
        .bind(actor.user_id())
        .fetch_one(mm.executor())
        .await?;

        Ok(course)
    }

    async fn update(
        self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: CourseCreate,
    ) -> DatabaseResult<Self> {
        let course = sqlx::query_as(
            r#"
            UPDATE courses SET
                title = $1, subtitle = $2, description = $3, thumbnail_url = $4, category = $5,
                level = COALESCE($6, level), price_cents = $7, currency = COALESCE($8, currency),
                is_free = $9, status = COALESCE($10, status), updated_at = now()
            WHERE id = $11
            RETURNING *
            "#,
        )
        .bind(data.title.trim())
        .bind(&data.subtitle)
        .bind(&data.description)
        .bind(&data.thumbnail_url)
        .bind(&data.category)
        .bind(&data.level)
        .bind(data.price_cents)
        .bind(&data.currency)
        .bind(data.is_free)
        .bind(&data.status)
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;

        Ok(course)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(self.id)
            .execute(mm.executor())
            .await?;
        Ok(())
    }

    async fn find_by_id(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM courses WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    /// Courses the actor authored (all of them for admins).
    async fn list(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            r#"
            SELECT * FROM courses
            WHERE $1 OR instructor_id = $2
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(actor.is_admin())
        .bind(actor.user_id())
        .bind(limit)
        .bind(offset)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM courses WHERE $1 OR instructor_id = $2")
                .bind(actor.is_admin())
                .bind(actor.user_id())
                .fetch_one(mm.executor())
                .await?;

        Ok(result)
    }
}

crate::impl_paginatable_for!(Course, CourseCreate, Uuid);

#[async_trait]
impl HasOwner for Course {
    type OwnerId = Option<Uuid>;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.instructor_id)
    }
}

impl Course {
    pub async fn find(mm: &ModelManager, id: Uuid) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM courses WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn find_by_slug(mm: &ModelManager, slug: &str) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM courses WHERE slug = $1")
            .bind(slug)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn find_many(mm: &ModelManager, ids: &[Uuid]) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as("SELECT * FROM courses WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(mm.executor())
            .await?;
        Ok(result)
    }
}

/// Catalog filters for the public course listing.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogFilter {
    pub category: Option<String>,
    pub level: Option<String>,
    pub search: Option<String>,
}

/// A published course with instructor name and aggregate statistics.
#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct CatalogRow {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub description: String,
    pub thumbnail_url: Option<String>,
    pub category: Option<String>,
    pub level: String,
    pub price_cents: i64,
    pub currency: String,
    pub is_free: bool,
    pub instructor_name: Option<String>,
    pub lesson_count: i64,
    pub total_minutes: i64,
    pub enrollment_count: i64,
}

impl CatalogRow {
    pub async fn search(
        mm: &ModelManager,
        filter: &CatalogFilter,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<(Vec<Self>, i64)> {
        let pattern = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{s}%"));

        let rows = sqlx::query_as(
            r#"
            SELECT
                c.id, c.slug, c.title, c.subtitle, c.description, c.thumbnail_url, c.category,
                c.level, c.price_cents, c.currency, c.is_free,
                u.full_name AS instructor_name,
                (SELECT COUNT(*) FROM lessons l WHERE l.course_id = c.id) AS lesson_count,
                (SELECT COALESCE(SUM(l.duration_minutes), 0)::BIGINT FROM lessons l WHERE l.course_id = c.id) AS total_minutes,
                (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id) AS enrollment_count
            FROM courses c
            LEFT JOIN users u ON u.id = c.instructor_id
            WHERE c.status = 'published'
              AND ($1::TEXT IS NULL OR c.category = $1)
              AND ($2::TEXT IS NULL OR c.level = $2)
              AND ($3::TEXT IS NULL OR c.title ILIKE $3 OR c.description ILIKE $3)
            ORDER BY c.created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(&filter.category)
        .bind(&filter.level)
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(mm.executor())
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM courses c
            WHERE c.status = 'published'
              AND ($1::TEXT IS NULL OR c.category = $1)
              AND ($2::TEXT IS NULL OR c.level = $2)
              AND ($3::TEXT IS NULL OR c.title ILIKE $3 OR c.description ILIKE $3)
            "#,
        )
        .bind(&filter.category)
        .bind(&filter.level)
        .bind(&pattern)
        .fetch_one(mm.executor())
        .await?;

        Ok((rows, total))
    }
}
