use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult, repo::CrudRepository};
use crate::web::AuthenticatedUser;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Lesson {
    id: Uuid,
    course_id: Uuid,
    module_id: Uuid,
    title: String,
    content: String,
    content_type: String,
    video_url: Option<String>,
    duration_minutes: i32,
    is_free_preview: bool,
    order_index: i32,
}

impl ResourceTyped for Lesson {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Lesson
    }
}

impl Lesson {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn course_id(&self) -> Uuid {
        self.course_id
    }

    pub fn module_id(&self) -> Uuid {
        self.module_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn duration_minutes(&self) -> i32 {
        self.duration_minutes
    }

    pub fn order_index(&self) -> i32 {
        self.order_index
    }

    pub fn is_free_preview(&self) -> bool {
        self.is_free_preview
    }
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct LessonCreate {
    pub course_id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// `video`, `text`, `quiz` or `assignment`
    pub content_type: Option<String>,
    pub video_url: Option<String>,
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub is_free_preview: bool,
    pub order_index: Option<i32>,
}

impl LessonCreate {
    pub fn is_valid(&self) -> bool {
        let type_ok = self
            .content_type
            .as_deref()
            .is_none_or(|t| matches!(t, "video" | "text" | "quiz" | "assignment"));
        !self.title.trim().is_empty() && type_ok && self.duration_minutes.unwrap_or(0) >= 0
    }
}

#[async_trait]
impl CrudRepository<Lesson, LessonCreate, Uuid> for Lesson {
    async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: LessonCreate,
    ) -> DatabaseResult<Self> {
        let lesson = sqlx::query_as(
            r#"
            INSERT INTO lessons
                (id, course_id, module_id, title, content, content_type, video_url,
                 duration_minutes, is_free_preview, order_index)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9,
                COALESCE($10, (SELECT COALESCE(MAX(order_index) + 1, 0) FROM lessons WHERE module_id = $3)))
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.course_id)
        .bind(data.module_id)
        .bind(data.title.trim())
        .bind(&data.content)
        .bind(data.content_type.as_deref().unwrap_or("text"))
        .bind(&data.video_url)
        .bind(data.duration_minutes.unwrap_or(0))
        .bind(data.is_free_preview)
        .bind(data.order_index)
        .fetch_one(mm.executor())
        .await?;

        Ok(lesson)
    }

    async fn update(
        self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: LessonCreate,
    ) -> DatabaseResult<Self> {
        let lesson = sqlx::query_as(
            r#"
            UPDATE lessons SET
                module_id = $1, title = $2, content = $3,
                content_type = COALESCE($4, content_type), video_url = $5,
                duration_minutes = COALESCE($6, duration_minutes), is_free_preview = $7,
                order_index = COALESCE($8, order_index)
            WHERE id = $9
            RETURNING *
            "#,
        )
        .bind(data.module_id)
        .bind(data.title.trim())
        .bind(&data.content)
        .bind(&data.content_type)
        .bind(&data.video_url)
        .bind(data.duration_minutes)
        .bind(data.is_free_preview)
        .bind(data.order_index)
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;

        Ok(lesson)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM lessons WHERE id = $1")
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
        let result = sqlx::query_as("SELECT * FROM lessons WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    async fn list(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            "SELECT * FROM lessons ORDER BY course_id, order_index LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lessons")
            .fetch_one(mm.executor())
            .await?;
        Ok(result)
    }
}

impl Lesson {
    /// Lookup without an actor, for anonymous free-preview access.
    pub async fn find(mm: &ModelManager, id: Uuid) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM lessons WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    /// Lessons of a course in syllabus order (module order, then lesson order).
    pub async fn all_by_course(mm: &ModelManager, course_id: Uuid) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            r#"
            SELECT l.* FROM lessons l
            JOIN modules m ON m.id = l.module_id
            WHERE l.course_id = $1
            ORDER BY m.order_index, l.order_index
            "#,
        )
        .bind(course_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    pub async fn all_by_module(mm: &ModelManager, module_id: Uuid) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as("SELECT * FROM lessons WHERE module_id = $1 ORDER BY order_index, id")
            .bind(module_id)
            .fetch_all(mm.executor())
            .await?;
        Ok(result)
    }

    /// Renumbers the lessons of a module from 0 in the given order. Lessons missing from
    /// `ordered` keep their relative order after the listed ones.
    pub async fn reorder(
        mm: &ModelManager,
        module_id: Uuid,
        ordered: &[Uuid],
    ) -> DatabaseResult<Vec<Self>> {
        let mut lessons: Vec<Self> = sqlx::query_as(
            r#"
            WITH given AS (
                SELECT id, pos FROM UNNEST($2::UUID[]) WITH ORDINALITY AS t (id, pos)
            ),
            ranked AS (
                SELECT l.id,
                    (ROW_NUMBER() OVER (ORDER BY g.pos NULLS LAST, l.order_index, l.id) - 1)::INTEGER AS rank
                FROM lessons l
                LEFT JOIN given g ON g.id = l.id
                WHERE l.module_id = $1
            )
            UPDATE lessons SET order_index = ranked.rank
            FROM ranked
            WHERE lessons.id = ranked.id
            RETURNING lessons.*
            "#,
        )
        .bind(module_id)
        .bind(ordered)
        .fetch_all(mm.executor())
        .await?;

        lessons.sort_by_key(Lesson::order_index);
        Ok(lessons)
    }

    pub async fn count_by_course(mm: &ModelManager, course_id: Uuid) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lessons WHERE course_id = $1")
            .bind(course_id)
            .fetch_one(mm.executor())
            .await?;
        Ok(result)
    }
}
