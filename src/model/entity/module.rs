use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult, repo::CrudRepository};
use crate::web::AuthenticatedUser;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct CourseModule {
    id: Uuid,
    course_id: Uuid,
    title: String,
    description: String,
    order_index: i32,
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CourseModuleCreate {
    pub course_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub order_index: Option<i32>,
}

impl ResourceTyped for CourseModule {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Module
    }
}

impl CourseModule {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn course_id(&self) -> Uuid {
        self.course_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

#[async_trait]
impl CrudRepository<CourseModule, CourseModuleCreate, Uuid> for CourseModule {
    /// Without an explicit `order_index` the module is appended to the course.
    async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: CourseModuleCreate,
    ) -> DatabaseResult<Self> {
        let module = sqlx::query_as(
            r#"
            INSERT INTO modules (id, course_id, title, description, order_index)
            VALUES ($1, $2, $3, $4,
                COALESCE($5, (SELECT COALESCE(MAX(order_index) + 1, 0) FROM modules WHERE course_id = $2)))
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.course_id)
        .bind(data.title.trim())
        .bind(&data.description)
        .bind(data.order_index)
        .fetch_one(mm.executor())
        .await?;

        Ok(module)
    }

    async fn update(
        self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: CourseModuleCreate,
    ) -> DatabaseResult<Self> {
        let module = sqlx::query_as(
            r#"
            UPDATE modules SET title = $1, description = $2, order_index = COALESCE($3, order_index)
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(data.title.trim())
        .bind(&data.description)
        .bind(data.order_index)
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;

        Ok(module)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM modules WHERE id = $1")
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
        let result = sqlx::query_as("SELECT * FROM modules WHERE id = $1")
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
            "SELECT * FROM modules ORDER BY course_id, order_index LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM modules")
            .fetch_one(mm.executor())
            .await?;
        Ok(result)
    }
}

impl CourseModule {
    pub async fn all_by_course(mm: &ModelManager, course_id: Uuid) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            "SELECT * FROM modules WHERE course_id = $1 ORDER BY order_index, title",
        )
        .bind(course_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }
}
