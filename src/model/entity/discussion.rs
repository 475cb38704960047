use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::access::HasOwner;
use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult};
use crate::web::AuthenticatedUser;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Discussion {
    id: Uuid,
    course_id: Uuid,
    lesson_id: Option<Uuid>,
    user_id: Uuid,
    title: String,
    content: String,
    is_pinned: bool,
    is_resolved: bool,
    view_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Reply {
    id: Uuid,
    discussion_id: Uuid,
    user_id: Uuid,
    content: String,
    is_instructor_reply: bool,
    is_solution: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ResourceTyped for Discussion {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Discussion
    }
}

impl ResourceTyped for Reply {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Reply
    }
}

impl Discussion {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn course_id(&self) -> Uuid {
        self.course_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }
}

impl Reply {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn discussion_id(&self) -> Uuid {
        self.discussion_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn is_solution(&self) -> bool {
        self.is_solution
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DiscussionCreate {
    pub course_id: Uuid,
    pub lesson_id: Option<Uuid>,
    pub title: String,
    pub content: String,
}

impl DiscussionCreate {
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty() && !self.content.trim().is_empty()
    }
}

/// Partial update of a thread. Pinning is reserved to course staff.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DiscussionUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_pinned: Option<bool>,
    pub is_resolved: Option<bool>,
}

impl DiscussionUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.is_pinned.is_none()
            && self.is_resolved.is_none()
    }

    pub fn touches_moderation(&self) -> bool {
        self.is_pinned.is_some()
    }
}

/// A thread with author name and reply count, as shown in listings.
#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct DiscussionRow {
    pub id: Uuid,
    pub course_id: Uuid,
    pub lesson_id: Option<Uuid>,
    pub user_id: Uuid,
    pub author_name: String,
    pub title: String,
    pub content: String,
    pub is_pinned: bool,
    pub is_resolved: bool,
    pub view_count: i32,
    pub reply_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct ReplyRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub author_name: String,
    pub content: String,
    pub is_instructor_reply: bool,
    pub is_solution: bool,
    pub created_at: DateTime<Utc>,
}

impl Discussion {
    pub async fn find_by_id(mm: &ModelManager, id: Uuid) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM discussions WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn create(
        mm: &ModelManager,
        user_id: Uuid,
        data: DiscussionCreate,
    ) -> DatabaseResult<Self> {
        let discussion = sqlx::query_as(
            r#"
            INSERT INTO discussions (id, course_id, lesson_id, user_id, title, content)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.course_id)
        .bind(data.lesson_id)
        .bind(user_id)
        .bind(data.title.trim())
        .bind(data.content.trim())
        .fetch_one(mm.executor())
        .await?;
        Ok(discussion)
    }

    pub async fn increment_views(&self, mm: &ModelManager) -> DatabaseResult<()> {
        sqlx::query("UPDATE discussions SET view_count = view_count + 1 WHERE id = $1")
            .bind(self.id)
            .execute(mm.executor())
            .await?;
        Ok(())
    }

    pub async fn update(self, mm: &ModelManager, data: DiscussionUpdate) -> DatabaseResult<Self> {
        let discussion = sqlx::query_as(
            r#"
            UPDATE discussions SET
                title = COALESCE($1, title),
                content = COALESCE($2, content),
                is_pinned = COALESCE($3, is_pinned),
                is_resolved = COALESCE($4, is_resolved),
                updated_at = now()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(data.title.as_deref().map(str::trim))
        .bind(data.content.as_deref().map(str::trim))
        .bind(data.is_pinned)
        .bind(data.is_resolved)
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;
        Ok(discussion)
    }

    pub async fn delete(self, mm: &ModelManager) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM discussions WHERE id = $1")
            .bind(self.id)
            .execute(mm.executor())
            .await?;
        Ok(())
    }
}

const DISCUSSION_SELECT: &str = r#"
    SELECT
        d.id, d.course_id, d.lesson_id, d.user_id, u.full_name AS author_name,
        d.title, d.content, d.is_pinned, d.is_resolved, d.view_count,
        (SELECT COUNT(*) FROM discussion_replies r WHERE r.discussion_id = d.id) AS reply_count,
        d.created_at
    FROM discussions d
    JOIN users u ON u.id = d.user_id
"#;

impl DiscussionRow {
    /// Pinned threads first, then newest.
    pub async fn page(
        mm: &ModelManager,
        course_id: Uuid,
        lesson_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<(Vec<Self>, i64)> {
        let rows = sqlx::query_as(&format!(
            r#"{DISCUSSION_SELECT}
            WHERE d.course_id = $1 AND ($2::UUID IS NULL OR d.lesson_id = $2)
            ORDER BY d.is_pinned DESC, d.created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(course_id)
        .bind(lesson_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(mm.executor())
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM discussions WHERE course_id = $1 AND ($2::UUID IS NULL OR lesson_id = $2)",
        )
        .bind(course_id)
        .bind(lesson_id)
        .fetch_one(mm.executor())
        .await?;

        Ok((rows, total))
    }

    pub async fn find_by_id(mm: &ModelManager, id: Uuid) -> DatabaseResult<Option<Self>> {
        let row = sqlx::query_as(&format!("{DISCUSSION_SELECT} WHERE d.id = $1"))
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(row)
    }
}

impl Reply {
    pub async fn find_by_id(mm: &ModelManager, id: Uuid) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM discussion_replies WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn create(
        mm: &ModelManager,
        discussion: &Discussion,
        user_id: Uuid,
        content: &str,
        is_instructor_reply: bool,
    ) -> DatabaseResult<Self> {
        let reply = sqlx::query_as(
            r#"
            INSERT INTO discussion_replies (id, discussion_id, user_id, content, is_instructor_reply)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(discussion.id)
        .bind(user_id)
        .bind(content.trim())
        .bind(is_instructor_reply)
        .fetch_one(mm.executor())
        .await?;

        sqlx::query("UPDATE discussions SET updated_at = now() WHERE id = $1")
            .bind(discussion.id)
            .execute(mm.executor())
            .await?;

        Ok(reply)
    }

    pub async fn update_content(self, mm: &ModelManager, content: &str) -> DatabaseResult<Self> {
        let reply = sqlx::query_as(
            "UPDATE discussion_replies SET content = $1, updated_at = now() WHERE id = $2 RETURNING *",
        )
        .bind(content.trim())
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;
        Ok(reply)
    }

    /// Marks this reply as the thread's solution. Any previous solution is unmarked and the
    /// thread is resolved. Unmarking leaves the thread resolution untouched.
    pub async fn set_solution(self, mm: &ModelManager, is_solution: bool) -> DatabaseResult<Self> {
        let mut tx = mm.executor().begin().await?;

        if is_solution {
            sqlx::query(
                "UPDATE discussion_replies SET is_solution = FALSE WHERE discussion_id = $1 AND id <> $2",
            )
            .bind(self.discussion_id)
            .bind(self.id)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE discussions SET is_resolved = TRUE, updated_at = now() WHERE id = $1")
                .bind(self.discussion_id)
                .execute(&mut *tx)
                .await?;
        }

        let reply = sqlx::query_as(
            "UPDATE discussion_replies SET is_solution = $1, updated_at = now() WHERE id = $2 RETURNING *",
        )
        .bind(is_solution)
        .bind(self.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(reply)
    }

    pub async fn delete(self, mm: &ModelManager) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM discussion_replies WHERE id = $1")
            .bind(self.id)
            .execute(mm.executor())
            .await?;
        Ok(())
    }
}

impl ReplyRow {
    /// Solution first, then oldest.
    pub async fn all_for_discussion(
        mm: &ModelManager,
        discussion_id: Uuid,
    ) -> DatabaseResult<Vec<Self>> {
        let rows = sqlx::query_as(
            r#"
            SELECT r.id, r.user_id, u.full_name AS author_name, r.content,
                   r.is_instructor_reply, r.is_solution, r.created_at
            FROM discussion_replies r
            JOIN users u ON u.id = r.user_id
            WHERE r.discussion_id = $1
            ORDER BY r.is_solution DESC, r.created_at ASC
            "#,
        )
        .bind(discussion_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl HasOwner for Discussion {
    type OwnerId = Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.user_id)
    }
}

#[async_trait]
impl HasOwner for Reply {
    type OwnerId = Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.user_id)
    }
}
