use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::entity::Lesson;
use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Bookmark {
    id: Uuid,
    user_id: Uuid,
    lesson_id: Uuid,
    course_id: Uuid,
    created_at: DateTime<Utc>,
}

impl ResourceTyped for Bookmark {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Bookmark
    }
}

/// A bookmark with the title of the lesson it points at.
#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct BookmarkRow {
    pub id: Uuid,
    pub lesson_id: Uuid,
    pub course_id: Uuid,
    pub lesson_title: String,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn lesson_id(&self) -> Uuid {
        self.lesson_id
    }

    /// Fails with a unique violation when the lesson is already bookmarked.
    pub async fn create(mm: &ModelManager, user_id: Uuid, lesson: &Lesson) -> DatabaseResult<Self> {
        let bookmark = sqlx::query_as(
            r#"
            INSERT INTO lesson_bookmarks (id, user_id, lesson_id, course_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(lesson.id())
        .bind(lesson.course_id())
        .fetch_one(mm.executor())
        .await?;
        Ok(bookmark)
    }

    pub async fn delete(mm: &ModelManager, user_id: Uuid, lesson_id: Uuid) -> DatabaseResult<u64> {
        let result = sqlx::query("DELETE FROM lesson_bookmarks WHERE user_id = $1 AND lesson_id = $2")
            .bind(user_id)
            .bind(lesson_id)
            .execute(mm.executor())
            .await?;
        Ok(result.rows_affected())
    }
}

impl BookmarkRow {
    pub async fn all_for_user(
        mm: &ModelManager,
        user_id: Uuid,
        course_id: Option<Uuid>,
    ) -> DatabaseResult<Vec<Self>> {
        let rows = sqlx::query_as(
            r#"
            SELECT b.id, b.lesson_id, b.course_id, l.title AS lesson_title, b.created_at
            FROM lesson_bookmarks b
            JOIN lessons l ON l.id = b.lesson_id
            WHERE b.user_id = $1 AND ($2::UUID IS NULL OR b.course_id = $2)
            ORDER BY b.created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(rows)
    }
}
