use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::entity::{Enrollment, Lesson};
use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct LessonProgress {
    id: Uuid,
    user_id: Uuid,
    lesson_id: Uuid,
    course_id: Uuid,
    enrollment_id: Uuid,
    is_completed: bool,
    completed_at: Option<DateTime<Utc>>,
    watch_time_seconds: i32,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ResourceTyped for LessonProgress {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::LessonProgress
    }
}

impl LessonProgress {
    pub fn lesson_id(&self) -> Uuid {
        self.lesson_id
    }

    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl LessonProgress {
    pub async fn find(
        mm: &ModelManager,
        user_id: Uuid,
        lesson_id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM lesson_progress WHERE user_id = $1 AND lesson_id = $2")
            .bind(user_id)
            .bind(lesson_id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    /// Upserts a completed row; the first completion timestamp is kept.
    pub async fn mark_completed(
        mm: &ModelManager,
        enrollment: &Enrollment,
        lesson: &Lesson,
    ) -> DatabaseResult<Self> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO lesson_progress
                (id, user_id, lesson_id, course_id, enrollment_id, is_completed, completed_at)
            VALUES ($1, $2, $3, $4, $5, TRUE, now())
            ON CONFLICT (user_id, lesson_id) DO UPDATE SET
                is_completed = TRUE,
                completed_at = COALESCE(lesson_progress.completed_at, now()),
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(enrollment.user_id())
        .bind(lesson.id())
        .bind(lesson.course_id())
        .bind(enrollment.id())
        .fetch_one(mm.executor())
        .await?;
        Ok(row)
    }

    /// Watch time only grows: the stored value is the maximum ever reported.
    pub async fn record_watch_time(
        mm: &ModelManager,
        enrollment: &Enrollment,
        lesson: &Lesson,
        seconds: i32,
    ) -> DatabaseResult<Self> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO lesson_progress
                (id, user_id, lesson_id, course_id, enrollment_id, watch_time_seconds)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, lesson_id) DO UPDATE SET
                watch_time_seconds = GREATEST(lesson_progress.watch_time_seconds, EXCLUDED.watch_time_seconds),
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(enrollment.user_id())
        .bind(lesson.id())
        .bind(lesson.course_id())
        .bind(enrollment.id())
        .bind(seconds.max(0))
        .fetch_one(mm.executor())
        .await?;
        Ok(row)
    }

    pub async fn set_notes(
        mm: &ModelManager,
        enrollment: &Enrollment,
        lesson: &Lesson,
        notes: Option<&str>,
    ) -> DatabaseResult<Self> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO lesson_progress (id, user_id, lesson_id, course_id, enrollment_id, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, lesson_id) DO UPDATE SET
                notes = EXCLUDED.notes,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(enrollment.user_id())
        .bind(lesson.id())
        .bind(lesson.course_id())
        .bind(enrollment.id())
        .bind(notes)
        .fetch_one(mm.executor())
        .await?;
        Ok(row)
    }

    pub async fn count_completed(
        mm: &ModelManager,
        user_id: Uuid,
        course_id: Uuid,
    ) -> DatabaseResult<i64> {
        // lessons deleted from the course drop out through the join
        let result: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM lesson_progress lp
            JOIN lessons l ON l.id = lp.lesson_id
            WHERE lp.user_id = $1 AND l.course_id = $2 AND lp.is_completed
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_one(mm.executor())
        .await?;
        Ok(result)
    }

    pub async fn all_for_course(
        mm: &ModelManager,
        user_id: Uuid,
        course_id: Uuid,
    ) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            "SELECT * FROM lesson_progress WHERE user_id = $1 AND course_id = $2 ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }
}
