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
pub struct Enrollment {
    id: Uuid,
    user_id: Uuid,
    course_id: Uuid,
    status: String,
    progress_percentage: i32,
    payment_id: Option<Uuid>,
    enrolled_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    last_accessed_at: Option<DateTime<Utc>>,
}

impl ResourceTyped for Enrollment {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Enrollment
    }
}

/// `round(completed / total * 100)`, half rounds up, 0 for an empty course.
/// Only a fully completed course reports 100.
pub fn progress_percentage(completed: i64, total: i64) -> i32 {
    if total <= 0 {
        return 0;
    }
    let completed = completed.clamp(0, total);
    if completed == total {
        return 100;
    }
    (((completed * 200 + total) / (total * 2)) as i32).min(99)
}

impl Enrollment {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn course_id(&self) -> Uuid {
        self.course_id
    }

    pub fn progress_percentage(&self) -> i32 {
        self.progress_percentage
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_complete(&self) -> bool {
        self.progress_percentage >= 100
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Expired (refunded) and cancelled enrollments no longer open the course.
    pub fn grants_access(&self) -> bool {
        matches!(self.status.as_str(), "active" | "completed")
    }
}

const SELECT_ACTIVE: &str =
    "SELECT * FROM enrollments WHERE user_id = $1 AND course_id = $2 AND status IN ('active', 'completed')";

// A lapsed row is reused on re-enrollment so lesson progress survives; live rows are left alone.
const REACTIVATE_ON_CONFLICT: &str = r#"
            ON CONFLICT (user_id, course_id) DO UPDATE SET
                status = CASE WHEN enrollments.progress_percentage >= 100 THEN 'completed' ELSE 'active' END,
                payment_id = EXCLUDED.payment_id,
                enrolled_at = now(),
                last_accessed_at = now()
            WHERE enrollments.status NOT IN ('active', 'completed')
            RETURNING *
"#;

impl Enrollment {
    pub async fn find_by_id(mm: &ModelManager, id: Uuid) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM enrollments WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    /// Any enrollment row, regardless of its status.
    pub async fn find(
        mm: &ModelManager,
        user_id: Uuid,
        course_id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM enrollments WHERE user_id = $1 AND course_id = $2")
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    /// An enrollment that still grants access (active or completed).
    pub async fn find_active(
        mm: &ModelManager,
        user_id: Uuid,
        course_id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as(SELECT_ACTIVE)
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    /// Enrolls into a free course; `None` when the user already holds a live enrollment.
    pub async fn create_free(
        mm: &ModelManager,
        user_id: Uuid,
        course_id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let sql = format!(
            r#"
            INSERT INTO enrollments (id, user_id, course_id, status, progress_percentage, payment_id, last_accessed_at)
            VALUES ($1, $2, $3, 'active', 0, NULL, now())
            {REACTIVATE_ON_CONFLICT}"#
        );
        let enrollment = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(enrollment)
    }

    /// Enrollment granted by a completed payment; `None` when a live one already existed.
    /// A previously refunded enrollment is reactivated and linked to the new payment.
    pub async fn create_for_payment(
        mm: &ModelManager,
        user_id: Uuid,
        course_id: Uuid,
        payment_id: Option<Uuid>,
    ) -> DatabaseResult<Option<Self>> {
        let sql = format!(
            r#"
            INSERT INTO enrollments (id, user_id, course_id, status, progress_percentage, payment_id, last_accessed_at)
            VALUES ($1, $2, $3, 'active', 0, $4, now())
            {REACTIVATE_ON_CONFLICT}"#
        );
        let enrollment = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(course_id)
            .bind(payment_id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(enrollment)
    }

    /// Stores a recomputed percentage. Reaching 100 marks the enrollment completed once.
    pub async fn set_progress(self, mm: &ModelManager, percentage: i32) -> DatabaseResult<Self> {
        let enrollment = sqlx::query_as(
            r#"
            UPDATE enrollments SET
                progress_percentage = $1,
                completed_at = CASE WHEN $1 >= 100 THEN COALESCE(completed_at, now()) ELSE completed_at END,
                status = CASE WHEN $1 >= 100 THEN 'completed' ELSE status END,
                last_accessed_at = now()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(percentage.clamp(0, 100))
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;
        Ok(enrollment)
    }

    pub async fn mark_completed_at(self, mm: &ModelManager) -> DatabaseResult<Self> {
        let enrollment = sqlx::query_as(
            "UPDATE enrollments SET completed_at = COALESCE(completed_at, now()), status = 'completed' WHERE id = $1 RETURNING *",
        )
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;
        Ok(enrollment)
    }

    pub async fn touch(&self, mm: &ModelManager) -> DatabaseResult<()> {
        sqlx::query("UPDATE enrollments SET last_accessed_at = now() WHERE id = $1")
            .bind(self.id)
            .execute(mm.executor())
            .await?;
        Ok(())
    }

    /// Revokes access granted by refunded payments. Returns the number of enrollments expired.
    pub async fn expire_by_payments(mm: &ModelManager, payment_ids: &[Uuid]) -> DatabaseResult<u64> {
        let result = sqlx::query("UPDATE enrollments SET status = 'expired' WHERE payment_id = ANY($1)")
            .bind(payment_ids)
            .execute(mm.executor())
            .await?;
        Ok(result.rows_affected())
    }

    /// Subset of `course_ids` the user holds a live enrollment for.
    pub async fn owned_course_ids(
        mm: &ModelManager,
        user_id: Uuid,
        course_ids: &[Uuid],
    ) -> DatabaseResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar(
            "SELECT course_id FROM enrollments WHERE user_id = $1 AND course_id = ANY($2) AND status IN ('active', 'completed')",
        )
        .bind(user_id)
        .bind(course_ids)
        .fetch_all(mm.executor())
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl HasOwner for Enrollment {
    type OwnerId = Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.user_id)
    }
}

/// Enrollment joined with its course, for "my courses" listings.
#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct EnrollmentWithCourseRow {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    pub course_slug: String,
    pub thumbnail_url: Option<String>,
    pub status: String,
    pub progress_percentage: i32,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl EnrollmentWithCourseRow {
    pub async fn all_for_user(mm: &ModelManager, user_id: Uuid) -> DatabaseResult<Vec<Self>> {
        let rows = sqlx::query_as(
            r#"
            SELECT
                e.id, e.course_id, c.title AS course_title, c.slug AS course_slug, c.thumbnail_url,
                e.status, e.progress_percentage, e.enrolled_at, e.completed_at, e.last_accessed_at
            FROM enrollments e
            JOIN courses c ON c.id = e.course_id
            WHERE e.user_id = $1
            ORDER BY COALESCE(e.last_accessed_at, e.enrolled_at) DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(rows)
    }
}
