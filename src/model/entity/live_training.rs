use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult};

pub const DEFAULT_MAX_PARTICIPANTS: i32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct LiveTraining {
    id: Uuid,
    course_id: Option<Uuid>,
    instructor_id: Uuid,
    title: String,
    description: Option<String>,
    platform: String,
    meeting_url: String,
    scheduled_start: DateTime<Utc>,
    scheduled_end: DateTime<Utc>,
    status: String,
    max_participants: i32,
    created_at: DateTime<Utc>,
}

impl ResourceTyped for LiveTraining {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::LiveTraining
    }
}

impl LiveTraining {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn instructor_id(&self) -> Uuid {
        self.instructor_id
    }

    pub fn max_participants(&self) -> i32 {
        self.max_participants
    }

    /// Registration is open while the session is scheduled or running.
    pub fn accepts_registrations(&self) -> bool {
        matches!(self.status.as_str(), "scheduled" | "live")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LiveTrainingCreate {
    pub course_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub platform: String,
    pub meeting_url: String,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub max_participants: Option<i32>,
}

impl LiveTrainingCreate {
    /// Reason the training cannot be scheduled, if any.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.title.trim().is_empty() {
            return Err("Title is required");
        }
        if self.platform.trim().is_empty() {
            return Err("Platform is required");
        }
        if self.meeting_url.trim().is_empty() {
            return Err("Meeting URL is required");
        }
        if self.scheduled_end <= self.scheduled_start {
            return Err("End time must be after start time");
        }
        if self.max_participants.is_some_and(|m| m <= 0) {
            return Err("Max participants must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LiveTrainingUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub platform: Option<String>,
    pub meeting_url: Option<String>,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
    /// `scheduled`, `live`, `completed` or `cancelled`
    pub status: Option<String>,
    pub max_participants: Option<i32>,
}

impl LiveTrainingUpdate {
    pub fn validate(&self, current: &LiveTraining) -> Result<(), &'static str> {
        let start = self.scheduled_start.unwrap_or(current.scheduled_start);
        let end = self.scheduled_end.unwrap_or(current.scheduled_end);
        if end <= start {
            return Err("End time must be after start time");
        }
        if self
            .status
            .as_deref()
            .is_some_and(|s| !matches!(s, "scheduled" | "live" | "completed" | "cancelled"))
        {
            return Err("Unknown status");
        }
        if self.max_participants.is_some_and(|m| m <= 0) {
            return Err("Max participants must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LiveTrainingFilter {
    pub course_id: Option<Uuid>,
    pub status: Option<String>,
    #[serde(default)]
    pub upcoming: bool,
}

/// A training with host name and registration statistics.
#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct LiveTrainingRow {
    pub id: Uuid,
    pub course_id: Option<Uuid>,
    pub instructor_id: Uuid,
    pub instructor_name: String,
    pub title: String,
    pub description: Option<String>,
    pub platform: String,
    pub meeting_url: String,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub status: String,
    pub max_participants: i32,
    pub registered_count: i64,
}

const ROW_SELECT: &str = r#"
    SELECT
        t.id, t.course_id, t.instructor_id, u.full_name AS instructor_name, t.title,
        t.description, t.platform, t.meeting_url, t.scheduled_start, t.scheduled_end,
        t.status, t.max_participants,
        (SELECT COUNT(*) FROM live_training_registrations r WHERE r.live_training_id = t.id) AS registered_count
    FROM live_trainings t
    JOIN users u ON u.id = t.instructor_id
"#;

impl LiveTrainingRow {
    /// Non-cancelled trainings, soonest first.
    pub async fn page(
        mm: &ModelManager,
        filter: &LiveTrainingFilter,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<(Vec<Self>, i64)> {
        let rows = sqlx::query_as(&format!(
            r#"{ROW_SELECT}
            WHERE t.status <> 'cancelled'
              AND ($1::UUID IS NULL OR t.course_id = $1)
              AND ($2::TEXT IS NULL OR t.status = $2)
              AND (NOT $3 OR t.scheduled_start > now())
            ORDER BY t.scheduled_start ASC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(filter.course_id)
        .bind(&filter.status)
        .bind(filter.upcoming)
        .bind(limit)
        .bind(offset)
        .fetch_all(mm.executor())
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM live_trainings t
            WHERE t.status <> 'cancelled'
              AND ($1::UUID IS NULL OR t.course_id = $1)
              AND ($2::TEXT IS NULL OR t.status = $2)
              AND (NOT $3 OR t.scheduled_start > now())
            "#,
        )
        .bind(filter.course_id)
        .bind(&filter.status)
        .bind(filter.upcoming)
        .fetch_one(mm.executor())
        .await?;

        Ok((rows, total))
    }

    pub async fn find_by_id(mm: &ModelManager, id: Uuid) -> DatabaseResult<Option<Self>> {
        let row = sqlx::query_as(&format!("{ROW_SELECT} WHERE t.id = $1"))
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(row)
    }
}

impl LiveTraining {
    pub async fn find_by_id(mm: &ModelManager, id: Uuid) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM live_trainings WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn create(
        mm: &ModelManager,
        instructor_id: Uuid,
        data: LiveTrainingCreate,
    ) -> DatabaseResult<Self> {
        let training = sqlx::query_as(
            r#"
            INSERT INTO live_trainings
                (id, course_id, instructor_id, title, description, platform, meeting_url,
                 scheduled_start, scheduled_end, max_participants)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.course_id)
        .bind(instructor_id)
        .bind(data.title.trim())
        .bind(&data.description)
        .bind(data.platform.trim())
        .bind(data.meeting_url.trim())
        .bind(data.scheduled_start)
        .bind(data.scheduled_end)
        .bind(data.max_participants.unwrap_or(DEFAULT_MAX_PARTICIPANTS))
        .fetch_one(mm.executor())
        .await?;
        Ok(training)
    }

    pub async fn update(self, mm: &ModelManager, data: LiveTrainingUpdate) -> DatabaseResult<Self> {
        let training = sqlx::query_as(
            r#"
            UPDATE live_trainings SET
                title = COALESCE($1, title),
                description = COALESCE($2, description),
                platform = COALESCE($3, platform),
                meeting_url = COALESCE($4, meeting_url),
                scheduled_start = COALESCE($5, scheduled_start),
                scheduled_end = COALESCE($6, scheduled_end),
                status = COALESCE($7, status),
                max_participants = COALESCE($8, max_participants)
            WHERE id = $9
            RETURNING *
            "#,
        )
        .bind(data.title.as_deref().map(str::trim))
        .bind(&data.description)
        .bind(&data.platform)
        .bind(&data.meeting_url)
        .bind(data.scheduled_start)
        .bind(data.scheduled_end)
        .bind(&data.status)
        .bind(data.max_participants)
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;
        Ok(training)
    }

    /// Soft delete: the training stays but is marked cancelled.
    pub async fn cancel(self, mm: &ModelManager) -> DatabaseResult<Self> {
        let training =
            sqlx::query_as("UPDATE live_trainings SET status = 'cancelled' WHERE id = $1 RETURNING *")
                .bind(self.id)
                .fetch_one(mm.executor())
                .await?;
        Ok(training)
    }

    pub async fn registered_count(&self, mm: &ModelManager) -> DatabaseResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM live_training_registrations WHERE live_training_id = $1",
        )
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;
        Ok(count)
    }

    pub async fn is_registered(mm: &ModelManager, id: Uuid, user_id: Uuid) -> DatabaseResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM live_training_registrations WHERE live_training_id = $1 AND user_id = $2)",
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(mm.executor())
        .await?;
        Ok(exists)
    }

    /// Fails with a unique violation when already registered.
    pub async fn register(&self, mm: &ModelManager, user_id: Uuid) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT INTO live_training_registrations (id, live_training_id, user_id) VALUES ($1, $2, $3)",
        )
        .bind(Uuid::new_v4())
        .bind(self.id)
        .bind(user_id)
        .execute(mm.executor())
        .await?;
        Ok(())
    }

    pub async fn unregister(&self, mm: &ModelManager, user_id: Uuid) -> DatabaseResult<u64> {
        let result = sqlx::query(
            "DELETE FROM live_training_registrations WHERE live_training_id = $1 AND user_id = $2",
        )
        .bind(self.id)
        .bind(user_id)
        .execute(mm.executor())
        .await?;
        Ok(result.rows_affected())
    }
}
