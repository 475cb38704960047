use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Notification {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    title: String,
    message: String,
    action_url: Option<String>,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    is_archived: bool,
    archived_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl ResourceTyped for Notification {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Notification
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Enrollment,
    CourseCompleted,
    AssignmentGraded,
    TeamInvitation,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enrollment => "enrollment",
            Self::CourseCompleted => "course_completed",
            Self::AssignmentGraded => "assignment_graded",
            Self::TeamInvitation => "team_invitation",
        }
    }
}

/// A notification about to be delivered to one user.
#[derive(Debug)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
}

#[derive(Debug, Default)]
pub struct NotificationFilter {
    pub unread_only: bool,
    pub kind: Option<String>,
}

impl Notification {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is_read(&self) -> bool {
        self.is_read
    }
}

impl Notification {
    pub async fn push(
        mm: &ModelManager,
        user_id: Uuid,
        notification: NewNotification,
    ) -> DatabaseResult<Self> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO notifications (id, user_id, kind, title, message, action_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.action_url)
        .fetch_one(mm.executor())
        .await?;
        Ok(row)
    }

    /// Best effort delivery: a failed insert is logged and never fails the caller.
    pub async fn push_quietly(mm: &ModelManager, user_id: Uuid, notification: NewNotification) {
        if let Err(e) = Self::push(mm, user_id, notification).await {
            crate::error::log_error(&e);
        }
    }

    /// Non-archived notifications, newest first, plus the total for the filter.
    pub async fn list(
        mm: &ModelManager,
        user_id: Uuid,
        filter: &NotificationFilter,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<(Vec<Self>, i64)> {
        let rows = sqlx::query_as(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1 AND NOT is_archived
              AND (NOT $2 OR NOT is_read)
              AND ($3::TEXT IS NULL OR kind = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(user_id)
        .bind(filter.unread_only)
        .bind(&filter.kind)
        .bind(limit)
        .bind(offset)
        .fetch_all(mm.executor())
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM notifications
            WHERE user_id = $1 AND NOT is_archived
              AND (NOT $2 OR NOT is_read)
              AND ($3::TEXT IS NULL OR kind = $3)
            "#,
        )
        .bind(user_id)
        .bind(filter.unread_only)
        .bind(&filter.kind)
        .fetch_one(mm.executor())
        .await?;

        Ok((rows, total))
    }

    pub async fn unread_count(mm: &ModelManager, user_id: Uuid) -> DatabaseResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read AND NOT is_archived",
        )
        .bind(user_id)
        .fetch_one(mm.executor())
        .await?;
        Ok(count)
    }

    pub async fn mark_all_read(mm: &ModelManager, user_id: Uuid) -> DatabaseResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, read_at = now() WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .execute(mm.executor())
        .await?;
        Ok(result.rows_affected())
    }

    /// Applies read/archive flags to the given notifications of one user.
    pub async fn update_many(
        mm: &ModelManager,
        user_id: Uuid,
        ids: &[Uuid],
        mark_read: Option<bool>,
        mark_archived: Option<bool>,
    ) -> DatabaseResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notifications SET
                is_read = COALESCE($3, is_read),
                read_at = CASE WHEN $3 IS TRUE THEN COALESCE(read_at, now())
                               WHEN $3 IS FALSE THEN NULL ELSE read_at END,
                is_archived = COALESCE($4, is_archived),
                archived_at = CASE WHEN $4 IS TRUE THEN COALESCE(archived_at, now())
                                   WHEN $4 IS FALSE THEN NULL ELSE archived_at END
            WHERE user_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(ids)
        .bind(mark_read)
        .bind(mark_archived)
        .execute(mm.executor())
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_one(mm: &ModelManager, user_id: Uuid, id: Uuid) -> DatabaseResult<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(id)
            .execute(mm.executor())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_archived(mm: &ModelManager, user_id: Uuid) -> DatabaseResult<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE user_id = $1 AND is_archived")
            .bind(user_id)
            .execute(mm.executor())
            .await?;
        Ok(result.rows_affected())
    }
}
