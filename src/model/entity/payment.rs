use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::entity::Course;
use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Payment {
    id: Uuid,
    user_id: Uuid,
    course_id: Uuid,
    amount_cents: i64,
    currency: String,
    status: String,
    payment_method: String,
    stripe_session_id: Option<String>,
    stripe_payment_intent_id: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl ResourceTyped for Payment {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Payment
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

/// Payment history entry with the purchased course title.
#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct PaymentHistoryRow {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn course_id(&self) -> Uuid {
        self.course_id
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// One pending payment per course, all sharing the checkout session.
    pub async fn create_pending(
        mm: &ModelManager,
        user_id: Uuid,
        courses: &[Course],
        session_id: &str,
    ) -> DatabaseResult<Vec<Self>> {
        let mut tx = mm.executor().begin().await?;
        let mut payments = Vec::with_capacity(courses.len());

        for course in courses {
            let payment = sqlx::query_as(
                r#"
                INSERT INTO payments (id, user_id, course_id, amount_cents, currency, stripe_session_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(course.id())
            .bind(course.price_cents())
            .bind(course.currency())
            .bind(session_id)
            .fetch_one(&mut *tx)
            .await?;
            payments.push(payment);
        }

        tx.commit().await?;
        Ok(payments)
    }

    /// Completes the pending payments of a checkout session.
    pub async fn complete_session(
        mm: &ModelManager,
        session_id: &str,
        payment_intent_id: Option<&str>,
    ) -> DatabaseResult<Vec<Self>> {
        let payments = sqlx::query_as(
            r#"
            UPDATE payments SET
                status = 'completed',
                stripe_payment_intent_id = COALESCE($2, stripe_payment_intent_id),
                completed_at = now()
            WHERE stripe_session_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(payment_intent_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(payments)
    }

    pub async fn all_for_session(mm: &ModelManager, session_id: &str) -> DatabaseResult<Vec<Self>> {
        let payments = sqlx::query_as("SELECT * FROM payments WHERE stripe_session_id = $1")
            .bind(session_id)
            .fetch_all(mm.executor())
            .await?;
        Ok(payments)
    }

    /// Sets the status of every payment tied to an intent; returns the affected ids.
    pub async fn set_status_by_intent(
        mm: &ModelManager,
        payment_intent_id: &str,
        status: PaymentStatus,
    ) -> DatabaseResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar(
            r#"
            UPDATE payments SET
                status = $2,
                completed_at = CASE WHEN $2 = 'completed' THEN COALESCE(completed_at, now()) ELSE completed_at END
            WHERE stripe_payment_intent_id = $1
            RETURNING id
            "#,
        )
        .bind(payment_intent_id)
        .bind(status.as_str())
        .fetch_all(mm.executor())
        .await?;
        Ok(ids)
    }
}

impl PaymentHistoryRow {
    pub async fn all_for_user(mm: &ModelManager, user_id: Uuid) -> DatabaseResult<Vec<Self>> {
        let rows = sqlx::query_as(
            r#"
            SELECT p.id, p.course_id, c.title AS course_title, p.amount_cents, p.currency,
                   p.status, p.created_at, p.completed_at
            FROM payments p
            JOIN courses c ON c.id = p.course_id
            WHERE p.user_id = $1
            ORDER BY p.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(rows)
    }
}
