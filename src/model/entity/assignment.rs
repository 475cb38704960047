use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::entity::Enrollment;
use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Assignment {
    id: Uuid,
    course_id: Uuid,
    lesson_id: Option<Uuid>,
    title: String,
    description: String,
    instructions: String,
    max_score: i32,
    submission_types: Vec<String>,
    due_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Submission {
    id: Uuid,
    assignment_id: Uuid,
    user_id: Uuid,
    enrollment_id: Uuid,
    submission_type: String,
    file_url: Option<String>,
    file_name: Option<String>,
    url_link: Option<String>,
    text_content: Option<String>,
    status: String,
    attempt_number: i32,
    previous_submission_id: Option<Uuid>,
    score: Option<i32>,
    feedback: Option<String>,
    graded_at: Option<DateTime<Utc>>,
    graded_by: Option<Uuid>,
    submitted_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ResourceTyped for Assignment {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Assignment
    }
}

impl ResourceTyped for Submission {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Submission
    }
}

impl Assignment {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn course_id(&self) -> Uuid {
        self.course_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn max_score(&self) -> i32 {
        self.max_score
    }

    pub fn accepts(&self, submission_type: SubmissionType) -> bool {
        self.submission_types
            .iter()
            .any(|t| t == submission_type.as_str())
    }
}

impl Submission {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn assignment_id(&self) -> Uuid {
        self.assignment_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn attempt_number(&self) -> i32 {
        self.attempt_number
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionType {
    File,
    Url,
    Text,
}

impl SubmissionType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "file" => Some(Self::File),
            "url" => Some(Self::Url),
            "text" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Url => "url",
            Self::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AssignmentCreate {
    pub course_id: Uuid,
    pub lesson_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
    pub max_score: Option<i32>,
    /// Any of `file`, `url`, `text`; defaults to `text`.
    pub submission_types: Option<Vec<String>>,
    pub due_at: Option<DateTime<Utc>>,
}

impl AssignmentCreate {
    pub fn is_valid(&self) -> bool {
        let types_ok = self.submission_types.as_ref().is_none_or(|types| {
            !types.is_empty() && types.iter().all(|t| SubmissionType::parse(t).is_some())
        });
        !self.title.trim().is_empty() && self.max_score.is_none_or(|m| m > 0) && types_ok
    }
}

/// Body of a submission; which field is required depends on `submission_type`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SubmissionPayload {
    pub submission_type: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub url_link: Option<String>,
    pub text_content: Option<String>,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl SubmissionPayload {
    /// Returns the submission type, or the reason the payload is rejected.
    pub fn validate(&self) -> Result<SubmissionType, &'static str> {
        let raw = self
            .submission_type
            .as_deref()
            .ok_or("Submission type is required")?;
        let kind = SubmissionType::parse(raw).ok_or("Unknown submission type")?;
        match kind {
            SubmissionType::File if !present(&self.file_url) => Err("File URL is required for file submissions"),
            SubmissionType::Url if !present(&self.url_link) => Err("URL is required for URL submissions"),
            SubmissionType::Text if !present(&self.text_content) => Err("Text content is required for text submissions"),
            _ => Ok(kind),
        }
    }
}

/// How a new submission relates to the learner's latest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPlan {
    /// No submission yet, start at attempt 1.
    First,
    /// Latest one is still awaiting review and gets overwritten.
    Replace(Uuid),
    /// Latest one was reviewed, a new attempt links back to it.
    NextAttempt { previous: Uuid, attempt_number: i32 },
}

pub fn plan_submission(latest: Option<&Submission>) -> SubmissionPlan {
    match latest {
        None => SubmissionPlan::First,
        Some(s) if s.status == "graded" || s.status == "resubmit" => SubmissionPlan::NextAttempt {
            previous: s.id,
            attempt_number: s.attempt_number + 1,
        },
        Some(s) => SubmissionPlan::Replace(s.id),
    }
}

impl Assignment {
    pub async fn find_by_id(mm: &ModelManager, id: Uuid) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM assignments WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn create(mm: &ModelManager, data: AssignmentCreate) -> DatabaseResult<Self> {
        let types = data
            .submission_types
            .unwrap_or_else(|| vec![String::from("text")]);
        let assignment = sqlx::query_as(
            r#"
            INSERT INTO assignments
                (id, course_id, lesson_id, title, description, instructions, max_score, submission_types, due_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.course_id)
        .bind(data.lesson_id)
        .bind(data.title.trim())
        .bind(&data.description)
        .bind(&data.instructions)
        .bind(data.max_score.unwrap_or(100))
        .bind(&types)
        .bind(data.due_at)
        .fetch_one(mm.executor())
        .await?;
        Ok(assignment)
    }
}

/// An assignment with the caller's latest submission state.
#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct AssignmentWithStatusRow {
    pub id: Uuid,
    pub course_id: Uuid,
    pub lesson_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub max_score: i32,
    pub submission_types: Vec<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub submission_status: Option<String>,
    pub score: Option<i32>,
    pub attempt_number: Option<i32>,
}

impl AssignmentWithStatusRow {
    pub async fn all_by_course(
        mm: &ModelManager,
        course_id: Uuid,
        user_id: Uuid,
    ) -> DatabaseResult<Vec<Self>> {
        let rows = sqlx::query_as(
            r#"
            SELECT
                a.id, a.course_id, a.lesson_id, a.title, a.description, a.max_score,
                a.submission_types, a.due_at,
                s.status AS submission_status, s.score, s.attempt_number
            FROM assignments a
            LEFT JOIN LATERAL (
                SELECT status, score, attempt_number FROM assignment_submissions
                WHERE assignment_id = a.id AND user_id = $2
                ORDER BY attempt_number DESC
                LIMIT 1
            ) s ON TRUE
            WHERE a.course_id = $1
            ORDER BY a.due_at NULLS LAST, a.created_at
            "#,
        )
        .bind(course_id)
        .bind(user_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(rows)
    }
}

impl Submission {
    pub async fn find_by_id(mm: &ModelManager, id: Uuid) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM assignment_submissions WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn all_for_user(
        mm: &ModelManager,
        assignment_id: Uuid,
        user_id: Uuid,
    ) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            "SELECT * FROM assignment_submissions WHERE assignment_id = $1 AND user_id = $2 ORDER BY attempt_number DESC",
        )
        .bind(assignment_id)
        .bind(user_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    pub async fn latest(
        mm: &ModelManager,
        assignment_id: Uuid,
        user_id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as(
            r#"
            SELECT * FROM assignment_submissions
            WHERE assignment_id = $1 AND user_id = $2
            ORDER BY attempt_number DESC
            LIMIT 1
            "#,
        )
        .bind(assignment_id)
        .bind(user_id)
        .fetch_optional(mm.executor())
        .await?;
        Ok(result)
    }

    /// Stores a submission according to `plan`, see [`plan_submission`].
    pub async fn submit(
        mm: &ModelManager,
        assignment: &Assignment,
        enrollment: &Enrollment,
        kind: SubmissionType,
        payload: &SubmissionPayload,
        plan: SubmissionPlan,
    ) -> DatabaseResult<Self> {
        let submission = match plan {
            SubmissionPlan::Replace(id) => {
                sqlx::query_as(
                    r#"
                    UPDATE assignment_submissions SET
                        submission_type = $1, file_url = $2, file_name = $3, url_link = $4,
                        text_content = $5, status = 'submitted', submitted_at = now(), updated_at = now()
                    WHERE id = $6
                    RETURNING *
                    "#,
                )
                .bind(kind.as_str())
                .bind(&payload.file_url)
                .bind(&payload.file_name)
                .bind(&payload.url_link)
                .bind(&payload.text_content)
                .bind(id)
                .fetch_one(mm.executor())
                .await?
            }
            SubmissionPlan::First | SubmissionPlan::NextAttempt { .. } => {
                let (attempt_number, previous) = match plan {
                    SubmissionPlan::NextAttempt { previous, attempt_number } => (attempt_number, Some(previous)),
                    _ => (1, None),
                };
                sqlx::query_as(
                    r#"
                    INSERT INTO assignment_submissions
                        (id, assignment_id, user_id, enrollment_id, submission_type, file_url, file_name,
                         url_link, text_content, status, attempt_number, previous_submission_id)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'submitted', $10, $11)
                    RETURNING *
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(assignment.id)
                .bind(enrollment.user_id())
                .bind(enrollment.id())
                .bind(kind.as_str())
                .bind(&payload.file_url)
                .bind(&payload.file_name)
                .bind(&payload.url_link)
                .bind(&payload.text_content)
                .bind(attempt_number)
                .bind(previous)
                .fetch_one(mm.executor())
                .await?
            }
        };
        Ok(submission)
    }

    /// Records a review. A score marks the submission graded; `request_resubmit` asks for another attempt.
    pub async fn grade(
        self,
        mm: &ModelManager,
        grader: Uuid,
        score: Option<i32>,
        feedback: Option<&str>,
        request_resubmit: bool,
    ) -> DatabaseResult<Self> {
        let status = if request_resubmit {
            "resubmit"
        } else if score.is_some() {
            "graded"
        } else {
            self.status.as_str()
        };

        let submission = sqlx::query_as(
            r#"
            UPDATE assignment_submissions SET
                score = COALESCE($1, score),
                feedback = COALESCE($2, feedback),
                status = $3,
                graded_at = now(),
                graded_by = $4,
                updated_at = now()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(score)
        .bind(feedback)
        .bind(status)
        .bind(grader)
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;
        Ok(submission)
    }
}
