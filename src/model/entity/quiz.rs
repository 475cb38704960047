use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Quiz {
    id: Uuid,
    course_id: Uuid,
    lesson_id: Option<Uuid>,
    title: String,
    description: String,
    time_limit_minutes: Option<i32>,
    passing_score: i32,
    allow_retry: bool,
    shuffle_questions: bool,
    is_published: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct QuizQuestion {
    id: Uuid,
    quiz_id: Uuid,
    kind: String,
    prompt: String,
    points: i32,
    explanation: Option<String>,
    accepted_text: Option<String>,
    order_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct QuizAnswer {
    id: Uuid,
    question_id: Uuid,
    text: String,
    is_correct: bool,
    order_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct QuizAttempt {
    id: Uuid,
    quiz_id: Uuid,
    user_id: Uuid,
    #[schema(value_type = Object)]
    answers: serde_json::Value,
    score: i32,
    passed: bool,
    attempt_number: i32,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
}

impl ResourceTyped for Quiz {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Quiz
    }
}

impl ResourceTyped for QuizAttempt {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::QuizAttempt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    MultipleChoice,
    MultipleAnswer,
    TrueFalse,
    FillBlank,
    ShortAnswer,
}

impl QuestionKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "multiple_choice" => Some(Self::MultipleChoice),
            "multiple_answer" => Some(Self::MultipleAnswer),
            "true_false" => Some(Self::TrueFalse),
            "fill_blank" => Some(Self::FillBlank),
            "short_answer" => Some(Self::ShortAnswer),
            _ => None,
        }
    }

    /// Short answers need a human and do not count towards the automatic score.
    pub fn is_auto_graded(&self) -> bool {
        !matches!(self, Self::ShortAnswer)
    }
}

impl Quiz {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn course_id(&self) -> Uuid {
        self.course_id
    }

    pub fn lesson_id(&self) -> Option<Uuid> {
        self.lesson_id
    }

    pub fn passing_score(&self) -> i32 {
        self.passing_score
    }

    pub fn allow_retry(&self) -> bool {
        self.allow_retry
    }

    pub fn shuffle_questions(&self) -> bool {
        self.shuffle_questions
    }

    pub fn is_published(&self) -> bool {
        self.is_published
    }
}

impl QuizQuestion {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> Option<QuestionKind> {
        QuestionKind::parse(&self.kind)
    }

    pub fn kind_str(&self) -> &str {
        &self.kind
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn points(&self) -> i32 {
        self.points
    }

    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    pub fn accepted_text(&self) -> Option<&str> {
        self.accepted_text.as_deref()
    }
}

impl QuizAnswer {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn question_id(&self) -> Uuid {
        self.question_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_correct(&self) -> bool {
        self.is_correct
    }
}

impl QuizAttempt {
    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn passed(&self) -> bool {
        self.passed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QuizAnswerCreate {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QuizQuestionCreate {
    /// `multiple_choice`, `multiple_answer`, `true_false`, `fill_blank` or `short_answer`
    pub kind: String,
    pub prompt: String,
    pub points: Option<i32>,
    pub explanation: Option<String>,
    /// Expected text for `true_false` and `fill_blank`; alternatives separated by `|`.
    pub accepted_text: Option<String>,
    #[serde(default)]
    pub answers: Vec<QuizAnswerCreate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QuizCreate {
    pub course_id: Uuid,
    pub lesson_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub time_limit_minutes: Option<i32>,
    pub passing_score: Option<i32>,
    pub allow_retry: Option<bool>,
    #[serde(default)]
    pub shuffle_questions: bool,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub questions: Vec<QuizQuestionCreate>,
}

/// Upper bound for the points a single question may carry.
pub const MAX_QUESTION_POINTS: i32 = 1000;

impl QuizQuestionCreate {
    fn is_valid(&self) -> bool {
        let Some(kind) = QuestionKind::parse(&self.kind) else {
            return false;
        };
        let correct = self.answers.iter().filter(|a| a.is_correct).count();
        let shape_ok = match kind {
            QuestionKind::MultipleChoice => correct == 1,
            QuestionKind::MultipleAnswer => correct >= 1,
            QuestionKind::TrueFalse => self.accepted_text.is_some() || correct == 1,
            QuestionKind::FillBlank => self.accepted_text.as_deref().is_some_and(|t| !t.trim().is_empty()),
            QuestionKind::ShortAnswer => true,
        };
        shape_ok
            && !self.prompt.trim().is_empty()
            && (0..=MAX_QUESTION_POINTS).contains(&self.points.unwrap_or(1))
    }
}

impl QuizCreate {
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty()
            && self.passing_score.is_none_or(|s| (0..=100).contains(&s))
            && self.questions.iter().all(QuizQuestionCreate::is_valid)
    }
}

/// A question together with its answer options, in display order.
#[derive(Debug, Clone)]
pub struct QuestionWithAnswers {
    pub question: QuizQuestion,
    pub answers: Vec<QuizAnswer>,
}

impl Quiz {
    pub async fn find_by_id(mm: &ModelManager, id: Uuid) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM quizzes WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    /// Published quizzes of a course and/or lesson.
    pub async fn list_published(
        mm: &ModelManager,
        course_id: Option<Uuid>,
        lesson_id: Option<Uuid>,
    ) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            r#"
            SELECT * FROM quizzes
            WHERE is_published
              AND ($1::UUID IS NULL OR course_id = $1)
              AND ($2::UUID IS NULL OR lesson_id = $2)
            ORDER BY created_at
            "#,
        )
        .bind(course_id)
        .bind(lesson_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    /// Inserts the quiz with all questions and answer options in one transaction.
    pub async fn create(mm: &ModelManager, data: QuizCreate) -> DatabaseResult<Self> {
        let mut tx = mm.executor().begin().await?;

        let quiz: Self = sqlx::query_as(
            r#"
            INSERT INTO quizzes
                (id, course_id, lesson_id, title, description, time_limit_minutes, passing_score,
                 allow_retry, shuffle_questions, is_published)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.course_id)
        .bind(data.lesson_id)
        .bind(data.title.trim())
        .bind(&data.description)
        .bind(data.time_limit_minutes)
        .bind(data.passing_score.unwrap_or(70))
        .bind(data.allow_retry.unwrap_or(true))
        .bind(data.shuffle_questions)
        .bind(data.is_published)
        .fetch_one(&mut *tx)
        .await?;

        for (q_index, question) in data.questions.iter().enumerate() {
            let question_id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO quiz_questions
                    (id, quiz_id, kind, prompt, points, explanation, accepted_text, order_index)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(question_id)
            .bind(quiz.id)
            .bind(&question.kind)
            .bind(question.prompt.trim())
            .bind(question.points.unwrap_or(1))
            .bind(&question.explanation)
            .bind(&question.accepted_text)
            .bind(q_index as i32)
            .execute(&mut *tx)
            .await?;

            for (a_index, answer) in question.answers.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO quiz_answers (id, question_id, text, is_correct, order_index) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(Uuid::new_v4())
                .bind(question_id)
                .bind(&answer.text)
                .bind(answer.is_correct)
                .bind(a_index as i32)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(quiz)
    }

    pub async fn questions(&self, mm: &ModelManager) -> DatabaseResult<Vec<QuestionWithAnswers>> {
        let (questions, answers): (Vec<QuizQuestion>, Vec<QuizAnswer>) = tokio::try_join!(
            async {
                sqlx::query_as::<_, QuizQuestion>("SELECT * FROM quiz_questions WHERE quiz_id = $1 ORDER BY order_index")
                    .bind(self.id)
                    .fetch_all(mm.executor())
                    .await
            },
            async {
                sqlx::query_as::<_, QuizAnswer>(
                    r#"
                    SELECT a.* FROM quiz_answers a
                    JOIN quiz_questions q ON q.id = a.question_id
                    WHERE q.quiz_id = $1
                    ORDER BY a.order_index
                    "#,
                )
                .bind(self.id)
                .fetch_all(mm.executor())
                .await
            },
        )?;

        let mut by_question: HashMap<Uuid, Vec<QuizAnswer>> = HashMap::new();
        for answer in answers {
            by_question.entry(answer.question_id).or_default().push(answer);
        }

        Ok(questions
            .into_iter()
            .map(|question| {
                let answers = by_question.remove(&question.id).unwrap_or_default();
                QuestionWithAnswers { question, answers }
            })
            .collect())
    }
}

/// One submitted answer: an option id, a list of option ids, free text or a boolean.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum SubmittedAnswer {
    Flag(bool),
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QuizScore {
    pub earned_points: i64,
    pub possible_points: i64,
    /// Percentage, 0 to 100.
    pub score: i32,
    pub passed: bool,
}

fn parse_ids(values: &[String]) -> HashSet<Uuid> {
    values.iter().filter_map(|v| v.parse().ok()).collect()
}

fn matches_accepted(accepted: Option<&str>, given: &str) -> bool {
    let given = given.trim().to_lowercase();
    accepted.is_some_and(|accepted| {
        accepted
            .split('|')
            .any(|candidate| candidate.trim().to_lowercase() == given)
    })
}

fn is_correct(entry: &QuestionWithAnswers, kind: QuestionKind, submitted: &SubmittedAnswer) -> bool {
    let correct_ids: HashSet<Uuid> = entry
        .answers
        .iter()
        .filter(|a| a.is_correct)
        .map(|a| a.id)
        .collect();

    match (kind, submitted) {
        (QuestionKind::MultipleChoice, SubmittedAnswer::One(id)) => {
            id.parse::<Uuid>().is_ok_and(|id| correct_ids.contains(&id))
        }
        (QuestionKind::MultipleAnswer, SubmittedAnswer::Many(ids)) => {
            !correct_ids.is_empty() && parse_ids(ids) == correct_ids
        }
        (QuestionKind::TrueFalse, SubmittedAnswer::Flag(flag)) => {
            matches_accepted(entry.question.accepted_text(), if *flag { "true" } else { "false" })
        }
        (QuestionKind::TrueFalse, SubmittedAnswer::One(value)) => match value.parse::<Uuid>() {
            Ok(id) => correct_ids.contains(&id),
            Err(_) => matches_accepted(entry.question.accepted_text(), value),
        },
        (QuestionKind::FillBlank, SubmittedAnswer::One(text)) => {
            matches_accepted(entry.question.accepted_text(), text)
        }
        _ => false,
    }
}

/// Grades submitted answers, keyed by question id, against the answer key.
pub fn score_attempt(
    questions: &[QuestionWithAnswers],
    submitted: &HashMap<Uuid, SubmittedAnswer>,
    passing_score: i32,
) -> QuizScore {
    let mut earned: i64 = 0;
    let mut possible: i64 = 0;

    for entry in questions {
        let Some(kind) = entry.question.kind().filter(QuestionKind::is_auto_graded) else {
            continue;
        };
        let points = i64::from(entry.question.points.max(0));
        possible += points;
        if submitted
            .get(&entry.question.id)
            .is_some_and(|answer| is_correct(entry, kind, answer))
        {
            earned += points;
        }
    }

    let score = if possible == 0 {
        100
    } else {
        ((earned * 200 + possible) / (possible * 2)) as i32
    };

    QuizScore {
        earned_points: earned,
        possible_points: possible,
        score,
        passed: score >= passing_score,
    }
}

impl QuizAttempt {
    pub async fn all_for_user(
        mm: &ModelManager,
        quiz_id: Uuid,
        user_id: Uuid,
    ) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            "SELECT * FROM quiz_attempts WHERE quiz_id = $1 AND user_id = $2 ORDER BY attempt_number DESC",
        )
        .bind(quiz_id)
        .bind(user_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    /// Mean score over every attempt the user made, 0 without attempts.
    pub async fn average_score_for_user(mm: &ModelManager, user_id: Uuid) -> DatabaseResult<i32> {
        let result: i32 = sqlx::query_scalar(
            "SELECT COALESCE(ROUND(AVG(score)), 0)::INTEGER FROM quiz_attempts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(mm.executor())
        .await?;
        Ok(result)
    }

    /// Stores the next attempt; numbering starts at 1 per user and quiz.
    pub async fn record(
        mm: &ModelManager,
        quiz_id: Uuid,
        user_id: Uuid,
        answers: &HashMap<Uuid, SubmittedAnswer>,
        score: QuizScore,
        started_at: Option<DateTime<Utc>>,
    ) -> DatabaseResult<Self> {
        let answers = serde_json::to_value(answers)?;
        let attempt = sqlx::query_as(
            r#"
            INSERT INTO quiz_attempts
                (id, quiz_id, user_id, answers, score, passed, attempt_number, started_at)
            VALUES ($1, $2, $3, $4, $5, $6,
                (SELECT COALESCE(MAX(attempt_number), 0) + 1 FROM quiz_attempts WHERE quiz_id = $2 AND user_id = $3),
                COALESCE($7, now()))
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(quiz_id)
        .bind(user_id)
        .bind(answers)
        .bind(score.score)
        .bind(score.passed)
        .bind(started_at)
        .fetch_one(mm.executor())
        .await?;
        Ok(attempt)
    }
}
