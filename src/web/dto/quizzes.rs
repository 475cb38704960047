use rand::{Rng, seq::SliceRandom};
use serde::Serialize;
use uuid::Uuid;

use crate::model::entity::{QuestionWithAnswers, Quiz, QuizAttempt};

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AnswerView {
    id: Uuid,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_correct: Option<bool>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct QuestionView {
    id: Uuid,
    kind: String,
    prompt: String,
    points: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accepted_text: Option<String>,
    answers: Vec<AnswerView>,
}

impl QuestionView {
    /// Correctness, accepted text and explanations are only kept when `reveal` is set.
    fn new(entry: QuestionWithAnswers, reveal: bool) -> Self {
        let question = entry.question;
        let answers = entry
            .answers
            .iter()
            .map(|a| AnswerView {
                id: a.id(),
                text: a.text().to_string(),
                is_correct: reveal.then(|| a.is_correct()),
            })
            .collect();

        Self {
            id: question.id(),
            kind: question.kind_str().to_string(),
            prompt: question.prompt().to_string(),
            points: question.points(),
            explanation: question.explanation().filter(|_| reveal).map(str::to_string),
            accepted_text: question.accepted_text().filter(|_| reveal).map(str::to_string),
            answers,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct QuizView {
    #[serde(flatten)]
    quiz: Quiz,
    questions: Vec<QuestionView>,
}

impl QuizView {
    pub fn new(quiz: Quiz, questions: Vec<QuestionWithAnswers>, reveal: bool) -> Self {
        let questions = questions
            .into_iter()
            .map(|q| QuestionView::new(q, reveal))
            .collect();
        Self { quiz, questions }
    }

    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.questions.shuffle(rng);
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AttemptHistory {
    attempts: Vec<QuizAttempt>,
    best_score: i32,
    attempt_count: usize,
    has_passed: bool,
}

impl From<Vec<QuizAttempt>> for AttemptHistory {
    fn from(attempts: Vec<QuizAttempt>) -> Self {
        Self {
            best_score: attempts.iter().map(QuizAttempt::score).max().unwrap_or(0),
            attempt_count: attempts.len(),
            has_passed: attempts.iter().any(QuizAttempt::passed),
            attempts,
        }
    }
}
