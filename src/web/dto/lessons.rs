use serde::Serialize;

use crate::model::entity::{Lesson, LessonProgress};

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LessonResponse {
    #[serde(flatten)]
    lesson: Lesson,
    /// `None` for anonymous previews and lessons never opened.
    progress: Option<LessonProgress>,
}

impl LessonResponse {
    pub fn new(lesson: Lesson, progress: Option<LessonProgress>) -> Self {
        Self { lesson, progress }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LessonNotes {
    notes: Option<String>,
}

impl From<Option<&LessonProgress>> for LessonNotes {
    fn from(progress: Option<&LessonProgress>) -> Self {
        Self {
            notes: progress.and_then(|p| p.notes()).map(str::to_string),
        }
    }
}
