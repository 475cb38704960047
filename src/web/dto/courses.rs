use serde::Serialize;
use uuid::Uuid;

use crate::model::entity::{Course, CourseModule, Enrollment, Lesson};

/// Syllabus entry; the lesson body is only served by the lesson endpoint.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct LessonOutline {
    id: Uuid,
    title: String,
    content_type: String,
    duration_minutes: i32,
    is_free_preview: bool,
    order_index: i32,
}

impl From<&Lesson> for LessonOutline {
    fn from(lesson: &Lesson) -> Self {
        Self {
            id: lesson.id(),
            title: lesson.title().to_string(),
            content_type: lesson.content_type().to_string(),
            duration_minutes: lesson.duration_minutes(),
            is_free_preview: lesson.is_free_preview(),
            order_index: lesson.order_index(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ModuleOutline {
    #[serde(flatten)]
    module: CourseModule,
    lessons: Vec<LessonOutline>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CourseDetailsResponse {
    course: Course,
    modules: Vec<ModuleOutline>,
    enrollment: Option<Enrollment>,
}

impl CourseDetailsResponse {
    /// Groups `lessons` under their modules, both already in syllabus order.
    pub fn new(
        course: Course,
        modules: Vec<CourseModule>,
        lessons: &[Lesson],
        enrollment: Option<Enrollment>,
    ) -> Self {
        let modules = modules
            .into_iter()
            .map(|module| {
                let lessons = lessons
                    .iter()
                    .filter(|l| l.module_id() == module.id())
                    .map(LessonOutline::from)
                    .collect();
                ModuleOutline { module, lessons }
            })
            .collect();

        Self {
            course,
            modules,
            enrollment,
        }
    }
}
