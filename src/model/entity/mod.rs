mod user;
pub use user::{UserEntity, UserEntityCreateUpdate, normalize_email};

mod course;
pub use course::{CatalogFilter, CatalogRow, Course, CourseCreate, CourseStatus};

mod module;
pub use module::{CourseModule, CourseModuleCreate};

mod lesson;
pub use lesson::{Lesson, LessonCreate};

mod enrollment;
pub use enrollment::{Enrollment, EnrollmentWithCourseRow, progress_percentage};

mod lesson_progress;
pub use lesson_progress::LessonProgress;

mod bookmark;
pub use bookmark::{Bookmark, BookmarkRow};

mod certificate;
pub use certificate::{Certificate, CertificateDetailsRow, CertificateIssuer};

mod quiz;
pub use quiz::{
    QuestionKind, QuestionWithAnswers, Quiz, QuizAnswer, QuizAnswerCreate, QuizAttempt, QuizCreate,
    QuizQuestion, QuizQuestionCreate, QuizScore, SubmittedAnswer, score_attempt,
};

mod assignment;
pub use assignment::{
    Assignment, AssignmentCreate, AssignmentWithStatusRow, Submission, SubmissionPayload,
    SubmissionPlan, SubmissionType, plan_submission,
};

mod discussion;
pub use discussion::{
    Discussion, DiscussionCreate, DiscussionRow, DiscussionUpdate, Reply, ReplyRow,
};

mod team;
pub use team::{
    InvitationProblem, Team, TeamCreate, TeamInvitation, TeamMember, TeamMemberRow, TeamRole,
    TeamSummaryRow, TeamUpdate, has_capacity,
};

mod notification;
pub use notification::{NewNotification, Notification, NotificationFilter, NotificationKind};

mod payment;
pub use payment::{Payment, PaymentHistoryRow, PaymentStatus};

mod live_training;
pub use live_training::{
    LiveTraining, LiveTrainingCreate, LiveTrainingFilter, LiveTrainingRow, LiveTrainingUpdate,
};

use crate::model::{ModelManager, error::DatabaseResult};
use crate::utils::slug::{slugify, with_suffix};

/// First free slug derived from `source` in `table`, suffixing `-1`, `-2`, ... on collision.
pub(crate) async fn unique_slug(
    mm: &ModelManager,
    table: &'static str,
    source: &str,
    fallback: &str,
) -> DatabaseResult<String> {
    let base = match slugify(source) {
        s if s.is_empty() => fallback.to_string(),
        s => s,
    };
    let query = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE slug = $1)");

    let mut attempt = 0;
    loop {
        let candidate = with_suffix(&base, attempt);
        let taken: bool = sqlx::query_scalar(&query)
            .bind(&candidate)
            .fetch_one(mm.executor())
            .await?;
        if !taken {
            return Ok(candidate);
        }
        attempt += 1;
    }
}
