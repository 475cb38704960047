//! Lesson completion and the course progress that follows from it.
//!
//! Completing a lesson recomputes the enrollment percentage from the number of completed
//! lessons. An enrollment that reaches 100 is marked completed and receives its certificate,
//! which is issued at most once per user and course.

use serde::{Deserialize, Serialize};

use crate::model::{
    ModelManager,
    entity::{
        Certificate, CertificateIssuer, Enrollment, Lesson, LessonProgress, NewNotification,
        Notification, NotificationKind, progress_percentage,
    },
    error::DatabaseResult,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProgressSummary {
    pub completed_lessons: i64,
    pub total_lessons: i64,
    pub percentage: i32,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CompletionOutcome {
    pub already_completed: bool,
    pub progress: ProgressSummary,
    pub course_completed: bool,
    pub certificate: Option<Certificate>,
}

pub async fn summarize(mm: &ModelManager, enrollment: &Enrollment) -> DatabaseResult<ProgressSummary> {
    let (completed, total) = tokio::try_join!(
        LessonProgress::count_completed(mm, enrollment.user_id(), enrollment.course_id()),
        Lesson::count_by_course(mm, enrollment.course_id()),
    )?;

    Ok(ProgressSummary {
        completed_lessons: completed,
        total_lessons: total,
        percentage: progress_percentage(completed, total),
    })
}

/// Recomputes and stores the enrollment progress. At 100 the certificate is issued.
pub async fn refresh_progress(
    mm: &ModelManager,
    issuer: &CertificateIssuer,
    enrollment: Enrollment,
) -> DatabaseResult<(ProgressSummary, Enrollment, Option<Certificate>)> {
    let summary = summarize(mm, &enrollment).await?;
    let enrollment = enrollment.set_progress(mm, summary.percentage).await?;

    if summary.percentage < 100 {
        return Ok((summary, enrollment, None));
    }

    let (certificate, created) = Certificate::issue_once(mm, issuer, &enrollment).await?;
    if created {
        Notification::push_quietly(
            mm,
            enrollment.user_id(),
            NewNotification {
                kind: NotificationKind::CourseCompleted,
                title: String::from("Course completed"),
                message: format!(
                    "Congratulations! Your certificate {} is ready.",
                    certificate.certificate_number()
                ),
                action_url: Some(certificate.verification_url().to_string()),
            },
        )
        .await;
    }

    Ok((summary, enrollment, Some(certificate)))
}

/// Marks `lesson` completed for the enrollment's owner and refreshes course progress.
#[tracing::instrument(skip_all, fields(lesson_id = %lesson.id(), user_id = %enrollment.user_id()))]
pub async fn complete_lesson(
    mm: &ModelManager,
    issuer: &CertificateIssuer,
    enrollment: Enrollment,
    lesson: &Lesson,
) -> DatabaseResult<CompletionOutcome> {
    let existing = LessonProgress::find(mm, enrollment.user_id(), lesson.id()).await?;
    if existing.is_some_and(|p| p.is_completed()) {
        let progress = summarize(mm, &enrollment).await?;
        let certificate =
            Certificate::find_for(mm, enrollment.user_id(), enrollment.course_id()).await?;
        return Ok(CompletionOutcome {
            already_completed: true,
            progress,
            course_completed: progress.percentage >= 100,
            certificate,
        });
    }

    LessonProgress::mark_completed(mm, &enrollment, lesson).await?;
    let (progress, _, certificate) = refresh_progress(mm, issuer, enrollment).await?;
    tracing::debug!("lesson completed, course progress {}%", progress.percentage);

    Ok(CompletionOutcome {
        already_completed: false,
        progress,
        course_completed: progress.percentage >= 100,
        certificate,
    })
}
