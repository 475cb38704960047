//! Student dashboard: per-course progress, certificates and learning statistics.
//!
//! Learning time is the recorded lesson watch time. A streak counts consecutive calendar
//! days (UTC) with lesson activity and is broken once neither today nor yesterday has any.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::{
    ModelManager,
    entity::{CertificateDetailsRow, QuizAttempt},
    error::DatabaseResult,
};

/// Enrollment with its course and lesson counters.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct DashboardCourseRow {
    pub enrollment_id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    pub course_slug: String,
    pub thumbnail_url: Option<String>,
    pub category: Option<String>,
    pub level: String,
    pub instructor_name: Option<String>,
    pub status: String,
    pub progress_percentage: i32,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub completed_lessons: i64,
    pub total_lessons: i64,
}

impl DashboardCourseRow {
    pub async fn all_for_user(mm: &ModelManager, user_id: Uuid) -> DatabaseResult<Vec<Self>> {
        let rows = sqlx::query_as(
            r#"
            SELECT
                e.id AS enrollment_id, e.course_id, c.title AS course_title,
                c.slug AS course_slug, c.thumbnail_url, c.category, c.level,
                u.full_name AS instructor_name,
                e.status, e.progress_percentage, e.enrolled_at, e.completed_at, e.last_accessed_at,
                (SELECT COUNT(*) FROM lesson_progress lp
                    WHERE lp.user_id = e.user_id AND lp.course_id = e.course_id AND lp.is_completed)
                    AS completed_lessons,
                (SELECT COUNT(*) FROM lessons l WHERE l.course_id = e.course_id) AS total_lessons
            FROM enrollments e
            JOIN courses c ON c.id = e.course_id
            LEFT JOIN users u ON u.id = c.instructor_id
            WHERE e.user_id = $1 AND e.status IN ('active', 'completed')
            ORDER BY COALESCE(e.last_accessed_at, e.enrolled_at) DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(rows)
    }
}

/// One lesson progress row reduced to what the statistics need.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct LessonActivity {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub watch_time_seconds: i32,
}

impl LessonActivity {
    pub async fn all_for_user(mm: &ModelManager, user_id: Uuid) -> DatabaseResult<Vec<Self>> {
        let rows = sqlx::query_as(
            "SELECT created_at, updated_at, watch_time_seconds FROM lesson_progress WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(rows)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DayHours {
    pub day: String,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CategoryHours {
    pub category: String,
    pub hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LearningStats {
    pub total_courses_enrolled: usize,
    pub courses_completed: usize,
    pub certificates_earned: usize,
    pub total_hours_learned: f64,
    pub current_streak: u32,
    pub average_quiz_score: i32,
    pub learning_by_day: Vec<DayHours>,
    pub category_distribution: Vec<CategoryHours>,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct StudentDashboard {
    pub courses: Vec<DashboardCourseRow>,
    pub certificates: Vec<CertificateDetailsRow>,
    pub stats: LearningStats,
}

/// Assumed study time per completed lesson when splitting hours by category.
const MINUTES_PER_COMPLETED_LESSON: i64 = 10;
const TOP_CATEGORIES: usize = 5;

pub async fn student_dashboard(mm: &ModelManager, user_id: Uuid) -> DatabaseResult<StudentDashboard> {
    let (courses, certificates, activity, average_quiz_score) = tokio::try_join!(
        DashboardCourseRow::all_for_user(mm, user_id),
        CertificateDetailsRow::all_for_user(mm, user_id),
        LessonActivity::all_for_user(mm, user_id),
        QuizAttempt::average_score_for_user(mm, user_id),
    )?;

    let today = Utc::now().date_naive();
    let total_seconds: i64 = activity.iter().map(|a| i64::from(a.watch_time_seconds.max(0))).sum();

    let stats = LearningStats {
        total_courses_enrolled: courses.len(),
        courses_completed: courses.iter().filter(|c| c.status == "completed").count(),
        certificates_earned: certificates.len(),
        total_hours_learned: hours(total_seconds),
        current_streak: learning_streak(activity_days(&activity), today),
        average_quiz_score,
        learning_by_day: hours_by_weekday(&activity),
        category_distribution: hours_by_category(&courses),
    };

    Ok(StudentDashboard {
        courses,
        certificates,
        stats,
    })
}

/// Seconds as hours, rounded to one decimal.
fn hours(seconds: i64) -> f64 {
    (seconds as f64 / 360.0).round() / 10.0
}

fn activity_days(activity: &[LessonActivity]) -> BTreeSet<NaiveDate> {
    activity
        .iter()
        .flat_map(|a| [a.created_at.date_naive(), a.updated_at.date_naive()])
        .collect()
}

pub fn learning_streak(days: BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let yesterday = today.checked_sub_days(Days::new(1));
    let mut cursor = if days.contains(&today) {
        Some(today)
    } else if yesterday.is_some_and(|d| days.contains(&d)) {
        yesterday
    } else {
        return 0;
    };

    let mut streak = 0;
    while let Some(day) = cursor.filter(|d| days.contains(d)) {
        streak += 1;
        cursor = day.checked_sub_days(Days::new(1));
    }
    streak
}

/// Watch time grouped by the weekday the lesson was started, Monday first.
pub fn hours_by_weekday(activity: &[LessonActivity]) -> Vec<DayHours> {
    let mut seconds = [0i64; 7];
    for a in activity {
        let slot = a.created_at.weekday().num_days_from_monday() as usize;
        seconds[slot] += i64::from(a.watch_time_seconds.max(0));
    }

    let mut day = Weekday::Mon;
    seconds
        .iter()
        .map(|s| {
            let entry = DayHours {
                day: day.to_string(),
                hours: hours(*s),
            };
            day = day.succ();
            entry
        })
        .collect()
}

pub fn hours_by_category(courses: &[DashboardCourseRow]) -> Vec<CategoryHours> {
    let mut minutes: BTreeMap<&str, i64> = BTreeMap::new();
    for course in courses {
        let category = course.category.as_deref().unwrap_or("Other");
        *minutes.entry(category).or_default() += course.completed_lessons * MINUTES_PER_COMPLETED_LESSON;
    }

    let mut result: Vec<CategoryHours> = minutes
        .into_iter()
        .map(|(category, m)| CategoryHours {
            category: category.to_string(),
            hours: hours(m * 60),
        })
        .collect();
    result.sort_by(|a, b| b.hours.total_cmp(&a.hours));
    result.truncate(TOP_CATEGORIES);
    result
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).expect("date")
    }

    fn course(category: Option<&str>, completed: i64) -> DashboardCourseRow {
        DashboardCourseRow {
            enrollment_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            course_title: String::from("Course"),
            course_slug: String::from("course"),
            thumbnail_url: None,
            category: category.map(str::to_string),
            level: String::from("beginner"),
            instructor_name: None,
            status: String::from("active"),
            progress_percentage: 0,
            enrolled_at: Utc::now(),
            completed_at: None,
            last_accessed_at: None,
            completed_lessons: completed,
            total_lessons: 10,
        }
    }

    #[test]
    fn learning_streak_test() {
        let days: BTreeSet<_> = [day(10), day(9), day(8), day(5)].into();
        assert_eq!(learning_streak(days.clone(), day(10)), 3);
        // yesterday still counts
        assert_eq!(learning_streak(days.clone(), day(11)), 3);
        assert_eq!(learning_streak(days, day(12)), 0);
        assert_eq!(learning_streak(BTreeSet::new(), day(12)), 0);
    }

    #[test]
    fn hours_by_weekday_test() {
        // 2025-03-03 is a Monday
        let monday = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).single().expect("time");
        let sunday = Utc.with_ymd_and_hms(2025, 3, 9, 21, 0, 0).single().expect("time");
        let activity = [
            LessonActivity { created_at: monday, updated_at: monday, watch_time_seconds: 5400 },
            LessonActivity { created_at: sunday, updated_at: sunday, watch_time_seconds: 720 },
            LessonActivity { created_at: sunday, updated_at: sunday, watch_time_seconds: -30 },
        ];

        let by_day = hours_by_weekday(&activity);
        assert_eq!(by_day.len(), 7);
        assert_eq!(by_day[0], DayHours { day: "Mon".into(), hours: 1.5 });
        assert_eq!(by_day[6], DayHours { day: "Sun".into(), hours: 0.2 });
        assert!(by_day[1..6].iter().all(|d| d.hours == 0.0));
    }

    #[test]
    fn hours_by_category_test() {
        let courses = [
            course(Some("Systems"), 6),
            course(Some("Web"), 3),
            course(Some("Systems"), 3),
            course(None, 0),
        ];
        let split = hours_by_category(&courses);
        assert_eq!(split[0], CategoryHours { category: "Systems".into(), hours: 1.5 });
        assert_eq!(split[1], CategoryHours { category: "Web".into(), hours: 0.5 });
        assert_eq!(split[2].category, "Other");
    }
}
