use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::Config;
use crate::model::access::HasOwner;
use crate::model::entity::Enrollment;
use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult};
use crate::web::AuthenticatedUser;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Certificate {
    id: Uuid,
    user_id: Uuid,
    course_id: Uuid,
    enrollment_id: Option<Uuid>,
    certificate_number: String,
    verification_url: String,
    grade: String,
    issued_at: DateTime<Utc>,
}

impl ResourceTyped for Certificate {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Certificate
    }
}

impl Certificate {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn course_id(&self) -> Uuid {
        self.course_id
    }

    pub fn certificate_number(&self) -> &str {
        &self.certificate_number
    }

    pub fn verification_url(&self) -> &str {
        &self.verification_url
    }
}

const SERIAL_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SERIAL_LEN: usize = 6;

/// Builds certificate numbers and their public verification links.
#[derive(Debug, Clone)]
pub struct CertificateIssuer {
    prefix: String,
    public_url: String,
}

impl CertificateIssuer {
    pub fn new(prefix: impl Into<String>, public_url: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.app().certificate_prefix(), config.app().public_url())
    }

    /// `<prefix>-<unix millis>-<6 uppercase base36 chars>`
    pub fn number_at<R: Rng>(&self, now: DateTime<Utc>, rng: &mut R) -> String {
        let serial: String = (0..SERIAL_LEN)
            .map(|_| SERIAL_ALPHABET[rng.random_range(0..SERIAL_ALPHABET.len())] as char)
            .collect();
        format!("{}-{}-{}", self.prefix, now.timestamp_millis(), serial)
    }

    pub fn verification_url(&self, number: &str) -> String {
        format!("{}/verify/{}", self.public_url, number)
    }
}

impl Certificate {
    pub async fn find_by_id(mm: &ModelManager, id: Uuid) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM certificates WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn find_for(
        mm: &ModelManager,
        user_id: Uuid,
        course_id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM certificates WHERE user_id = $1 AND course_id = $2")
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    /// Issues the certificate for a completed enrollment exactly once.
    /// Returns the certificate and whether this call created it.
    #[tracing::instrument(skip(mm, issuer, enrollment), fields(enrollment_id = %enrollment.id()))]
    pub async fn issue_once(
        mm: &ModelManager,
        issuer: &CertificateIssuer,
        enrollment: &Enrollment,
    ) -> DatabaseResult<(Self, bool)> {
        if let Some(existing) = Self::find_for(mm, enrollment.user_id(), enrollment.course_id()).await? {
            return Ok((existing, false));
        }

        let number = issuer.number_at(Utc::now(), &mut rand::rng());
        let inserted: Option<Self> = sqlx::query_as(
            r#"
            INSERT INTO certificates
                (id, user_id, course_id, enrollment_id, certificate_number, verification_url, grade)
            VALUES ($1, $2, $3, $4, $5, $6, 'Pass')
            ON CONFLICT (user_id, course_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(enrollment.user_id())
        .bind(enrollment.course_id())
        .bind(enrollment.id())
        .bind(&number)
        .bind(issuer.verification_url(&number))
        .fetch_optional(mm.executor())
        .await?;

        match inserted {
            Some(certificate) => {
                tracing::info!("issued certificate {}", certificate.certificate_number);
                Ok((certificate, true))
            }
            // a concurrent request won the race
            None => {
                let existing: Self = sqlx::query_as(
                    "SELECT * FROM certificates WHERE user_id = $1 AND course_id = $2",
                )
                .bind(enrollment.user_id())
                .bind(enrollment.course_id())
                .fetch_one(mm.executor())
                .await?;
                Ok((existing, false))
            }
        }
    }
}

#[async_trait]
impl HasOwner for Certificate {
    type OwnerId = Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.user_id)
    }
}

/// Certificate joined with its course and student, for listings and public verification.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct CertificateDetailsRow {
    pub id: Uuid,
    pub certificate_number: String,
    pub verification_url: String,
    pub grade: String,
    pub issued_at: DateTime<Utc>,
    pub course_id: Uuid,
    pub course_title: String,
    pub course_slug: String,
    pub student_name: String,
}

const DETAILS_SELECT: &str = r#"
    SELECT
        cert.id, cert.certificate_number, cert.verification_url, cert.grade, cert.issued_at,
        c.id AS course_id, c.title AS course_title, c.slug AS course_slug,
        u.full_name AS student_name
    FROM certificates cert
    JOIN courses c ON c.id = cert.course_id
    JOIN users u ON u.id = cert.user_id
"#;

impl CertificateDetailsRow {
    pub async fn all_for_user(mm: &ModelManager, user_id: Uuid) -> DatabaseResult<Vec<Self>> {
        let rows = sqlx::query_as(&format!(
            "{DETAILS_SELECT} WHERE cert.user_id = $1 ORDER BY cert.issued_at DESC"
        ))
        .bind(user_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(rows)
    }

    pub async fn find_by_number(mm: &ModelManager, number: &str) -> DatabaseResult<Option<Self>> {
        let row = sqlx::query_as(&format!("{DETAILS_SELECT} WHERE cert.certificate_number = $1"))
            .bind(number)
            .fetch_optional(mm.executor())
            .await?;
        Ok(row)
    }

    pub async fn find_by_id(mm: &ModelManager, id: Uuid) -> DatabaseResult<Option<Self>> {
        let row = sqlx::query_as(&format!("{DETAILS_SELECT} WHERE cert.id = $1"))
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn certificate_number_format_test() {
        let issuer = CertificateIssuer::new("PHZR", "https://academy.example.com/");
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let number = issuer.number_at(now, &mut StdRng::seed_from_u64(7));

        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "PHZR");
        assert_eq!(parts[1], "1700000000123");
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn certificate_numbers_differ_test() {
        let issuer = CertificateIssuer::new("PHZR", "https://academy.example.com");
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(42);
        let a = issuer.number_at(now, &mut rng);
        let b = issuer.number_at(now, &mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn verification_url_test() {
        let issuer = CertificateIssuer::new("PHZR", "https://academy.example.com/");
        assert_eq!(
            issuer.verification_url("PHZR-1-ABCDEF"),
            "https://academy.example.com/verify/PHZR-1-ABCDEF"
        );
    }
}
