use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult};

use super::unique_slug;

pub const DEFAULT_MAX_MEMBERS: i32 = 50;
pub const INVITATION_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Team {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    logo_url: Option<String>,
    owner_id: Uuid,
    max_members: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct TeamMember {
    id: Uuid,
    team_id: Uuid,
    user_id: Uuid,
    role: String,
    invited_by: Option<Uuid>,
    joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct TeamInvitation {
    id: Uuid,
    team_id: Uuid,
    email: String,
    role: String,
    #[serde(skip)]
    token: String,
    status: String,
    invited_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
}

impl ResourceTyped for Team {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Team
    }
}

impl ResourceTyped for TeamMember {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::TeamMember
    }
}

impl ResourceTyped for TeamInvitation {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::TeamInvitation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Owner,
    Admin,
    Member,
}

impl From<&str> for TeamRole {
    fn from(value: &str) -> Self {
        match value {
            "owner" => Self::Owner,
            "admin" => Self::Admin,
            _ => Self::Member,
        }
    }
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    /// Owners and admins manage members and invitations.
    pub fn can_manage(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }

    /// Role granted for a requested value: `admin` only when asked for explicitly.
    pub fn grantable(requested: Option<&str>) -> Self {
        match requested {
            Some("admin") => Self::Admin,
            _ => Self::Member,
        }
    }
}

impl Team {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn max_members(&self) -> i32 {
        self.max_members
    }
}

impl TeamMember {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn role(&self) -> TeamRole {
        TeamRole::from(self.role.as_str())
    }
}

impl TeamInvitation {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn team_id(&self) -> Uuid {
        self.team_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn role(&self) -> TeamRole {
        TeamRole::from(self.role.as_str())
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Why this invitation can no longer be used at `now`, if anything.
    pub fn check_usable(&self, now: DateTime<Utc>) -> Result<(), InvitationProblem> {
        if self.status != "pending" {
            return Err(InvitationProblem::NotPending);
        }
        if self.expires_at <= now {
            return Err(InvitationProblem::Expired);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationProblem {
    NotPending,
    Expired,
}

impl InvitationProblem {
    pub fn message(&self) -> &'static str {
        match self {
            Self::NotPending => "Invitation is no longer valid",
            Self::Expired => "Invitation has expired",
        }
    }
}

/// Seats are taken by members and by pending invitations alike.
pub fn has_capacity(members: i64, pending_invitations: i64, max_members: i32) -> bool {
    members + pending_invitations < i64::from(max_members)
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TeamCreate {
    pub name: String,
    pub description: Option<String>,
    pub max_members: Option<i32>,
}

impl TeamCreate {
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && self.max_members.is_none_or(|m| m > 0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TeamUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub max_members: Option<i32>,
    pub is_active: Option<bool>,
}

/// A team as seen by one of its members.
#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct TeamSummaryRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub owner_id: Uuid,
    pub max_members: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub member_count: i64,
    pub user_role: String,
}

#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct TeamMemberRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

impl Team {
    pub async fn find_by_id(mm: &ModelManager, id: Uuid) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM teams WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    /// Creates the team with `owner_id` as its owner member.
    #[tracing::instrument(skip(mm, data), fields(name = %data.name))]
    pub async fn create(mm: &ModelManager, owner_id: Uuid, data: TeamCreate) -> DatabaseResult<Self> {
        let slug = unique_slug(mm, "teams", &data.name, "team").await?;
        let team: Self = sqlx::query_as(
            r#"
            INSERT INTO teams (id, name, slug, description, owner_id, max_members)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.name.trim())
        .bind(&slug)
        .bind(&data.description)
        .bind(owner_id)
        .bind(data.max_members.unwrap_or(DEFAULT_MAX_MEMBERS))
        .fetch_one(mm.executor())
        .await?;

        if let Err(e) = TeamMember::add(mm, team.id, owner_id, TeamRole::Owner, None).await {
            tracing::warn!("owner membership failed, removing team {}", team.id);
            team.delete(mm).await?;
            return Err(e);
        }

        Ok(team)
    }

    pub async fn update(self, mm: &ModelManager, data: TeamUpdate) -> DatabaseResult<Self> {
        let team = sqlx::query_as(
            r#"
            UPDATE teams SET
                name = COALESCE($1, name),
                description = COALESCE($2, description),
                logo_url = COALESCE($3, logo_url),
                max_members = COALESCE($4, max_members),
                is_active = COALESCE($5, is_active),
                updated_at = now()
            WHERE id = $6
            RETURNING *
            "#,
        )
        .bind(data.name.as_deref().map(str::trim))
        .bind(&data.description)
        .bind(&data.logo_url)
        .bind(data.max_members)
        .bind(data.is_active)
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;
        Ok(team)
    }

    pub async fn delete(self, mm: &ModelManager) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM teams WHERE id = $1")
            .bind(self.id)
            .execute(mm.executor())
            .await?;
        Ok(())
    }

    pub async fn member_count(&self, mm: &ModelManager) -> DatabaseResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM team_members WHERE team_id = $1")
            .bind(self.id)
            .fetch_one(mm.executor())
            .await?;
        Ok(count)
    }

    pub async fn pending_invitation_count(&self, mm: &ModelManager) -> DatabaseResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM team_invitations WHERE team_id = $1 AND status = 'pending' AND expires_at > now()",
        )
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;
        Ok(count)
    }
}

impl TeamSummaryRow {
    pub async fn all_for_user(mm: &ModelManager, user_id: Uuid) -> DatabaseResult<Vec<Self>> {
        let rows = sqlx::query_as(
            r#"
            SELECT
                t.id, t.name, t.slug, t.description, t.logo_url, t.owner_id, t.max_members,
                t.is_active, t.created_at,
                (SELECT COUNT(*) FROM team_members c WHERE c.team_id = t.id) AS member_count,
                m.role AS user_role
            FROM teams t
            JOIN team_members m ON m.team_id = t.id AND m.user_id = $1
            ORDER BY t.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(rows)
    }
}

impl TeamMember {
    pub async fn find_by_id(mm: &ModelManager, team_id: Uuid, id: Uuid) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM team_members WHERE team_id = $1 AND id = $2")
            .bind(team_id)
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn find(mm: &ModelManager, team_id: Uuid, user_id: Uuid) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM team_members WHERE team_id = $1 AND user_id = $2")
            .bind(team_id)
            .bind(user_id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    /// Fails with a unique violation when the user is already a member.
    pub async fn add(
        mm: &ModelManager,
        team_id: Uuid,
        user_id: Uuid,
        role: TeamRole,
        invited_by: Option<Uuid>,
    ) -> DatabaseResult<Self> {
        let member = sqlx::query_as(
            r#"
            INSERT INTO team_members (id, team_id, user_id, role, invited_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(team_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(invited_by)
        .fetch_one(mm.executor())
        .await?;
        Ok(member)
    }

    pub async fn set_role(self, mm: &ModelManager, role: TeamRole) -> DatabaseResult<Self> {
        let member = sqlx::query_as("UPDATE team_members SET role = $1 WHERE id = $2 RETURNING *")
            .bind(role.as_str())
            .bind(self.id)
            .fetch_one(mm.executor())
            .await?;
        Ok(member)
    }

    pub async fn remove(self, mm: &ModelManager) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM team_members WHERE id = $1")
            .bind(self.id)
            .execute(mm.executor())
            .await?;
        Ok(())
    }
}

impl TeamMemberRow {
    pub async fn all_for_team(mm: &ModelManager, team_id: Uuid) -> DatabaseResult<Vec<Self>> {
        let rows = sqlx::query_as(
            r#"
            SELECT m.id, m.user_id, u.full_name, u.email, m.role, m.joined_at
            FROM team_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.team_id = $1
            ORDER BY CASE m.role WHEN 'owner' THEN 0 WHEN 'admin' THEN 1 ELSE 2 END, m.joined_at
            "#,
        )
        .bind(team_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(rows)
    }
}

impl TeamInvitation {
    pub async fn find_by_token(mm: &ModelManager, token: &str) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM team_invitations WHERE token = $1")
            .bind(token)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn find_pending_for_email(
        mm: &ModelManager,
        team_id: Uuid,
        email: &str,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as(
            r#"
            SELECT * FROM team_invitations
            WHERE team_id = $1 AND email = $2 AND status = 'pending' AND expires_at > now()
            "#,
        )
        .bind(team_id)
        .bind(email)
        .fetch_optional(mm.executor())
        .await?;
        Ok(result)
    }

    pub async fn pending_for_team(mm: &ModelManager, team_id: Uuid) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            r#"
            SELECT * FROM team_invitations
            WHERE team_id = $1 AND status = 'pending'
            ORDER BY created_at DESC
            "#,
        )
        .bind(team_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    pub async fn create(
        mm: &ModelManager,
        team_id: Uuid,
        email: &str,
        role: TeamRole,
        token: &str,
        invited_by: Uuid,
    ) -> DatabaseResult<Self> {
        let invitation = sqlx::query_as(
            r#"
            INSERT INTO team_invitations (id, team_id, email, role, token, invited_by, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(team_id)
        .bind(email)
        .bind(role.as_str())
        .bind(token)
        .bind(invited_by)
        .bind(Utc::now() + Duration::days(INVITATION_TTL_DAYS))
        .fetch_one(mm.executor())
        .await?;
        Ok(invitation)
    }

    pub async fn accept(self, mm: &ModelManager) -> DatabaseResult<Self> {
        let invitation = sqlx::query_as(
            "UPDATE team_invitations SET status = 'accepted', accepted_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;
        Ok(invitation)
    }

    /// Returns the number of invitations revoked (0 or 1).
    pub async fn revoke(mm: &ModelManager, team_id: Uuid, id: Uuid) -> DatabaseResult<u64> {
        let result = sqlx::query(
            "UPDATE team_invitations SET status = 'revoked' WHERE team_id = $1 AND id = $2 AND status = 'pending'",
        )
        .bind(team_id)
        .bind(id)
        .execute(mm.executor())
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn invitation(status: &str, expires_in: Duration) -> TeamInvitation {
        let now = Utc::now();
        TeamInvitation {
            id: Uuid::new_v4(),
            team_id: Uuid::new_v4(),
            email: String::from("dev@example.com"),
            role: String::from("member"),
            token: String::from("token"),
            status: status.to_string(),
            invited_by: None,
            created_at: now,
            expires_at: now + expires_in,
            accepted_at: None,
        }
    }

    #[test]
    fn invitation_usable_test() {
        let now = Utc::now();
        assert_eq!(invitation("pending", Duration::days(1)).check_usable(now), Ok(()));
        assert_eq!(
            invitation("accepted", Duration::days(1)).check_usable(now),
            Err(InvitationProblem::NotPending)
        );
        assert_eq!(
            invitation("pending", Duration::days(-1)).check_usable(now),
            Err(InvitationProblem::Expired)
        );
    }

    #[test]
    fn capacity_counts_pending_invitations_test() {
        assert!(has_capacity(3, 1, 5));
        assert!(!has_capacity(3, 2, 5));
        assert!(!has_capacity(5, 0, 5));
    }

    #[test]
    fn team_role_test() {
        assert_eq!(TeamRole::grantable(Some("admin")), TeamRole::Admin);
        assert_eq!(TeamRole::grantable(Some("owner")), TeamRole::Member);
        assert_eq!(TeamRole::grantable(None), TeamRole::Member);
        assert!(TeamRole::Owner.can_manage());
        assert!(!TeamRole::Member.can_manage());
    }
}
