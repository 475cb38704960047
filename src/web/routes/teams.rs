use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::random_token,
    model::{
        CrudRepository, ResourceTyped,
        entity::{
            NewNotification, Notification, NotificationKind, Team, TeamCreate, TeamInvitation,
            TeamMember, TeamMemberRow, TeamRole, TeamSummaryRow, TeamUpdate, UserEntity,
            has_capacity, normalize_email,
        },
    },
    web::{AppState, AuthenticatedUser, RequestContext, WebError, WebResult, error::ErrorResponse, middlewares},
};

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TeamDetails {
    team: Team,
    members: Vec<TeamMemberRow>,
    user_role: Option<TeamRole>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct MemberAddBody {
    pub user_id: Uuid,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct MemberRoleBody {
    pub member_id: Uuid,
    pub role: String,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct MemberQuery {
    member_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct InviteBody {
    pub email: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct InvitationQuery {
    invitation_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct JoinQuery {
    token: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct JoinBody {
    pub token: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JoinPreview {
    team_id: Uuid,
    team_name: String,
    team_slug: String,
    email: String,
    role: TeamRole,
    expires_at: DateTime<Utc>,
    /// `None` when the caller is not signed in.
    email_match: Option<bool>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JoinResult {
    team_id: Uuid,
    already_member: bool,
    member: Option<TeamMember>,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(team_list_handler).post(team_create_handler))
        .route(
            "/join",
            get(join_preview_handler).post(join_accept_handler),
        )
        .route(
            "/{id}",
            get(team_get_handler)
                .patch(team_update_handler)
                .delete(team_delete_handler),
        )
        .route(
            "/{id}/members",
            get(member_list_handler)
                .post(member_add_handler)
                .patch(member_role_handler)
                .delete(member_remove_handler),
        )
        .route(
            "/{id}/invitations",
            get(invitation_list_handler)
                .post(invitation_create_handler)
                .delete(invitation_revoke_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

/// A team together with the caller's membership in it.
struct Membership {
    team: Team,
    member: Option<TeamMember>,
    is_platform_admin: bool,
}

impl Membership {
    async fn load(state: &AppState, user: &AuthenticatedUser, team_id: Uuid) -> WebResult<Self> {
        let team = Team::find_by_id(state.pool(), team_id)
            .await
            .map_err(|e| WebError::resource_fetch_error(Team::get_resource_type(), e))?
            .ok_or(WebError::resource_not_found(Team::get_resource_type()))?;

        let member = TeamMember::find(state.pool(), team.id(), user.user_id())
            .await
            .map_err(|e| WebError::resource_fetch_error(TeamMember::get_resource_type(), e))?;

        Ok(Self {
            team,
            member,
            is_platform_admin: user.is_admin(),
        })
    }

    fn role(&self) -> Option<TeamRole> {
        self.member.as_ref().map(TeamMember::role)
    }

    fn is_member(&self) -> bool {
        self.is_platform_admin || self.member.is_some()
    }

    fn can_manage(&self) -> bool {
        self.is_platform_admin || self.role().is_some_and(|r| r.can_manage())
    }

    fn is_owner(&self) -> bool {
        self.is_platform_admin || self.role() == Some(TeamRole::Owner)
    }

    fn require(&self, allowed: bool) -> WebResult<()> {
        if allowed {
            Ok(())
        } else {
            Err(WebError::resource_forbidden(Team::get_resource_type()))
        }
    }

    async fn has_free_seat(&self, state: &AppState) -> WebResult<bool> {
        let (members, pending) = tokio::try_join!(
            self.team.member_count(state.pool()),
            self.team.pending_invitation_count(state.pool()),
        )
        .map_err(|e| WebError::resource_fetch_error(Team::get_resource_type(), e))?;

        Ok(has_capacity(members, pending, self.team.max_members()))
    }
}

fn team_full() -> WebError {
    WebError::resource_bad_request_because(TeamMember::get_resource_type(), "Team has reached its member limit")
}

#[utoipa::path(
    get,
    path = "/api/v1/teams",
    responses(
        (status = 200, description = "Caller's teams with member count and role", body = Vec<TeamSummaryRow>),
        (status = 401, description = "Not signed in", body = ErrorResponse),
    ),
    tag = "teams",
    security(("cookie" = []))
)]
async fn team_list_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let teams = TeamSummaryRow::all_for_user(state.pool(), user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Team::get_resource_type(), e))?;

    Ok(Json(teams))
}

#[utoipa::path(
    post,
    path = "/api/v1/teams",
    request_body = TeamCreate,
    responses(
        (status = 200, description = "Team created, caller is its owner", body = Team),
        (status = 400, description = "Name missing", body = ErrorResponse),
    ),
    tag = "teams",
    security(("cookie" = []))
)]
async fn team_create_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<TeamCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    if !payload.is_valid() {
        return Err(WebError::resource_bad_request_because(
            Team::get_resource_type(),
            "Team name is required",
        ));
    }

    let team = Team::create(state.pool(), user.user_id(), payload)
        .await
        .map_err(|e| WebError::resource_fetch_error(Team::get_resource_type(), e))?;

    tracing::info!("team {} created as `{}`", team.id(), team.slug());
    Ok(Json(team))
}

#[utoipa::path(
    get,
    path = "/api/v1/teams/{id}",
    params(("id" = Uuid, Path, description = "ID of the team")),
    responses(
        (status = 200, description = "Team with members", body = TeamDetails),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "Team not found", body = ErrorResponse),
    ),
    tag = "teams",
    security(("cookie" = []))
)]
async fn team_get_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let membership = Membership::load(&state, user, id).await?;
    membership.require(membership.is_member())?;

    let members = TeamMemberRow::all_for_team(state.pool(), membership.team.id())
        .await
        .map_err(|e| WebError::resource_fetch_error(TeamMember::get_resource_type(), e))?;

    let user_role = membership.role();
    Ok(Json(TeamDetails {
        team: membership.team,
        members,
        user_role,
    }))
}

#[utoipa::path(
    patch,
    path = "/api/v1/teams/{id}",
    params(("id" = Uuid, Path, description = "ID of the team")),
    request_body = TeamUpdate,
    responses(
        (status = 200, description = "Team updated", body = Team),
        (status = 400, description = "Invalid values", body = ErrorResponse),
        (status = 403, description = "Not a team owner or admin", body = ErrorResponse),
    ),
    tag = "teams",
    security(("cookie" = []))
)]
async fn team_update_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TeamUpdate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let membership = Membership::load(&state, user, id).await?;
    membership.require(membership.can_manage())?;

    let name_ok = payload.name.as_deref().is_none_or(|n| !n.trim().is_empty());
    if !name_ok || payload.max_members.is_some_and(|m| m <= 0) {
        return Err(WebError::resource_bad_request(Team::get_resource_type()));
    }

    let team = membership
        .team
        .update(state.pool(), payload)
        .await
        .map_err(|e| WebError::resource_fetch_error(Team::get_resource_type(), e))?;

    Ok(Json(team))
}

#[utoipa::path(
    delete,
    path = "/api/v1/teams/{id}",
    params(("id" = Uuid, Path, description = "ID of the team")),
    responses(
        (status = 200, description = "Team deleted"),
        (status = 403, description = "Not the team owner", body = ErrorResponse),
        (status = 404, description = "Team not found", body = ErrorResponse),
    ),
    tag = "teams",
    security(("cookie" = []))
)]
async fn team_delete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let membership = Membership::load(&state, user, id).await?;
    membership.require(membership.is_owner())?;

    membership
        .team
        .delete(state.pool())
        .await
        .map_err(|e| WebError::resource_fetch_error(Team::get_resource_type(), e))?;

    Ok(StatusCode::OK)
}

#[utoipa::path(
    get,
    path = "/api/v1/teams/{id}/members",
    params(("id" = Uuid, Path, description = "ID of the team")),
    responses(
        (status = 200, description = "Members, owner first", body = Vec<TeamMemberRow>),
        (status = 403, description = "Not a member", body = ErrorResponse),
    ),
    tag = "teams",
    security(("cookie" = []))
)]
async fn member_list_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let membership = Membership::load(&state, user, id).await?;
    membership.require(membership.is_member())?;

    let members = TeamMemberRow::all_for_team(state.pool(), membership.team.id())
        .await
        .map_err(|e| WebError::resource_fetch_error(TeamMember::get_resource_type(), e))?;

    Ok(Json(members))
}

#[utoipa::path(
    post,
    path = "/api/v1/teams/{id}/members",
    params(("id" = Uuid, Path, description = "ID of the team")),
    request_body = MemberAddBody,
    responses(
        (status = 200, description = "Member added", body = TeamMember),
        (status = 400, description = "Team is full", body = ErrorResponse),
        (status = 403, description = "Not a team owner or admin", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 409, description = "Already a member", body = ErrorResponse),
    ),
    tag = "teams",
    security(("cookie" = []))
)]
async fn member_add_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<MemberAddBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let membership = Membership::load(&state, user, id).await?;
    membership.require(membership.can_manage())?;

    let target = UserEntity::find_by_id(state.pool(), user, payload.user_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(UserEntity::get_resource_type()))?;

    if !membership.has_free_seat(&state).await? {
        return Err(team_full());
    }

    let member = TeamMember::add(
        state.pool(),
        membership.team.id(),
        target.id(),
        TeamRole::grantable(payload.role.as_deref()),
        Some(user.user_id()),
    )
    .await
    .map_err(|e| {
        WebError::resource_write_error(TeamMember::get_resource_type(), e, "User is already a member")
    })?;

    Ok(Json(member))
}

#[utoipa::path(
    patch,
    path = "/api/v1/teams/{id}/members",
    params(("id" = Uuid, Path, description = "ID of the team")),
    request_body = MemberRoleBody,
    responses(
        (status = 200, description = "Role changed", body = TeamMember),
        (status = 400, description = "Invalid role or own role", body = ErrorResponse),
        (status = 403, description = "Not the team owner", body = ErrorResponse),
        (status = 404, description = "Member not found", body = ErrorResponse),
    ),
    tag = "teams",
    security(("cookie" = []))
)]
async fn member_role_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<MemberRoleBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let membership = Membership::load(&state, user, id).await?;
    membership.require(membership.is_owner())?;

    let role = match payload.role.as_str() {
        "admin" => TeamRole::Admin,
        "member" => TeamRole::Member,
        _ => {
            return Err(WebError::resource_bad_request_because(
                TeamMember::get_resource_type(),
                "Role must be admin or member",
            ));
        }
    };

    let member = TeamMember::find_by_id(state.pool(), membership.team.id(), payload.member_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(TeamMember::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(TeamMember::get_resource_type()))?;

    if member.user_id() == user.user_id() {
        return Err(WebError::resource_bad_request_because(
            TeamMember::get_resource_type(),
            "Cannot change your own role",
        ));
    }

    let member = member
        .set_role(state.pool(), role)
        .await
        .map_err(|e| WebError::resource_fetch_error(TeamMember::get_resource_type(), e))?;

    Ok(Json(member))
}

#[utoipa::path(
    delete,
    path = "/api/v1/teams/{id}/members",
    params(("id" = Uuid, Path, description = "ID of the team"), MemberQuery),
    responses(
        (status = 200, description = "Member removed"),
        (status = 400, description = "member_id missing or removing the owner", body = ErrorResponse),
        (status = 403, description = "Not allowed to remove this member", body = ErrorResponse),
        (status = 404, description = "Member not found", body = ErrorResponse),
    ),
    tag = "teams",
    security(("cookie" = []))
)]
async fn member_remove_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<MemberQuery>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let member_id = query.member_id.ok_or(WebError::resource_bad_request_because(
        TeamMember::get_resource_type(),
        "Member ID is required",
    ))?;

    let membership = Membership::load(&state, user, id).await?;
    let member = TeamMember::find_by_id(state.pool(), membership.team.id(), member_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(TeamMember::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(TeamMember::get_resource_type()))?;

    membership.require(member.user_id() == user.user_id() || membership.can_manage())?;

    if member.role() == TeamRole::Owner {
        return Err(WebError::resource_bad_request_because(
            TeamMember::get_resource_type(),
            "The team owner cannot be removed",
        ));
    }

    member
        .remove(state.pool())
        .await
        .map_err(|e| WebError::resource_fetch_error(TeamMember::get_resource_type(), e))?;

    Ok(StatusCode::OK)
}

#[utoipa::path(
    get,
    path = "/api/v1/teams/{id}/invitations",
    params(("id" = Uuid, Path, description = "ID of the team")),
    responses(
        (status = 200, description = "Pending invitations", body = Vec<TeamInvitation>),
        (status = 403, description = "Not a team owner or admin", body = ErrorResponse),
    ),
    tag = "teams",
    security(("cookie" = []))
)]
async fn invitation_list_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let membership = Membership::load(&state, user, id).await?;
    membership.require(membership.can_manage())?;

    let invitations = TeamInvitation::pending_for_team(state.pool(), membership.team.id())
        .await
        .map_err(|e| WebError::resource_fetch_error(TeamInvitation::get_resource_type(), e))?;

    Ok(Json(invitations))
}

#[utoipa::path(
    post,
    path = "/api/v1/teams/{id}/invitations",
    params(("id" = Uuid, Path, description = "ID of the team")),
    request_body = InviteBody,
    description = "Invites an email address. The token link is valid for 7 days",
    responses(
        (status = 200, description = "Invitation created", body = TeamInvitation),
        (status = 400, description = "Email missing or team full", body = ErrorResponse),
        (status = 403, description = "Not a team owner or admin", body = ErrorResponse),
        (status = 409, description = "Already a member or already invited", body = ErrorResponse),
    ),
    tag = "teams",
    security(("cookie" = []))
)]
async fn invitation_create_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<InviteBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let email = payload.email.as_deref().map(normalize_email).unwrap_or_default();
    if email.is_empty() {
        return Err(WebError::resource_bad_request_because(
            TeamInvitation::get_resource_type(),
            "Email is required",
        ));
    }

    let membership = Membership::load(&state, user, id).await?;
    membership.require(membership.can_manage())?;
    let team_id = membership.team.id();

    let invitee = UserEntity::find_by_email(state.pool(), &email)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;

    if let Some(invitee) = &invitee {
        let existing = TeamMember::find(state.pool(), team_id, invitee.id())
            .await
            .map_err(|e| WebError::resource_fetch_error(TeamMember::get_resource_type(), e))?;
        if existing.is_some() {
            return Err(WebError::resource_conflict(
                TeamInvitation::get_resource_type(),
                "User is already a member",
            ));
        }
    }

    let pending = TeamInvitation::find_pending_for_email(state.pool(), team_id, &email)
        .await
        .map_err(|e| WebError::resource_fetch_error(TeamInvitation::get_resource_type(), e))?;
    if pending.is_some() {
        return Err(WebError::resource_conflict(
            TeamInvitation::get_resource_type(),
            "An invitation is already pending for this email",
        ));
    }

    if !membership.has_free_seat(&state).await? {
        return Err(team_full());
    }

    let invitation = TeamInvitation::create(
        state.pool(),
        team_id,
        &email,
        TeamRole::grantable(payload.role.as_deref()),
        &random_token(),
        user.user_id(),
    )
    .await
    .map_err(|e| WebError::resource_fetch_error(TeamInvitation::get_resource_type(), e))?;

    if let Some(invitee) = invitee {
        Notification::push_quietly(
            state.pool(),
            invitee.id(),
            NewNotification {
                kind: NotificationKind::TeamInvitation,
                title: String::from("Team invitation"),
                message: format!("You have been invited to join {}.", membership.team.name()),
                action_url: Some(format!(
                    "{}/teams/join?token={}",
                    state.config().app().public_url(),
                    invitation.token()
                )),
            },
        )
        .await;
    }

    tracing::info!("invitation {} sent for team {}", invitation.id(), team_id);
    Ok(Json(invitation))
}

#[utoipa::path(
    delete,
    path = "/api/v1/teams/{id}/invitations",
    params(("id" = Uuid, Path, description = "ID of the team"), InvitationQuery),
    responses(
        (status = 200, description = "Invitation revoked"),
        (status = 400, description = "invitation_id missing", body = ErrorResponse),
        (status = 403, description = "Not a team owner or admin", body = ErrorResponse),
        (status = 404, description = "No pending invitation with this id", body = ErrorResponse),
    ),
    tag = "teams",
    security(("cookie" = []))
)]
async fn invitation_revoke_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<InvitationQuery>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let invitation_id = query.invitation_id.ok_or(WebError::resource_bad_request_because(
        TeamInvitation::get_resource_type(),
        "Invitation ID is required",
    ))?;

    let membership = Membership::load(&state, user, id).await?;
    membership.require(membership.can_manage())?;

    let revoked = TeamInvitation::revoke(state.pool(), membership.team.id(), invitation_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(TeamInvitation::get_resource_type(), e))?;

    if revoked == 0 {
        return Err(WebError::resource_not_found(TeamInvitation::get_resource_type()));
    }

    Ok(StatusCode::OK)
}

/// Resolves a token into a usable invitation and its team.
async fn usable_invitation(state: &AppState, token: Option<&str>) -> WebResult<(TeamInvitation, Team)> {
    let token = token.map(str::trim).filter(|t| !t.is_empty()).ok_or(
        WebError::resource_bad_request_because(TeamInvitation::get_resource_type(), "Token is required"),
    )?;

    let invitation = TeamInvitation::find_by_token(state.pool(), token)
        .await
        .map_err(|e| WebError::resource_fetch_error(TeamInvitation::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(TeamInvitation::get_resource_type()))?;

    invitation.check_usable(Utc::now()).map_err(|problem| {
        WebError::resource_bad_request_because(TeamInvitation::get_resource_type(), problem.message())
    })?;

    let team = Team::find_by_id(state.pool(), invitation.team_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Team::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(Team::get_resource_type()))?;

    Ok((invitation, team))
}

async fn caller_email(state: &AppState, user: &AuthenticatedUser) -> WebResult<String> {
    let found = UserEntity::find_by_id(state.pool(), user, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?
        .ok_or(WebError::auth_required())?;
    Ok(normalize_email(found.email()))
}

#[utoipa::path(
    get,
    path = "/api/v1/teams/join",
    params(JoinQuery),
    responses(
        (status = 200, description = "Invitation preview", body = JoinPreview),
        (status = 400, description = "Token missing, used or expired", body = ErrorResponse),
        (status = 404, description = "Unknown token", body = ErrorResponse),
    ),
    tag = "teams"
)]
async fn join_preview_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(query): Query<JoinQuery>,
) -> WebResult<impl IntoResponse> {
    let (invitation, team) = usable_invitation(&state, query.token.as_deref()).await?;

    let email_match = match ctx.maybe_user() {
        Some(user) => Some(caller_email(&state, user).await? == normalize_email(invitation.email())),
        None => None,
    };

    Ok(Json(JoinPreview {
        team_id: team.id(),
        team_name: team.name().to_string(),
        team_slug: team.slug().to_string(),
        email: invitation.email().to_string(),
        role: invitation.role(),
        expires_at: invitation.expires_at(),
        email_match,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/teams/join",
    request_body = JoinBody,
    responses(
        (status = 200, description = "Joined, or already a member", body = JoinResult),
        (status = 400, description = "Token missing, used or expired", body = ErrorResponse),
        (status = 403, description = "Invitation is for another email", body = ErrorResponse),
        (status = 404, description = "Unknown token", body = ErrorResponse),
    ),
    tag = "teams",
    security(("cookie" = []))
)]
async fn join_accept_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<JoinBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let (invitation, team) = usable_invitation(&state, payload.token.as_deref()).await?;

    if caller_email(&state, user).await? != normalize_email(invitation.email()) {
        return Err(WebError::resource_forbidden_because(
            TeamInvitation::get_resource_type(),
            "This invitation was sent to a different email",
        ));
    }

    let existing = TeamMember::find(state.pool(), team.id(), user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(TeamMember::get_resource_type(), e))?;

    let (already_member, member) = match existing {
        Some(member) => (true, member),
        None => {
            let member = TeamMember::add(state.pool(), team.id(), user.user_id(), invitation.role(), None)
                .await
                .map_err(|e| {
                    WebError::resource_write_error(TeamMember::get_resource_type(), e, "User is already a member")
                })?;
            (false, member)
        }
    };

    invitation
        .accept(state.pool())
        .await
        .map_err(|e| WebError::resource_fetch_error(TeamInvitation::get_resource_type(), e))?;

    Ok(Json(JoinResult {
        team_id: team.id(),
        already_member,
        member: Some(member),
    }))
}
