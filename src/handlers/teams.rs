//! Team endpoints.
//!
//! - POST /api/teams - Create a team owned by the caller (PRO+)
//! - GET /api/teams - Teams the caller owns or belongs to
//! - POST /api/teams/{id}/members - Add a member (owner, seat limit)
//! - DELETE /api/teams/{id}/members/{user_id} - Remove a member (owner)
//!
//! Seats are counted across all teams of an owner.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::{AppError, conflict_on_unique},
    middleware::auth::AuthContext,
    models::{
        notification::NewNotification,
        team::{AddMemberRequest, CreateTeamRequest, Team, TeamDetail, TeamMember},
    },
    services::{auth_service, notification_service},
    state::AppState,
};

async fn owned_team(pool: &DbPool, owner_id: Uuid, team_id: Uuid) -> Result<Team, AppError> {
    let team = sqlx::query_as::<_, Team>(
        "SELECT id, owner_id, name, created_at FROM teams WHERE id = $1",
    )
    .bind(team_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Team"))?;

    if team.owner_id != owner_id {
        return Err(AppError::Forbidden);
    }
    Ok(team)
}

async fn seats_used(conn: &mut PgConnection, owner_id: Uuid) -> Result<i64, AppError> {
    let used = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM team_members m
        JOIN teams t ON t.id = m.team_id
        WHERE t.owner_id = $1
        "#,
    )
    .bind(owner_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(used)
}

async fn members(pool: &DbPool, team_id: Uuid) -> Result<Vec<TeamMember>, AppError> {
    let members = sqlx::query_as::<_, TeamMember>(
        r#"
        SELECT m.team_id, m.user_id, u.email, u.name, m.role, m.joined_at
        FROM team_members m
        JOIN users u ON u.id = m.user_id
        WHERE m.team_id = $1
        ORDER BY m.joined_at
        "#,
    )
    .bind(team_id)
    .fetch_all(pool)
    .await?;
    Ok(members)
}

pub async fn create_team(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<TeamDetail>), AppError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidRequest("Bitte einen Teamnamen angeben".to_string()));
    }

    let owner = auth_service::load_user(&pool, auth.user_id).await?;
    if owner.entitlements(Utc::now()).bundle.team_seats() == 0 {
        return Err(AppError::FeatureNotInPlan(
            "Teams sind ab dem Pro-Paket verfügbar".to_string(),
        ));
    }

    let team = sqlx::query_as::<_, Team>(
        "INSERT INTO teams (owner_id, name) VALUES ($1, $2) RETURNING id, owner_id, name, created_at",
    )
    .bind(auth.user_id)
    .bind(name)
    .fetch_one(&pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(TeamDetail {
            team,
            members: Vec::new(),
        }),
    ))
}

pub async fn list_teams(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<TeamDetail>>, AppError> {
    let teams = sqlx::query_as::<_, Team>(
        r#"
        SELECT DISTINCT t.id, t.owner_id, t.name, t.created_at
        FROM teams t
        LEFT JOIN team_members m ON m.team_id = t.id
        WHERE t.owner_id = $1 OR m.user_id = $1
        ORDER BY t.created_at
        "#,
    )
    .bind(auth.user_id)
    .fetch_all(&pool)
    .await?;

    let mut details = Vec::with_capacity(teams.len());
    for team in teams {
        let members = members(&pool, team.id).await?;
        details.push(TeamDetail { team, members });
    }

    Ok(Json(details))
}

/// Add a registered user to a team.
///
/// # Request Body
///
/// ```json
/// { "email": "kollegin@example.de", "role": "editor" }
/// ```
///
/// # Response
///
/// - **201 Created**: the new member
/// - **403**: not the owner, or no seat left in the owner's bundle
/// - **404**: no user with that email
/// - **409**: already a member
///
/// Seat counting and the insert run under a lock on the owner's row.
pub async fn add_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
    Json(request): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<TeamMember>), AppError> {
    let team = owned_team(&state.pool, auth.user_id, team_id).await?;

    let email = auth_service::normalize_email(&request.email)?;
    let invitee = auth_service::find_user_by_email(&state.pool, &email)
        .await?
        .ok_or(AppError::NotFound("Benutzer"))?;
    if invitee.id == auth.user_id {
        return Err(AppError::InvalidRequest(
            "Sie sind bereits Inhaber des Teams".to_string(),
        ));
    }

    let mut tx = state.pool.begin().await?;

    let owner = auth_service::lock_user(&mut tx, auth.user_id).await?;
    let used = seats_used(&mut tx, auth.user_id).await?;
    owner.entitlements(Utc::now()).require_team_seat(used)?;

    sqlx::query("INSERT INTO team_members (team_id, user_id, role) VALUES ($1, $2, $3)")
        .bind(team.id)
        .bind(invitee.id)
        .bind(request.role.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "Der Benutzer ist bereits Mitglied"))?;

    tx.commit().await?;

    let member = members(&state.pool, team.id)
        .await?
        .into_iter()
        .find(|m| m.user_id == invitee.id)
        .ok_or(AppError::NotFound("Mitglied"))?;

    notification_service::notify_best_effort(
        &state.pool,
        &state.notifications,
        NewNotification::new(
            invitee.id,
            "team_invite",
            "Neues Team",
            format!("Sie wurden dem Team \"{}\" hinzugefügt", team.name),
        )
        .with_link("/dashboard/teams"),
    )
    .await;

    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn remove_member(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path((team_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let team = owned_team(&pool, auth.user_id, team_id).await?;

    let result = sqlx::query("DELETE FROM team_members WHERE team_id = $1 AND user_id = $2")
        .bind(team.id)
        .bind(user_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Mitglied"));
    }
    Ok(StatusCode::NO_CONTENT)
}
