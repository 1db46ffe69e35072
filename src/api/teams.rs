//! Team API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{error, success, ApiResult};
use crate::errors::AppError;
use crate::filter;
use crate::models::{
    AddMemberRequest, CreateTeamRequest, Team, TeamMetrics, UpdateMemberRoleRequest,
    UpdateTeamRequest,
};
use crate::AppState;

/// Query parameters for the team listing.
#[derive(Debug, Default, Deserialize)]
pub struct TeamListQuery {
    #[serde(default)]
    pub q: Option<String>,
}

/// GET /api/teams - List teams, filtered in memory.
pub async fn list_teams(
    State(state): State<AppState>,
    Query(query): Query<TeamListQuery>,
) -> ApiResult<Vec<Team>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_teams().await {
        Ok(teams) => {
            let mut filtered = filter::filter_teams(teams, query.q.as_deref());
            filter::sort_teams_by_name(&mut filtered);
            success(filtered, revision_id)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/teams/metrics - Workspace-wide team statistics.
pub async fn team_metrics(State(state): State<AppState>) -> ApiResult<TeamMetrics> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.team_metrics().await {
        Ok(metrics) => success(metrics, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/teams/{id} - Get a single team with memberships.
pub async fn get_team(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Team> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_team(&id).await {
        Ok(Some(team)) => success(team, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Team {} not found", id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/teams - Create a new team.
pub async fn create_team(
    State(state): State<AppState>,
    Json(request): Json<CreateTeamRequest>,
) -> ApiResult<Team> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if request.name.trim().is_empty() {
        return error(
            AppError::Validation("Team name is required".to_string()),
            revision_id,
        );
    }
    if let Some(manager_id) = &request.manager_id {
        match state.repo.get_user(manager_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return error(
                    AppError::NotFound(format!("User {} not found", manager_id)),
                    revision_id,
                )
            }
            Err(e) => return error(e, revision_id),
        }
    }

    match state.repo.create_team(&request).await {
        Ok(team) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(team, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/teams/{id} - Update a team.
pub async fn update_team(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTeamRequest>,
) -> ApiResult<Team> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.update_team(&id, &request).await {
        Ok(team) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(team, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/teams/{id} - Delete a team.
pub async fn delete_team(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.delete_team(&id).await {
        Ok(()) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/teams/{id}/members - Add a member to a team.
pub async fn add_team_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AddMemberRequest>,
) -> ApiResult<Team> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .repo
        .add_member(&id, &request.user_id, request.role)
        .await
    {
        Ok(team) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(team, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/teams/{id}/members/{userId} - Change a member's role.
pub async fn update_team_member(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(String, String)>,
    Json(request): Json<UpdateMemberRoleRequest>,
) -> ApiResult<Team> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .repo
        .update_member_role(&id, &user_id, request.role)
        .await
    {
        Ok(team) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(team, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/teams/{id}/members/{userId} - Remove a member from a team.
pub async fn remove_team_member(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(String, String)>,
) -> ApiResult<Team> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.remove_member(&id, &user_id).await {
        Ok(team) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(team, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
