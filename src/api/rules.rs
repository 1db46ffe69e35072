//! Management rule API endpoints.
//!
//! Rules have no update-in-place: targets change by delete and recreate.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{error, success, ApiResult};
use crate::errors::AppError;
use crate::hierarchy;
use crate::models::{
    CreateRuleRequest, ManagedTeam, ManagementRule, ResolvedUser, RuleDetail, RuleSource,
    RuleTarget, SubordinatesResponse, Team, TeamRef, User, UserRef,
};
use crate::AppState;

/// Query parameters for the rule listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleListQuery {
    #[serde(default)]
    pub manager_id: Option<String>,
    #[serde(default)]
    pub rule_type: Option<String>,
}

/// Query parameter scoping a request to one manager.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerQuery {
    pub manager_id: String,
}

/// Query parameters for the is-managed check.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckQuery {
    pub manager_id: String,
    pub user_id: String,
}

/// Response for the is-managed check.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub is_managed: bool,
}

async fn load_workspace(
    state: &AppState,
) -> Result<(Vec<ManagementRule>, Vec<Team>, Vec<User>), AppError> {
    tokio::try_join!(
        state.repo.list_rules(),
        state.repo.list_teams(),
        state.repo.list_users(),
    )
}

/// GET /api/management/rules - List rules with referenced entities joined in.
pub async fn list_rules(
    State(state): State<AppState>,
    Query(query): Query<RuleListQuery>,
) -> ApiResult<Vec<RuleDetail>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Some(rule_type) = &query.rule_type {
        if rule_type != "TEAM" && rule_type != "INDIVIDUAL" {
            return error(
                AppError::Validation(format!("Unknown rule type: {}", rule_type)),
                revision_id,
            );
        }
    }

    let (rules, teams, users) = match load_workspace(&state).await {
        Ok(data) => data,
        Err(e) => return error(e, revision_id),
    };

    let users_by_id: HashMap<&str, &User> = users.iter().map(|u| (u.id.as_str(), u)).collect();
    let teams_by_id: HashMap<&str, &Team> = teams.iter().map(|t| (t.id.as_str(), t)).collect();

    let details = rules
        .into_iter()
        .filter(|rule| {
            query
                .manager_id
                .as_ref()
                .map_or(true, |m| &rule.manager_id == m)
                && query
                    .rule_type
                    .as_ref()
                    .map_or(true, |t| rule.target.rule_type() == t)
        })
        .map(|rule| {
            let manager = users_by_id.get(rule.manager_id.as_str()).map(|u| UserRef::from(*u));
            let subordinate = rule
                .target
                .subordinate_id()
                .and_then(|id| users_by_id.get(id))
                .map(|u| UserRef::from(*u));
            let team = rule
                .target
                .team_id()
                .and_then(|id| teams_by_id.get(id))
                .map(|t| TeamRef::from(*t));
            RuleDetail {
                rule,
                manager,
                subordinate,
                team,
            }
        })
        .collect();

    success(details, revision_id)
}

/// POST /api/management/rules - Create a management rule.
pub async fn create_rule(
    State(state): State<AppState>,
    Json(request): Json<CreateRuleRequest>,
) -> ApiResult<ManagementRule> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_user(&request.manager_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error(
                AppError::NotFound("Manager not found".to_string()),
                revision_id,
            )
        }
        Err(e) => return error(e, revision_id),
    }

    match &request.target {
        RuleTarget::Individual { subordinate_id } => {
            if subordinate_id.trim().is_empty() {
                return error(
                    AppError::Validation(
                        "subordinateId is required for INDIVIDUAL rules".to_string(),
                    ),
                    revision_id,
                );
            }
            if subordinate_id == &request.manager_id {
                return error(
                    AppError::Validation("Cannot create a rule for yourself".to_string()),
                    revision_id,
                );
            }
            match state.repo.get_user(subordinate_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    return error(
                        AppError::NotFound("Subordinate not found".to_string()),
                        revision_id,
                    )
                }
                Err(e) => return error(e, revision_id),
            }
            let rules = match state.repo.list_rules().await {
                Ok(rules) => rules,
                Err(e) => return error(e, revision_id),
            };
            if hierarchy::creates_cycle(&request.manager_id, subordinate_id, &rules) {
                return error(
                    AppError::Validation(
                        "This would create a circular hierarchy".to_string(),
                    ),
                    revision_id,
                );
            }
        }
        RuleTarget::Team { team_id } => {
            if team_id.trim().is_empty() {
                return error(
                    AppError::Validation("teamId is required for TEAM rules".to_string()),
                    revision_id,
                );
            }
            match state.repo.get_team(team_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    return error(
                        AppError::NotFound("Team not found".to_string()),
                        revision_id,
                    )
                }
                Err(e) => return error(e, revision_id),
            }
        }
    }

    match state
        .repo
        .find_duplicate_rule(&request.manager_id, &request.target)
        .await
    {
        Ok(Some(_)) => {
            return error(
                AppError::Duplicate("This management rule already exists".to_string()),
                revision_id,
            )
        }
        Ok(None) => {}
        Err(e) => return error(e, revision_id),
    }

    match state
        .repo
        .create_rule(&request.manager_id, &request.target)
        .await
    {
        Ok(rule) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(rule, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/management/rules/{id} - Delete a rule.
///
/// Deleting an absent rule is a benign 404, never a crash; callers treat
/// removal as idempotent.
pub async fn delete_rule(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.delete_rule(&id).await {
        Ok(()) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/management/subordinates - Effective subordinates of a manager.
pub async fn get_subordinates(
    State(state): State<AppState>,
    Query(query): Query<ManagerQuery>,
) -> ApiResult<SubordinatesResponse> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let (rules, teams, users) = match load_workspace(&state).await {
        Ok(data) => data,
        Err(e) => return error(e, revision_id),
    };

    let subordinates =
        hierarchy::resolve_subordinates(&query.manager_id, &rules, &teams, &users);
    let direct_count = subordinates
        .iter()
        .filter(|s| s.source == RuleSource::Individual)
        .count();
    let team_count = subordinates.len() - direct_count;

    success(
        SubordinatesResponse {
            total: subordinates.len(),
            direct_count,
            team_count,
            subordinates,
        },
        revision_id,
    )
}

/// GET /api/management/managers/{userId} - Managers reaching a user.
pub async fn get_managers(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<ResolvedUser>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let (rules, teams, users) = match load_workspace(&state).await {
        Ok(data) => data,
        Err(e) => return error(e, revision_id),
    };

    success(
        hierarchy::resolve_managers(&user_id, &rules, &teams, &users),
        revision_id,
    )
}

/// GET /api/management/teams - Teams covered by a manager's TEAM rules.
pub async fn get_managed_teams(
    State(state): State<AppState>,
    Query(query): Query<ManagerQuery>,
) -> ApiResult<Vec<ManagedTeam>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let (rules, teams) = match tokio::try_join!(state.repo.list_rules(), state.repo.list_teams())
    {
        Ok(data) => data,
        Err(e) => return error(e, revision_id),
    };

    let teams_by_id: HashMap<&str, &Team> = teams.iter().map(|t| (t.id.as_str(), t)).collect();

    let managed = rules
        .iter()
        .filter(|rule| rule.manager_id == query.manager_id)
        .filter_map(|rule| {
            let team_id = rule.target.team_id()?;
            let team = teams_by_id.get(team_id)?;
            Some(ManagedTeam {
                rule_id: rule.id.clone(),
                team_id: team.id.clone(),
                team_name: team.name.clone(),
                team_description: team.description.clone(),
                member_count: team.memberships.len(),
                assigned_at: rule.created_at.clone(),
            })
        })
        .collect();

    success(managed, revision_id)
}

/// GET /api/management/check - Whether a user is managed by a manager.
pub async fn check_managed(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> ApiResult<CheckResponse> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let (rules, teams) = match tokio::try_join!(state.repo.list_rules(), state.repo.list_teams())
    {
        Ok(data) => data,
        Err(e) => return error(e, revision_id),
    };

    success(
        CheckResponse {
            is_managed: hierarchy::is_managed_by(&query.user_id, &query.manager_id, &rules, &teams),
        },
        revision_id,
    )
}
