//! User API endpoints.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use super::{error, success, ApiResult};
use crate::auth::{acting_user, hash_password};
use crate::errors::AppError;
use crate::filter::{self, UserFilter};
use crate::hierarchy;
use crate::models::{
    CreateUserRequest, ResetPasswordRequest, UpdateUserRequest, User, UserDetail, UserRef,
};
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 8;

/// Query parameters for the user listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub is_admin: Option<bool>,
    #[serde(default)]
    pub team_id: Option<String>,
}

/// GET /api/users - List users, filtered in memory.
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Vec<User>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let users = match state.repo.list_users().await {
        Ok(users) => users,
        Err(e) => return error(e, revision_id),
    };

    // A team constraint narrows to that team's current members; a dangling
    // team id matches nobody.
    let member_of = match &query.team_id {
        Some(team_id) => match state.repo.get_team(team_id).await {
            Ok(team) => Some(
                team.map(|t| {
                    t.memberships
                        .iter()
                        .map(|m| m.user.id.clone())
                        .collect::<std::collections::HashSet<_>>()
                })
                .unwrap_or_default(),
            ),
            Err(e) => return error(e, revision_id),
        },
        None => None,
    };

    let user_filter = UserFilter {
        query: query.q,
        is_admin: query.is_admin,
        member_of,
    };

    let mut filtered = filter::filter_users(users, &user_filter);
    filter::sort_users_by_name(&mut filtered);
    success(filtered, revision_id)
}

/// GET /api/users/{id} - Get a user with derived managers and reports.
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<UserDetail> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let user = match state.repo.get_user(&id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return error(
                AppError::NotFound(format!("User {} not found", id)),
                revision_id,
            )
        }
        Err(e) => return error(e, revision_id),
    };

    let (rules, teams, users) = match tokio::try_join!(
        state.repo.list_rules(),
        state.repo.list_teams(),
        state.repo.list_users(),
    ) {
        Ok(data) => data,
        Err(e) => return error(e, revision_id),
    };

    let managers = hierarchy::resolve_managers(&id, &rules, &teams, &users)
        .into_iter()
        .map(|m| UserRef {
            id: m.id,
            name: m.name,
            email: m.email,
        })
        .collect();
    let reports = hierarchy::resolve_subordinates(&id, &rules, &teams, &users)
        .into_iter()
        .map(|s| UserRef {
            id: s.id,
            name: s.name,
            email: s.email,
        })
        .collect();

    success(
        UserDetail {
            user,
            managers,
            reports,
        },
        revision_id,
    )
}

/// POST /api/users - Create a new user.
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<User> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if request.name.trim().is_empty() {
        return error(
            AppError::Validation("Name is required".to_string()),
            revision_id,
        );
    }
    if !is_valid_email(&request.email) {
        return error(
            AppError::Validation("Invalid email format".to_string()),
            revision_id,
        );
    }
    if request.password.len() < MIN_PASSWORD_LEN {
        return error(
            AppError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )),
            revision_id,
        );
    }

    let password_hash = hash_password(&request.password);
    match state.repo.create_user(&request, &password_hash).await {
        Ok(user) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(user, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PATCH /api/users/{id} - Partially update a user.
///
/// Rejects a user clearing their own admin flag before any state changes.
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<User> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if request.is_admin == Some(false) {
        if let Some(actor) = acting_user(&headers) {
            if actor == id {
                return error(
                    AppError::Validation(
                        "Cannot remove your own admin access".to_string(),
                    ),
                    revision_id,
                );
            }
        }
    }

    if let Some(email) = &request.email {
        if !is_valid_email(email) {
            return error(
                AppError::Validation("Invalid email format".to_string()),
                revision_id,
            );
        }
    }

    match state.repo.update_user(&id, &request).await {
        Ok(user) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(user, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/users/{id}/reset-password - Set a new password.
pub async fn reset_password(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ResetPasswordRequest>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if request.password.len() < MIN_PASSWORD_LEN {
        return error(
            AppError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )),
            revision_id,
        );
    }
    if request.password != request.password_confirmation {
        return error(
            AppError::Validation("Passwords do not match".to_string()),
            revision_id,
        );
    }

    let password_hash = hash_password(&request.password);
    match state.repo.set_password(&id, &password_hash).await {
        Ok(()) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/users/{id} - Delete a user.
pub async fn delete_user(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.delete_user(&id).await {
        Ok(()) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}
