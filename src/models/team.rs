//! Team and membership models.

use serde::{Deserialize, Serialize};

use super::UserRef;

/// Role of a user inside a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeamRole {
    Member,
    Manager,
}

impl Default for TeamRole {
    fn default() -> Self {
        TeamRole::Member
    }
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Member => "MEMBER",
            TeamRole::Manager => "MANAGER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "MEMBER" => Some(TeamRole::Member),
            "MANAGER" => Some(TeamRole::Manager),
            _ => None,
        }
    }
}

/// Binding of a user to a team with a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub user: UserRef,
    pub role: TeamRole,
    pub joined_at: String,
}

/// A team with its memberships joined in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub memberships: Vec<Membership>,
    pub updated_at: String,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

/// Shortened team reference embedded in rule payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRef {
    pub id: String,
    pub name: String,
}

impl From<&Team> for TeamRef {
    fn from(team: &Team) -> Self {
        TeamRef {
            id: team.id.clone(),
            name: team.name.clone(),
        }
    }
}

/// Workspace-wide team statistics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMetrics {
    pub total_teams: i64,
    pub total_managers: i64,
    pub total_members: i64,
    pub users_without_team: i64,
}

/// Request body for creating a new team.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Initial manager; added with role MANAGER when present.
    #[serde(default)]
    pub manager_id: Option<String>,
}

/// Request body for updating an existing team.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTeamRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Request body for adding a member to a team.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: String,
    #[serde(default)]
    pub role: TeamRole,
}

/// Request body for changing a member's role.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemberRoleRequest {
    pub role: TeamRole,
}
