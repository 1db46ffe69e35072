//! Management rule models.
//!
//! A rule states that a manager is responsible for either an entire team or
//! one named individual. The target is a tagged sum type so that the
//! "exactly one of teamId/subordinateId" invariant holds by construction.

use serde::{Deserialize, Serialize};

use super::{TeamRef, UserRef};

/// Target of a management rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "ruleType")]
pub enum RuleTarget {
    /// All current members of a team.
    #[serde(rename = "TEAM", rename_all = "camelCase")]
    Team { team_id: String },
    /// One named person.
    #[serde(rename = "INDIVIDUAL", rename_all = "camelCase")]
    Individual { subordinate_id: String },
}

impl RuleTarget {
    pub fn rule_type(&self) -> &'static str {
        match self {
            RuleTarget::Team { .. } => "TEAM",
            RuleTarget::Individual { .. } => "INDIVIDUAL",
        }
    }

    pub fn team_id(&self) -> Option<&str> {
        match self {
            RuleTarget::Team { team_id } => Some(team_id),
            RuleTarget::Individual { .. } => None,
        }
    }

    pub fn subordinate_id(&self) -> Option<&str> {
        match self {
            RuleTarget::Team { .. } => None,
            RuleTarget::Individual { subordinate_id } => Some(subordinate_id),
        }
    }
}

/// A management rule as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagementRule {
    pub id: String,
    pub manager_id: String,
    #[serde(flatten)]
    pub target: RuleTarget,
    pub created_at: String,
}

/// A rule as listed for admins, with referenced entities joined in.
/// Dangling references serialize as absent fields rather than failing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDetail {
    #[serde(flatten)]
    pub rule: ManagementRule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager: Option<UserRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subordinate: Option<UserRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamRef>,
}

/// Request body for creating a rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuleRequest {
    pub manager_id: String,
    #[serde(flatten)]
    pub target: RuleTarget,
}

/// Provenance of a resolved hierarchy entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source")]
pub enum RuleSource {
    /// Reached through an INDIVIDUAL rule.
    #[serde(rename = "individual")]
    Individual,
    /// Reached through a TEAM rule over the named team.
    #[serde(rename = "team", rename_all = "camelCase")]
    Team { team_id: String, team_name: String },
}

/// A person reached by expanding management rules, in either direction
/// (effective subordinate of a manager, or manager of a user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub rule_id: String,
    #[serde(flatten)]
    pub source: RuleSource,
}

/// Response for the effective-subordinates endpoint, mirroring the counts
/// the admin console displays.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubordinatesResponse {
    pub total: usize,
    pub direct_count: usize,
    pub team_count: usize,
    pub subordinates: Vec<ResolvedUser>,
}

/// One entry of the managed-teams listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedTeam {
    pub rule_id: String,
    pub team_id: String,
    pub team_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_description: Option<String>,
    pub member_count: usize,
    pub assigned_at: String,
}
