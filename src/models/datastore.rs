//! Full datastore snapshot for reload-after-mutation clients.

use serde::Serialize;

use super::{ManagementRule, Team, User};

/// Complete snapshot of the workspace data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Datastore {
    pub schema_version: i64,
    pub revision_id: i64,
    pub generated_at: String,
    pub users: Vec<User>,
    pub teams: Vec<Team>,
    pub rules: Vec<ManagementRule>,
}

/// Current revision info.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: i64,
    pub generated_at: String,
}
