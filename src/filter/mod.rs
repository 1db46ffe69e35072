//! In-memory filtering and sorting for list endpoints.
//!
//! Lists are fetched in full and filtered here: a case-insensitive substring
//! query over the text fields, AND-combined with categorical constraints.
//! Filtering is pure and idempotent; the empty query keeps every entry.

use std::collections::HashSet;

use crate::models::{Team, User};

/// Constraints for the user listing. All present constraints must hold.
#[derive(Debug, Default, Clone)]
pub struct UserFilter {
    /// Substring query against name and email.
    pub query: Option<String>,
    pub is_admin: Option<bool>,
    /// Restrict to members of a team (ids resolved by the caller).
    pub member_of: Option<HashSet<String>>,
}

fn matches_query(query: &str, fields: &[&str]) -> bool {
    let needle = query.to_lowercase();
    needle.is_empty() || fields.iter().any(|f| f.to_lowercase().contains(&needle))
}

/// Apply a [`UserFilter`] to an already-fetched user list.
pub fn filter_users(users: Vec<User>, filter: &UserFilter) -> Vec<User> {
    users
        .into_iter()
        .filter(|user| {
            if let Some(query) = &filter.query {
                if !matches_query(query, &[&user.name, &user.email]) {
                    return false;
                }
            }
            if let Some(is_admin) = filter.is_admin {
                if user.is_admin != is_admin {
                    return false;
                }
            }
            if let Some(member_of) = &filter.member_of {
                if !member_of.contains(&user.id) {
                    return false;
                }
            }
            true
        })
        .collect()
}

/// Substring filter over team name and description.
pub fn filter_teams(teams: Vec<Team>, query: Option<&str>) -> Vec<Team> {
    let Some(query) = query else {
        return teams;
    };
    teams
        .into_iter()
        .filter(|team| {
            matches_query(
                query,
                &[team.name.as_str(), team.description.as_deref().unwrap_or("")],
            )
        })
        .collect()
}

/// Case-insensitive name ordering. Approximates the console's locale-aware
/// sort with Unicode lowercasing.
pub fn sort_users_by_name(users: &mut [User]) {
    users.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
}

pub fn sort_teams_by_name(teams: &mut [Team]) {
    teams.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
}
