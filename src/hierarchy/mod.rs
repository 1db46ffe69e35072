//! Management-rule resolution.
//!
//! Expands a manager's rules (TEAM and INDIVIDUAL) into a flat, deduplicated
//! list of people, entirely over in-memory data. All functions here are pure
//! and synchronous; the API layer fetches the inputs and hands them over.
//!
//! Resolution rules:
//! - A TEAM rule contributes every current member of the team, managers of
//!   that team included. Only the rule owner is excluded.
//! - An INDIVIDUAL rule contributes exactly the named person.
//! - Duplicates collapse by user id; INDIVIDUAL provenance wins the tie.
//! - A dangling team or user reference contributes nothing.
//! - A manager never appears in their own output.

use std::collections::HashSet;

use crate::models::{ManagementRule, ResolvedUser, RuleSource, RuleTarget, Team, User};

fn find_user<'a>(users: &'a [User], id: &str) -> Option<&'a User> {
    users.iter().find(|u| u.id == id)
}

fn find_team<'a>(teams: &'a [Team], id: &str) -> Option<&'a Team> {
    teams.iter().find(|t| t.id == id)
}

/// Expand all of a manager's rules into their effective subordinates.
///
/// INDIVIDUAL rules are expanded first so that a person qualifying through
/// both an individual and a team rule keeps the individual provenance.
/// Output order is deterministic: individual entries in rule order, then
/// team contributions in rule order and membership order.
pub fn resolve_subordinates(
    manager_id: &str,
    rules: &[ManagementRule],
    teams: &[Team],
    users: &[User],
) -> Vec<ResolvedUser> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();

    for rule in rules.iter().filter(|r| r.manager_id == manager_id) {
        if let RuleTarget::Individual { subordinate_id } = &rule.target {
            if subordinate_id == manager_id {
                continue;
            }
            let Some(user) = find_user(users, subordinate_id) else {
                continue;
            };
            if seen.insert(&user.id) {
                out.push(ResolvedUser {
                    id: user.id.clone(),
                    name: user.name.clone(),
                    email: user.email.clone(),
                    rule_id: rule.id.clone(),
                    source: RuleSource::Individual,
                });
            }
        }
    }

    for rule in rules.iter().filter(|r| r.manager_id == manager_id) {
        if let RuleTarget::Team { team_id } = &rule.target {
            let Some(team) = find_team(teams, team_id) else {
                continue;
            };
            for membership in &team.memberships {
                if membership.user.id == manager_id {
                    continue;
                }
                if seen.insert(&membership.user.id) {
                    out.push(ResolvedUser {
                        id: membership.user.id.clone(),
                        name: membership.user.name.clone(),
                        email: membership.user.email.clone(),
                        rule_id: rule.id.clone(),
                        source: RuleSource::Team {
                            team_id: team.id.clone(),
                            team_name: team.name.clone(),
                        },
                    });
                }
            }
        }
    }

    out
}

/// Reverse expansion: everyone whose rules reach the given user.
///
/// Same deduplication and tie-break discipline as [`resolve_subordinates`].
pub fn resolve_managers(
    user_id: &str,
    rules: &[ManagementRule],
    teams: &[Team],
    users: &[User],
) -> Vec<ResolvedUser> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();

    for rule in rules {
        if rule.target.subordinate_id() == Some(user_id) && rule.manager_id != user_id {
            let Some(manager) = find_user(users, &rule.manager_id) else {
                continue;
            };
            if seen.insert(&manager.id) {
                out.push(ResolvedUser {
                    id: manager.id.clone(),
                    name: manager.name.clone(),
                    email: manager.email.clone(),
                    rule_id: rule.id.clone(),
                    source: RuleSource::Individual,
                });
            }
        }
    }

    for rule in rules {
        let Some(team_id) = rule.target.team_id() else {
            continue;
        };
        if rule.manager_id == user_id {
            continue;
        }
        let Some(team) = find_team(teams, team_id) else {
            continue;
        };
        if !team.memberships.iter().any(|m| m.user.id == user_id) {
            continue;
        }
        let Some(manager) = find_user(users, &rule.manager_id) else {
            continue;
        };
        if seen.insert(&manager.id) {
            out.push(ResolvedUser {
                id: manager.id.clone(),
                name: manager.name.clone(),
                email: manager.email.clone(),
                rule_id: rule.id.clone(),
                source: RuleSource::Team {
                    team_id: team.id.clone(),
                    team_name: team.name.clone(),
                },
            });
        }
    }

    out
}

/// Whether `user_id` is managed by `manager_id`, directly or through a team.
pub fn is_managed_by(
    user_id: &str,
    manager_id: &str,
    rules: &[ManagementRule],
    teams: &[Team],
) -> bool {
    if user_id == manager_id {
        return false;
    }
    rules
        .iter()
        .filter(|r| r.manager_id == manager_id)
        .any(|rule| match &rule.target {
            RuleTarget::Individual { subordinate_id } => subordinate_id == user_id,
            RuleTarget::Team { team_id } => find_team(teams, team_id)
                .map(|team| team.memberships.iter().any(|m| m.user.id == user_id))
                .unwrap_or(false),
        })
}

/// Whether adding an INDIVIDUAL rule manager -> subordinate would close a
/// cycle in the individual-rule graph. Walks from the subordinate along
/// existing INDIVIDUAL edges, looking for the manager.
pub fn creates_cycle(manager_id: &str, subordinate_id: &str, rules: &[ManagementRule]) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: Vec<&str> = vec![subordinate_id];

    while let Some(current) = queue.pop() {
        if !visited.insert(current) {
            continue;
        }
        if current == manager_id {
            return true;
        }
        for rule in rules.iter().filter(|r| r.manager_id == current) {
            if let RuleTarget::Individual { subordinate_id } = &rule.target {
                if !visited.contains(subordinate_id.as_str()) {
                    queue.push(subordinate_id);
                }
            }
        }
    }

    false
}
