//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    CreateTeamRequest, CreateUserRequest, Datastore, ManagementRule, Membership, RevisionInfo,
    RuleTarget, Team, TeamMetrics, TeamRole, UpdateTeamRequest, UpdateUserRequest, User, UserRef,
};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }

    /// Increment the revision ID and return the new value.
    pub async fn increment_revision(&self) -> Result<i64, AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
            .bind(&now)
            .execute(&self.pool)
            .await?;
        self.get_revision_id().await
    }

    /// Get the full datastore snapshot.
    pub async fn get_datastore(&self) -> Result<Datastore, AppError> {
        let meta =
            sqlx::query("SELECT schema_version, revision_id, generated_at FROM meta WHERE id = 1")
                .fetch_one(&self.pool)
                .await?;

        let users = self.list_users().await?;
        let teams = self.list_teams().await?;
        let rules = self.list_rules().await?;

        Ok(Datastore {
            schema_version: meta.get("schema_version"),
            revision_id: meta.get("revision_id"),
            generated_at: meta.get("generated_at"),
            users,
            teams,
            rules,
        })
    }

    // ==================== USER OPERATIONS ====================

    /// List all users, ordered by name.
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query(
            "SELECT id, name, email, is_admin, position, bio, updated_at, version FROM users ORDER BY name COLLATE NOCASE"
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(user_from_row).collect())
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, email, is_admin, position, bio, updated_at, version FROM users WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Get a user by email.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, email, is_admin, position, bio, updated_at, version FROM users WHERE email = ?"
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Create a new user. The password arrives already hashed.
    pub async fn create_user(
        &self,
        request: &CreateUserRequest,
        password_hash: &str,
    ) -> Result<User, AppError> {
        if self.get_user_by_email(&request.email).await?.is_some() {
            return Err(AppError::Duplicate("Email already registered".to_string()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO users (id, name, email, is_admin, position, bio, password_hash, updated_at, version) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)"
        )
        .bind(&id)
        .bind(&request.name)
        .bind(&request.email)
        .bind(request.is_admin as i32)
        .bind(&request.position)
        .bind(&request.bio)
        .bind(password_hash)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        Ok(User {
            id,
            name: request.name.clone(),
            email: request.email.clone(),
            is_admin: request.is_admin,
            position: request.position.clone(),
            bio: request.bio.clone(),
            updated_at: now,
            version: 1,
        })
    }

    /// Update a user with optimistic concurrency control.
    pub async fn update_user(&self, id: &str, request: &UpdateUserRequest) -> Result<User, AppError> {
        let existing = self
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

        // Check version for optimistic concurrency
        if let Some(expected) = request.expected_version {
            if existing.version != expected {
                return Err(AppError::Conflict {
                    message: format!(
                        "Version mismatch: expected {}, current {}",
                        expected, existing.version
                    ),
                    current_version: existing.version,
                });
            }
        }

        let email = request.email.as_ref().unwrap_or(&existing.email);
        if email != &existing.email && self.get_user_by_email(email).await?.is_some() {
            return Err(AppError::Duplicate("Email already registered".to_string()));
        }

        let now = Utc::now().to_rfc3339();
        let new_version = existing.version + 1;

        let name = request.name.as_ref().unwrap_or(&existing.name);
        let is_admin = request.is_admin.unwrap_or(existing.is_admin);
        let position = request.position.clone().or(existing.position.clone());
        let bio = request.bio.clone().or(existing.bio.clone());

        // Use conditional UPDATE with version check to prevent race conditions
        let result = sqlx::query(
            "UPDATE users SET name = ?, email = ?, is_admin = ?, position = ?, bio = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?"
        )
        .bind(name)
        .bind(email)
        .bind(is_admin as i32)
        .bind(&position)
        .bind(&bio)
        .bind(&now)
        .bind(new_version)
        .bind(id)
        .bind(existing.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Race condition - version changed between read and write
            let current = self.get_user(id).await?;
            return Err(AppError::Conflict {
                message: "Concurrent modification detected".to_string(),
                current_version: current.map(|u| u.version).unwrap_or(0),
            });
        }

        self.increment_revision().await?;

        Ok(User {
            id: id.to_string(),
            name: name.clone(),
            email: email.clone(),
            is_admin,
            position,
            bio,
            updated_at: now,
            version: new_version,
        })
    }

    /// Replace a user's password hash, bumping their version.
    pub async fn set_password(&self, id: &str, password_hash: &str) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE users SET password_hash = ?, updated_at = ?, version = version + 1 WHERE id = ?"
        )
        .bind(password_hash)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }

        self.increment_revision().await?;
        Ok(())
    }

    /// Delete a user. Memberships and rules referencing them cascade away.
    pub async fn delete_user(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }

        self.increment_revision().await?;
        Ok(())
    }

    // ==================== TEAM OPERATIONS ====================

    /// List all teams with memberships joined in, ordered by name.
    pub async fn list_teams(&self) -> Result<Vec<Team>, AppError> {
        let rows = sqlx::query(
            "SELECT id, name, description, updated_at, version FROM teams ORDER BY name COLLATE NOCASE"
        )
        .fetch_all(&self.pool)
        .await?;

        let mut memberships = self.all_memberships().await?;

        Ok(rows
            .iter()
            .map(|row| {
                let id: String = row.get("id");
                let members = memberships.remove(&id).unwrap_or_default();
                team_from_row(row, members)
            })
            .collect())
    }

    /// Get a team by ID.
    pub async fn get_team(&self, id: &str) -> Result<Option<Team>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, description, updated_at, version FROM teams WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let members = sqlx::query(
            r#"SELECT m.role, m.joined_at, u.id AS user_id, u.name, u.email
               FROM team_memberships m JOIN users u ON u.id = m.user_id
               WHERE m.team_id = ? ORDER BY m.joined_at"#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(team_from_row(
            &row,
            members.iter().map(membership_from_row).collect(),
        )))
    }

    /// Create a new team. The initial manager, when given, joins as MANAGER.
    pub async fn create_team(&self, request: &CreateTeamRequest) -> Result<Team, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO teams (id, name, description, updated_at, version) VALUES (?, ?, ?, ?, 1)",
        )
        .bind(&id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        if let Some(manager_id) = &request.manager_id {
            sqlx::query(
                "INSERT INTO team_memberships (team_id, user_id, role, joined_at) VALUES (?, ?, 'MANAGER', ?)"
            )
            .bind(&id)
            .bind(manager_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.increment_revision().await?;

        self.get_team(&id)
            .await?
            .ok_or_else(|| AppError::Internal("Team vanished after insert".to_string()))
    }

    /// Update a team with optimistic concurrency control.
    pub async fn update_team(&self, id: &str, request: &UpdateTeamRequest) -> Result<Team, AppError> {
        let existing = self
            .get_team(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Team {} not found", id)))?;

        if let Some(expected) = request.expected_version {
            if existing.version != expected {
                return Err(AppError::Conflict {
                    message: format!(
                        "Version mismatch: expected {}, current {}",
                        expected, existing.version
                    ),
                    current_version: existing.version,
                });
            }
        }

        let now = Utc::now().to_rfc3339();
        let new_version = existing.version + 1;
        let name = request.name.as_ref().unwrap_or(&existing.name);
        let description = request.description.clone().or(existing.description.clone());

        let result = sqlx::query(
            "UPDATE teams SET name = ?, description = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?"
        )
        .bind(name)
        .bind(&description)
        .bind(&now)
        .bind(new_version)
        .bind(id)
        .bind(existing.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.get_team(id).await?;
            return Err(AppError::Conflict {
                message: "Concurrent modification detected".to_string(),
                current_version: current.map(|t| t.version).unwrap_or(0),
            });
        }

        self.increment_revision().await?;

        Ok(Team {
            id: id.to_string(),
            name: name.clone(),
            description,
            memberships: existing.memberships,
            updated_at: now,
            version: new_version,
        })
    }

    /// Delete a team. Memberships and TEAM rules over it cascade away.
    pub async fn delete_team(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM teams WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Team {} not found", id)));
        }

        self.increment_revision().await?;
        Ok(())
    }

    /// Add a user to a team.
    pub async fn add_member(
        &self,
        team_id: &str,
        user_id: &str,
        role: TeamRole,
    ) -> Result<Team, AppError> {
        if self.get_team(team_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Team {} not found", team_id)));
        }
        if self.get_user(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }

        let existing = sqlx::query(
            "SELECT 1 FROM team_memberships WHERE team_id = ? AND user_id = ?",
        )
        .bind(team_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        if existing.is_some() {
            return Err(AppError::Duplicate("User already in team".to_string()));
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO team_memberships (team_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)",
        )
        .bind(team_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        self.get_team(team_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Team {} not found", team_id)))
    }

    /// Change a member's role. The last manager cannot be demoted.
    pub async fn update_member_role(
        &self,
        team_id: &str,
        user_id: &str,
        role: TeamRole,
    ) -> Result<Team, AppError> {
        let current = self.member_role(team_id, user_id).await?.ok_or_else(|| {
            AppError::NotFound("Membership not found".to_string())
        })?;

        if current == TeamRole::Manager && role != TeamRole::Manager {
            let managers = self.count_managers(team_id).await?;
            if managers <= 1 {
                return Err(AppError::Validation(
                    "Cannot demote the last manager of the team".to_string(),
                ));
            }
        }

        sqlx::query("UPDATE team_memberships SET role = ? WHERE team_id = ? AND user_id = ?")
            .bind(role.as_str())
            .bind(team_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        self.increment_revision().await?;

        self.get_team(team_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Team {} not found", team_id)))
    }

    /// Remove a member from a team. The last manager cannot be removed.
    pub async fn remove_member(&self, team_id: &str, user_id: &str) -> Result<Team, AppError> {
        let current = self.member_role(team_id, user_id).await?.ok_or_else(|| {
            AppError::NotFound("Membership not found".to_string())
        })?;

        if current == TeamRole::Manager {
            let managers = self.count_managers(team_id).await?;
            if managers <= 1 {
                return Err(AppError::Validation(
                    "Cannot remove the last manager of the team".to_string(),
                ));
            }
        }

        sqlx::query("DELETE FROM team_memberships WHERE team_id = ? AND user_id = ?")
            .bind(team_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        self.increment_revision().await?;

        self.get_team(team_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Team {} not found", team_id)))
    }

    /// Workspace-wide team statistics.
    pub async fn team_metrics(&self) -> Result<TeamMetrics, AppError> {
        let row = sqlx::query(
            r#"SELECT
                 (SELECT COUNT(*) FROM teams) AS total_teams,
                 (SELECT COUNT(*) FROM team_memberships WHERE role = 'MANAGER') AS total_managers,
                 (SELECT COUNT(*) FROM team_memberships) AS total_members,
                 (SELECT COUNT(*) FROM users u
                   WHERE NOT EXISTS (SELECT 1 FROM team_memberships m WHERE m.user_id = u.id)
                 ) AS users_without_team"#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(TeamMetrics {
            total_teams: row.get("total_teams"),
            total_managers: row.get("total_managers"),
            total_members: row.get("total_members"),
            users_without_team: row.get("users_without_team"),
        })
    }

    async fn member_role(&self, team_id: &str, user_id: &str) -> Result<Option<TeamRole>, AppError> {
        let row = sqlx::query("SELECT role FROM team_memberships WHERE team_id = ? AND user_id = ?")
            .bind(team_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|r| TeamRole::from_str(&r.get::<String, _>("role"))))
    }

    async fn count_managers(&self, team_id: &str) -> Result<i64, AppError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS managers FROM team_memberships WHERE team_id = ? AND role = 'MANAGER'"
        )
        .bind(team_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("managers"))
    }

    async fn all_memberships(&self) -> Result<HashMap<String, Vec<Membership>>, AppError> {
        let rows = sqlx::query(
            r#"SELECT m.team_id, m.role, m.joined_at, u.id AS user_id, u.name, u.email
               FROM team_memberships m JOIN users u ON u.id = m.user_id
               ORDER BY m.joined_at"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<String, Vec<Membership>> = HashMap::new();
        for row in &rows {
            let team_id: String = row.get("team_id");
            grouped
                .entry(team_id)
                .or_default()
                .push(membership_from_row(row));
        }
        Ok(grouped)
    }

    // ==================== RULE OPERATIONS ====================

    /// List all management rules, newest first.
    pub async fn list_rules(&self) -> Result<Vec<ManagementRule>, AppError> {
        let rows = sqlx::query(
            "SELECT id, manager_id, rule_type, team_id, subordinate_id, created_at FROM management_rules ORDER BY created_at DESC, id"
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(rule_from_row).collect())
    }

    /// Get a rule by ID.
    pub async fn get_rule(&self, id: &str) -> Result<Option<ManagementRule>, AppError> {
        let row = sqlx::query(
            "SELECT id, manager_id, rule_type, team_id, subordinate_id, created_at FROM management_rules WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(rule_from_row))
    }

    /// Find an existing rule with the same manager and target.
    pub async fn find_duplicate_rule(
        &self,
        manager_id: &str,
        target: &RuleTarget,
    ) -> Result<Option<ManagementRule>, AppError> {
        let query = match target {
            RuleTarget::Team { team_id } => sqlx::query(
                "SELECT id, manager_id, rule_type, team_id, subordinate_id, created_at FROM management_rules WHERE manager_id = ? AND rule_type = 'TEAM' AND team_id = ?"
            )
            .bind(manager_id)
            .bind(team_id),
            RuleTarget::Individual { subordinate_id } => sqlx::query(
                "SELECT id, manager_id, rule_type, team_id, subordinate_id, created_at FROM management_rules WHERE manager_id = ? AND rule_type = 'INDIVIDUAL' AND subordinate_id = ?"
            )
            .bind(manager_id)
            .bind(subordinate_id),
        };

        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(rule_from_row))
    }

    /// Create a management rule. Validation happens in the API layer.
    pub async fn create_rule(
        &self,
        manager_id: &str,
        target: &RuleTarget,
    ) -> Result<ManagementRule, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO management_rules (id, manager_id, rule_type, team_id, subordinate_id, created_at) VALUES (?, ?, ?, ?, ?, ?)"
        )
        .bind(&id)
        .bind(manager_id)
        .bind(target.rule_type())
        .bind(target.team_id())
        .bind(target.subordinate_id())
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        Ok(ManagementRule {
            id,
            manager_id: manager_id.to_string(),
            target: target.clone(),
            created_at: now,
        })
    }

    /// Delete a rule.
    pub async fn delete_rule(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM management_rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Management rule {} not found",
                id
            )));
        }

        self.increment_revision().await?;
        Ok(())
    }
}

// Helper functions for row conversion

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> User {
    let is_admin: i32 = row.get("is_admin");
    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        is_admin: is_admin != 0,
        position: row.get("position"),
        bio: row.get("bio"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

fn team_from_row(row: &sqlx::sqlite::SqliteRow, memberships: Vec<Membership>) -> Team {
    Team {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        memberships,
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

fn membership_from_row(row: &sqlx::sqlite::SqliteRow) -> Membership {
    let role: String = row.get("role");
    Membership {
        user: UserRef {
            id: row.get("user_id"),
            name: row.get("name"),
            email: row.get("email"),
        },
        role: TeamRole::from_str(&role).unwrap_or_default(),
        joined_at: row.get("joined_at"),
    }
}

fn rule_from_row(row: &sqlx::sqlite::SqliteRow) -> ManagementRule {
    let rule_type: String = row.get("rule_type");
    let team_id: Option<String> = row.get("team_id");
    let subordinate_id: Option<String> = row.get("subordinate_id");

    let target = if rule_type == "TEAM" {
        RuleTarget::Team {
            team_id: team_id.unwrap_or_default(),
        }
    } else {
        RuleTarget::Individual {
            subordinate_id: subordinate_id.unwrap_or_default(),
        }
    };

    ManagementRule {
        id: row.get("id"),
        manager_id: row.get("manager_id"),
        target,
        created_at: row.get("created_at"),
    }
}
