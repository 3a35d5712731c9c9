//! User aggregate (event-sourced).
//!
//! Users are created by an administrator, deactivated/reactivated by toggling
//! their active flag, and removed for good through a separate hard-delete
//! path that closes the stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use herdbook_core::{Aggregate, AggregateRoot, DomainError, FarmId, UserId};
use herdbook_events::Event;

use crate::Role;

// ─────────────────────────────────────────────────────────────────────────────
// User Status
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
    /// Hard-deleted; the stream accepts no further commands.
    Deleted,
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Inactive => write!(f, "inactive"),
            UserStatus::Deleted => write!(f, "deleted"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// # Invariants
/// - A user belongs to exactly one farm.
/// - A user holds exactly one role once created.
/// - Nobody changes their own role, deactivates or deletes themselves.
/// - A deleted user is gone: every later command reports `NotFound`.
#[derive(Debug, Clone)]
pub struct User {
    id: UserId,
    farm_id: Option<FarmId>,
    display_name: String,
    role: Option<Role>,
    status: UserStatus,
    version: u64,
    created: bool,
}

impl User {
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            farm_id: None,
            display_name: String::new(),
            role: None,
            status: UserStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn farm_id(&self) -> Option<FarmId> {
        self.farm_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn status(&self) -> UserStatus {
        self.status
    }

    pub fn exists(&self) -> bool {
        self.created && self.status != UserStatus::Deleted
    }

    pub fn is_active(&self) -> bool {
        self.created && self.status == UserStatus::Active
    }

    fn ensure_live(&self, farm_id: FarmId) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.farm_id != Some(farm_id) {
            return Err(DomainError::invariant("farm mismatch"));
        }
        Ok(())
    }

    fn ensure_not_self(&self, actor_id: UserId, action: &str) -> Result<(), DomainError> {
        if actor_id == self.id {
            return Err(DomainError::invariant(format!("users cannot {action} themselves")));
        }
        Ok(())
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub farm_id: FarmId,
    pub user_id: UserId,
    pub display_name: String,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRole {
    pub farm_id: FarmId,
    pub user_id: UserId,
    pub role: Role,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeactivateUser {
    pub farm_id: FarmId,
    pub user_id: UserId,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateUser {
    pub farm_id: FarmId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteUser {
    pub farm_id: FarmId,
    pub user_id: UserId,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserCommand {
    Create(CreateUser),
    ChangeRole(ChangeRole),
    Deactivate(DeactivateUser),
    Activate(ActivateUser),
    Delete(DeleteUser),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub farm_id: FarmId,
    pub user_id: UserId,
    pub display_name: String,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChanged {
    pub farm_id: FarmId,
    pub user_id: UserId,
    pub from: Role,
    pub to: Role,
    pub changed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeactivated {
    pub farm_id: FarmId,
    pub user_id: UserId,
    pub deactivated_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserActivated {
    pub farm_id: FarmId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeleted {
    pub farm_id: FarmId,
    pub user_id: UserId,
    pub deleted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEvent {
    Created(UserCreated),
    RoleChanged(RoleChanged),
    Deactivated(UserDeactivated),
    Activated(UserActivated),
    Deleted(UserDeleted),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "auth.user.created",
            UserEvent::RoleChanged(_) => "auth.user.role_changed",
            UserEvent::Deactivated(_) => "auth.user.deactivated",
            UserEvent::Activated(_) => "auth.user.activated",
            UserEvent::Deleted(_) => "auth.user.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Created(e) => e.occurred_at,
            UserEvent::RoleChanged(e) => e.occurred_at,
            UserEvent::Deactivated(e) => e.occurred_at,
            UserEvent::Activated(e) => e.occurred_at,
            UserEvent::Deleted(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Created(e) => {
                self.id = e.user_id;
                self.farm_id = Some(e.farm_id);
                self.display_name = e.display_name.clone();
                self.role = Some(e.role);
                self.status = UserStatus::Active;
                self.created = true;
            }
            UserEvent::RoleChanged(e) => self.role = Some(e.to),
            UserEvent::Deactivated(_) => self.status = UserStatus::Inactive,
            UserEvent::Activated(_) => self.status = UserStatus::Active,
            UserEvent::Deleted(_) => self.status = UserStatus::Deleted,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Create(cmd) => self.handle_create(cmd),
            UserCommand::ChangeRole(cmd) => self.handle_change_role(cmd),
            UserCommand::Deactivate(cmd) => self.handle_deactivate(cmd),
            UserCommand::Activate(cmd) => self.handle_activate(cmd),
            UserCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

impl User {
    fn handle_create(&self, cmd: &CreateUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }
        let display_name = cmd.display_name.trim();
        if display_name.is_empty() {
            return Err(DomainError::validation("display name cannot be empty"));
        }

        Ok(vec![UserEvent::Created(UserCreated {
            farm_id: cmd.farm_id,
            user_id: cmd.user_id,
            display_name: display_name.to_string(),
            role: cmd.role,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_role(&self, cmd: &ChangeRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live(cmd.farm_id)?;
        self.ensure_not_self(cmd.actor_id, "change the role of")?;

        let from = self.role.ok_or_else(|| DomainError::invariant("user has no role"))?;
        if from == cmd.role {
            return Ok(vec![]);
        }

        Ok(vec![UserEvent::RoleChanged(RoleChanged {
            farm_id: cmd.farm_id,
            user_id: cmd.user_id,
            from,
            to: cmd.role,
            changed_by: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live(cmd.farm_id)?;
        self.ensure_not_self(cmd.actor_id, "deactivate")?;
        if self.status == UserStatus::Inactive {
            return Err(DomainError::conflict("user is already inactive"));
        }

        Ok(vec![UserEvent::Deactivated(UserDeactivated {
            farm_id: cmd.farm_id,
            user_id: cmd.user_id,
            deactivated_by: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live(cmd.farm_id)?;
        if self.status == UserStatus::Active {
            return Err(DomainError::conflict("user is already active"));
        }

        Ok(vec![UserEvent::Activated(UserActivated {
            farm_id: cmd.farm_id,
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live(cmd.farm_id)?;
        self.ensure_not_self(cmd.actor_id, "delete")?;

        Ok(vec![UserEvent::Deleted(UserDeleted {
            farm_id: cmd.farm_id,
            user_id: cmd.user_id,
            deleted_by: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_user(farm_id: FarmId, role: Role) -> User {
        let user_id = UserId::new();
        let mut user = User::empty(user_id);
        let events = user
            .handle(&UserCommand::Create(CreateUser {
                farm_id,
                user_id,
                display_name: "  Анна Петрова ".to_string(),
                role,
                occurred_at: now(),
            }))
            .unwrap();
        for e in &events {
            user.apply(e);
        }
        user
    }

    fn run(user: &mut User, cmd: UserCommand) -> Result<Vec<UserEvent>, DomainError> {
        let events = user.handle(&cmd)?;
        for e in &events {
            user.apply(e);
        }
        Ok(events)
    }

    #[test]
    fn create_trims_display_name() {
        let user = created_user(FarmId::new(), Role::Inseminator);
        assert_eq!(user.display_name(), "Анна Петрова");
        assert_eq!(user.role(), Some(Role::Inseminator));
        assert!(user.is_active());
        assert_eq!(user.version(), 1);
    }

    #[test]
    fn create_requires_display_name() {
        let user_id = UserId::new();
        let err = User::empty(user_id)
            .handle(&UserCommand::Create(CreateUser {
                farm_id: FarmId::new(),
                user_id,
                display_name: "   ".to_string(),
                role: Role::Vet,
                occurred_at: now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn change_role_emits_transition() {
        let farm_id = FarmId::new();
        let mut user = created_user(farm_id, Role::Vet);
        let user_id = *user.id();

        let events = run(
            &mut user,
            UserCommand::ChangeRole(ChangeRole {
                farm_id,
                user_id,
                role: Role::Caretaker,
                actor_id: UserId::new(),
                occurred_at: now(),
            }),
        )
        .unwrap();

        match &events[0] {
            UserEvent::RoleChanged(e) => {
                assert_eq!(e.from, Role::Vet);
                assert_eq!(e.to, Role::Caretaker);
            }
            other => panic!("expected RoleChanged, got {other:?}"),
        }
        assert_eq!(user.role(), Some(Role::Caretaker));
    }

    #[test]
    fn nobody_changes_their_own_role() {
        let farm_id = FarmId::new();
        let user = created_user(farm_id, Role::Manager);
        let err = user
            .handle(&UserCommand::ChangeRole(ChangeRole {
                farm_id,
                user_id: *user.id(),
                role: Role::Admin,
                actor_id: *user.id(),
                occurred_at: now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn deactivate_then_activate() {
        let farm_id = FarmId::new();
        let mut user = created_user(farm_id, Role::Caretaker);
        let user_id = *user.id();
        let admin = UserId::new();

        run(
            &mut user,
            UserCommand::Deactivate(DeactivateUser {
                farm_id,
                user_id,
                actor_id: admin,
                occurred_at: now(),
            }),
        )
        .unwrap();
        assert!(!user.is_active());
        assert!(user.exists());

        let again = user.handle(&UserCommand::Deactivate(DeactivateUser {
            farm_id,
            user_id,
            actor_id: admin,
            occurred_at: now(),
        }));
        assert!(matches!(again, Err(DomainError::Conflict(_))));

        run(
            &mut user,
            UserCommand::Activate(ActivateUser {
                farm_id,
                user_id,
                occurred_at: now(),
            }),
        )
        .unwrap();
        assert!(user.is_active());
    }

    #[test]
    fn deleted_user_accepts_nothing() {
        let farm_id = FarmId::new();
        let mut user = created_user(farm_id, Role::Inseminator);
        let user_id = *user.id();

        run(
            &mut user,
            UserCommand::Delete(DeleteUser {
                farm_id,
                user_id,
                actor_id: UserId::new(),
                occurred_at: now(),
            }),
        )
        .unwrap();
        assert!(!user.exists());
        assert_eq!(user.status(), UserStatus::Deleted);

        let err = user
            .handle(&UserCommand::Activate(ActivateUser {
                farm_id,
                user_id,
                occurred_at: now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn farm_isolation_enforced() {
        let mut user = created_user(FarmId::new(), Role::Vet);
        let user_id = *user.id();
        let err = run(
            &mut user,
            UserCommand::Deactivate(DeactivateUser {
                farm_id: FarmId::new(),
                user_id,
                actor_id: UserId::new(),
                occurred_at: now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("farm")));
    }
}
