//! User administration over the event-sourced `User` aggregate.
//!
//! [`UserAccounts`] is also the ledger's [`UserDirectory`]: lookups rehydrate
//! the user's stream on every call, so a role change or deactivation is seen
//! by the very next request.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::info;

use herdbook_auth::{
    ActivateUser, ChangeRole, CreateUser, DeactivateUser, DeleteUser, Role, User, UserCommand,
};
use herdbook_core::{DomainError, FarmId, UserId};
use herdbook_events::{EventBus, EventEnvelope};

use crate::collaborators::{CollaboratorError, DirectoryEntry, UserDirectory};
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::projections::aggregate_types;

pub type UserResult<T> = Result<T, DispatchError<DomainError>>;

pub struct UserAccounts<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> Clone for UserAccounts<S, B> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<S, B> UserAccounts<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }

    pub fn load(&self, farm_id: FarmId, user_id: UserId) -> UserResult<User> {
        self.dispatcher
            .load(farm_id, user_id.into(), |_, id| User::empty(UserId::from(id)))
    }

    pub fn create_user(&self, farm_id: FarmId, display_name: &str, role: Role) -> UserResult<User> {
        self.create_with_id(farm_id, UserId::new(), display_name, role)
    }

    /// Create `user_id` unless it already exists. Used to seed the first
    /// administrator of a farm at start-up.
    pub fn ensure_user(
        &self,
        farm_id: FarmId,
        user_id: UserId,
        display_name: &str,
        role: Role,
    ) -> UserResult<User> {
        let existing = self.load(farm_id, user_id)?;
        if existing.exists() {
            return Ok(existing);
        }
        self.create_with_id(farm_id, user_id, display_name, role)
    }

    fn create_with_id(
        &self,
        farm_id: FarmId,
        user_id: UserId,
        display_name: &str,
        role: Role,
    ) -> UserResult<User> {
        let user = self.execute(
            farm_id,
            user_id,
            UserCommand::Create(CreateUser {
                farm_id,
                user_id,
                display_name: display_name.to_string(),
                role,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(%farm_id, %user_id, %role, "user created");
        Ok(user)
    }

    pub fn change_role(&self, farm_id: FarmId, user_id: UserId, role: Role, actor_id: UserId) -> UserResult<User> {
        let user = self.execute(
            farm_id,
            user_id,
            UserCommand::ChangeRole(ChangeRole {
                farm_id,
                user_id,
                role,
                actor_id,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(%farm_id, %user_id, %role, actor = %actor_id, "user role changed");
        Ok(user)
    }

    pub fn deactivate(&self, farm_id: FarmId, user_id: UserId, actor_id: UserId) -> UserResult<User> {
        let user = self.execute(
            farm_id,
            user_id,
            UserCommand::Deactivate(DeactivateUser {
                farm_id,
                user_id,
                actor_id,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(%farm_id, %user_id, actor = %actor_id, "user deactivated");
        Ok(user)
    }

    pub fn activate(&self, farm_id: FarmId, user_id: UserId) -> UserResult<User> {
        let user = self.execute(
            farm_id,
            user_id,
            UserCommand::Activate(ActivateUser {
                farm_id,
                user_id,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(%farm_id, %user_id, "user activated");
        Ok(user)
    }

    /// Irreversible. Inseminations the user executed stay in the journal,
    /// detached from the account.
    pub fn delete(&self, farm_id: FarmId, user_id: UserId, actor_id: UserId) -> UserResult<()> {
        self.execute(
            farm_id,
            user_id,
            UserCommand::Delete(DeleteUser {
                farm_id,
                user_id,
                actor_id,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(%farm_id, %user_id, actor = %actor_id, "user deleted");
        Ok(())
    }

    fn execute(&self, farm_id: FarmId, user_id: UserId, command: UserCommand) -> UserResult<User> {
        self.dispatcher
            .dispatch(farm_id, user_id.into(), aggregate_types::USER, command, |_, id| {
                User::empty(UserId::from(id))
            })
            .map(|out| out.aggregate)
    }
}

impl<S, B> UserDirectory for UserAccounts<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    fn lookup(&self, farm_id: FarmId, user_id: UserId) -> Result<Option<DirectoryEntry>, CollaboratorError> {
        let user = self
            .load(farm_id, user_id)
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;

        if !user.exists() || user.farm_id() != Some(farm_id) {
            return Ok(None);
        }
        let Some(role) = user.role() else {
            return Ok(None);
        };

        Ok(Some(DirectoryEntry {
            user_id,
            display_name: user.display_name().to_string(),
            role,
            active: user.is_active(),
        }))
    }
}
