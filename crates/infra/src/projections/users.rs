//! User directory read model.
//!
//! Hard-deleted users are removed outright; every other change updates the
//! row in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use herdbook_auth::{Role, UserEvent, UserStatus};
use herdbook_core::{FarmId, UserId};
use herdbook_events::EventEnvelope;

use super::StreamCursors;
use super::aggregate_types;
use crate::read_model::FarmStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReadModel {
    pub user_id: UserId,
    pub farm_id: FarmId,
    pub display_name: String,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct UsersProjection<S> {
    store: S,
    cursors: StreamCursors,
}

impl<S> UsersProjection<S>
where
    S: FarmStore<UserId, UserReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<serde_json::Value>,
    ) -> Result<(), anyhow::Error> {
        if envelope.aggregate_type() != aggregate_types::USER || !self.cursors.is_next(envelope)? {
            return Ok(());
        }

        let event: UserEvent = serde_json::from_value(envelope.payload().clone())?;
        let farm_id = envelope.farm_id();

        match event {
            UserEvent::Created(e) => {
                if e.farm_id != farm_id {
                    anyhow::bail!("event farm_id does not match envelope farm_id");
                }
                self.store.upsert(
                    farm_id,
                    e.user_id,
                    UserReadModel {
                        user_id: e.user_id,
                        farm_id,
                        display_name: e.display_name,
                        role: e.role,
                        status: UserStatus::Active,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            UserEvent::RoleChanged(e) => {
                self.update(farm_id, e.user_id, e.occurred_at, |m| m.role = e.to);
            }
            UserEvent::Deactivated(e) => {
                self.update(farm_id, e.user_id, e.occurred_at, |m| {
                    m.status = UserStatus::Inactive
                });
            }
            UserEvent::Activated(e) => {
                self.update(farm_id, e.user_id, e.occurred_at, |m| {
                    m.status = UserStatus::Active
                });
            }
            UserEvent::Deleted(e) => {
                self.store.remove(farm_id, &e.user_id);
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn update(
        &self,
        farm_id: FarmId,
        user_id: UserId,
        at: DateTime<Utc>,
        change: impl FnOnce(&mut UserReadModel),
    ) {
        if let Some(mut model) = self.store.get(farm_id, &user_id) {
            change(&mut model);
            model.updated_at = at;
            self.store.upsert(farm_id, user_id, model);
        }
    }

    pub fn get(&self, farm_id: FarmId, user_id: &UserId) -> Option<UserReadModel> {
        self.store.get(farm_id, user_id)
    }

    /// Users of a farm, ordered by display name.
    pub fn list(&self, farm_id: FarmId) -> Vec<UserReadModel> {
        let mut users = self.store.list(farm_id);
        users.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herdbook_auth::{RoleChanged, UserCreated, UserDeleted};
    use uuid::Uuid;

    use crate::read_model::InMemoryFarmStore;

    fn envelope(farm_id: FarmId, user_id: UserId, seq: u64, event: &UserEvent) -> EventEnvelope<serde_json::Value> {
        EventEnvelope::new(
            Uuid::now_v7(),
            farm_id,
            user_id.into(),
            aggregate_types::USER,
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    #[test]
    fn tracks_role_and_forgets_deleted_users() {
        let projection = UsersProjection::new(InMemoryFarmStore::new());
        let farm_id = FarmId::new();
        let user_id = UserId::new();
        let now = Utc::now();

        let created = UserEvent::Created(UserCreated {
            farm_id,
            user_id,
            display_name: "Иван".to_string(),
            role: Role::Caretaker,
            occurred_at: now,
        });
        projection.apply_envelope(&envelope(farm_id, user_id, 1, &created)).unwrap();
        // Redelivery is ignored.
        projection.apply_envelope(&envelope(farm_id, user_id, 1, &created)).unwrap();

        let changed = UserEvent::RoleChanged(RoleChanged {
            farm_id,
            user_id,
            from: Role::Caretaker,
            to: Role::Inseminator,
            changed_by: UserId::new(),
            occurred_at: now,
        });
        projection.apply_envelope(&envelope(farm_id, user_id, 2, &changed)).unwrap();
        assert_eq!(projection.get(farm_id, &user_id).unwrap().role, Role::Inseminator);
        assert_eq!(projection.list(farm_id).len(), 1);

        let deleted = UserEvent::Deleted(UserDeleted {
            farm_id,
            user_id,
            deleted_by: UserId::new(),
            occurred_at: now,
        });
        projection.apply_envelope(&envelope(farm_id, user_id, 3, &deleted)).unwrap();
        assert!(projection.get(farm_id, &user_id).is_none());
    }

    #[test]
    fn sequence_gaps_are_reported() {
        let projection = UsersProjection::new(InMemoryFarmStore::new());
        let farm_id = FarmId::new();
        let user_id = UserId::new();
        let created = UserEvent::Created(UserCreated {
            farm_id,
            user_id,
            display_name: "Мария".to_string(),
            role: Role::Vet,
            occurred_at: Utc::now(),
        });
        projection.apply_envelope(&envelope(farm_id, user_id, 1, &created)).unwrap();
        assert!(projection.apply_envelope(&envelope(farm_id, user_id, 5, &created)).is_err());
    }
}
