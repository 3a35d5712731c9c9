use uuid::Uuid;

use herdbook_auth::Role;
use herdbook_core::{FarmId, UserId};

/// Authenticated caller of a request.
///
/// Built by the auth middleware from the token *and* the directory, so
/// `role` is the role the user holds right now, not the one they had at
/// login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    farm_id: FarmId,
    user_id: UserId,
    display_name: String,
    role: Role,
    session_id: Uuid,
}

impl AuthContext {
    pub fn new(farm_id: FarmId, user_id: UserId, display_name: String, role: Role, session_id: Uuid) -> Self {
        Self {
            farm_id,
            user_id,
            display_name,
            role,
            session_id,
        }
    }

    pub fn farm_id(&self) -> FarmId {
        self.farm_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}
