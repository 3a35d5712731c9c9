use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Farm staff role. Exactly one per user.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Manager,
    Vet,
    Zootechnician,
    Caretaker,
    Inseminator,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Admin,
        Role::Manager,
        Role::Vet,
        Role::Zootechnician,
        Role::Caretaker,
        Role::Inseminator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Manager => "MANAGER",
            Role::Vet => "VET",
            Role::Zootechnician => "ZOOTECHNICIAN",
            Role::Caretaker => "CARETAKER",
            Role::Inseminator => "INSEMINATOR",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Roles allowed to be named as the executor of an insemination.
    pub fn can_inseminate(&self) -> bool {
        matches!(self, Role::Inseminator | Role::Vet | Role::Zootechnician)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}
